//! Transaction state.
//!
//! A [`Transaction`] bundles the read-only flag, the read version `rv`
//! sampled at `begin`, and the read/write sets accumulated as the
//! transaction executes. It is mutated only by the thread that issued
//! `begin`, and is consumed by value at
//! [`end`](crate::region::Region::end), which cleans it up whether the
//! commit succeeds or fails.
//!
//! [`read`](crate::region::Region::read) and
//! [`write`](crate::region::Region::write) only borrow the transaction
//! (`&mut Transaction`), so an internal abort from either does **not**
//! consume or clean it up; per the commit protocol's failure semantics, a
//! `false` return means the caller must not reuse the handle (never pass
//! it to `end`). A caller holding the transaction by value can just let it
//! drop; a caller holding it behind an opaque pointer, as
//! [`ffi`](crate::ffi) does, must free it itself.

use crate::readset::ReadSet;
use crate::writeset::WriteSet;

/// A single, in-flight speculative transaction.
///
/// Not `Sync`: concurrent operations on the *same* transaction are not
/// supported, and because `Transaction` holds no interior synchronization,
/// the type system enforces this rather than leaving it as documented-only
/// undefined behavior.
pub struct Transaction {
    is_ro: bool,
    rv: u64,
    read_set: ReadSet,
    write_set: WriteSet,
}

impl Transaction {
    /// Begin a new transaction state at read version `rv`.
    ///
    /// Returns `None` on allocation exhaustion while sizing the write-set
    /// index, the only allocation `begin` performs up front.
    #[inline]
    pub(crate) fn try_new(is_ro: bool, rv: u64) -> Option<Self> {
        Some(Self {
            is_ro,
            rv,
            read_set: ReadSet::new(),
            write_set: WriteSet::try_new()?,
        })
    }

    /// Whether this transaction is read-only.
    #[inline]
    pub fn is_ro(&self) -> bool {
        self.is_ro
    }

    /// The read version sampled at `begin`.
    #[inline]
    pub fn rv(&self) -> u64 {
        self.rv
    }

    #[inline]
    pub(crate) fn read_set(&self) -> &ReadSet {
        &self.read_set
    }

    #[inline]
    pub(crate) fn read_set_mut(&mut self) -> &mut ReadSet {
        &mut self.read_set
    }

    #[inline]
    pub(crate) fn write_set(&self) -> &WriteSet {
        &self.write_set
    }

    #[inline]
    pub(crate) fn write_set_mut(&mut self) -> &mut WriteSet {
        &mut self.write_set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_transaction_starts_with_empty_sets() {
        let txn = Transaction::try_new(false, 7).unwrap();
        assert!(!txn.is_ro());
        assert_eq!(txn.rv(), 7);
        assert!(txn.read_set().is_empty());
        assert!(txn.write_set().is_empty());
    }

    #[test]
    fn read_only_transaction_records_is_ro() {
        let txn = Transaction::try_new(true, 0).unwrap();
        assert!(txn.is_ro());
    }
}
