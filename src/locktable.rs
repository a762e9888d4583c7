//! Fixed-size lock table and the global version clock.
//!
//! A region owns one [`LockTable`]: a fixed array of
//! [`VersionedSpinlock`](crate::vlock::VersionedSpinlock) stripes indexed by
//! `address mod L`, plus the atomic global version clock every committing
//! writer samples and increments. Multiple addresses aliasing the same
//! stripe is correct (it just induces false conflicts), so `L` is chosen
//! prime to reduce clustering from address strides that are multiples of
//! a small power of two.

use alloc::boxed::Box;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::vlock::VersionedSpinlock;

/// Number of stripes in the lock table. Kept prime to reduce clustering
/// from address strides that are multiples of a small power of two.
pub const NUM_STRIPES: usize = 4999;

/// An address, opaque except for its use as a lock-table index and a
/// write-set index key.
///
/// Wraps a raw pointer rather than an integer offset, using pointer
/// identity (not pointer contents) as the key. Comparison and hashing are
/// always by pointer value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Addr(pub *mut u8);

// SAFETY: an `Addr` is only ever dereferenced by code holding the
// corresponding stripe lock (writeback) or performing a validated
// speculative read; moving the pointer value itself between threads is
// just moving a `usize`-sized piece of data.
unsafe impl Send for Addr {}
unsafe impl Sync for Addr {}

impl Addr {
    /// Compute the stripe index this address maps to.
    #[inline]
    fn stripe_index(self) -> usize {
        (self.0 as usize) % NUM_STRIPES
    }
}

/// The region-wide lock table and global version clock.
pub struct LockTable {
    stripes: Box<[VersionedSpinlock]>,
    clock: AtomicU64,
}

impl LockTable {
    /// Build a fresh lock table: all stripes unlocked at version 0, clock at 0.
    ///
    /// Returns `None` on allocation exhaustion.
    pub fn try_new() -> Option<Self> {
        let mut stripes = alloc::vec::Vec::new();
        stripes.try_reserve(NUM_STRIPES).ok()?;
        stripes.resize_with(NUM_STRIPES, VersionedSpinlock::new);

        Some(Self {
            stripes: stripes.into_boxed_slice(),
            clock: AtomicU64::new(0),
        })
    }

    #[inline]
    fn stripe(&self, addr: Addr) -> &VersionedSpinlock {
        &self.stripes[addr.stripe_index()]
    }

    /// Acquire the stripe covering `addr`, per
    /// [`VersionedSpinlock::acquire`].
    #[inline]
    pub fn acquire(&self, addr: Addr) -> bool {
        self.stripe(addr).acquire()
    }

    /// Release the stripe covering `addr`.
    #[inline]
    pub fn release(&self, addr: Addr) {
        self.stripe(addr).release();
    }

    /// Stamp `version` onto the stripe covering `addr`. Caller must hold it.
    #[inline]
    pub fn update(&self, addr: Addr, version: u64) {
        self.stripe(addr).update(version);
    }

    /// Validate the stripe covering `addr` against `rv`.
    #[inline]
    pub fn validate(&self, addr: Addr, rv: u64) -> bool {
        self.stripe(addr).validate(rv)
    }

    /// Snapshot the version currently stamped on the stripe covering `addr`.
    #[inline]
    pub fn stripe_version(&self, addr: Addr) -> u64 {
        self.stripe(addr).version()
    }

    /// Atomically load the current global clock value.
    #[inline]
    pub fn clock_get(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Atomically increment the global clock and return the new value.
    ///
    /// Only ever called once per committing writing transaction, after all
    /// of its write-set stripes are held.
    #[inline]
    pub fn clock_increment_and_get(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }
}
