//! Per-transaction write set and its lookup index.
//!
//! Two cooperating structures: an ordered sequence of write nodes (which
//! own the buffered values) and a fixed-size open-addressed lookup index
//! keyed by target address. The index is purely an accelerator: the
//! sequence owns every node, and the index only ever stores
//! `(key, position in the sequence)`.
//!
//! This is an exact-membership hash table, not a probabilistic filter.
//! Lookup uses a bounded probe (a linear scan capped at the table size)
//! so a full table with no match reports a miss instead of looping
//! forever.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr::NonNull;

use crate::locktable::Addr;
use crate::malloc::{Allocator, GlobalAllocator};

/// Number of slots in the write-set index: a static upper bound on the
/// number of distinct addresses a single transaction may write.
pub const WRITE_SET_INDEX_SLOTS: usize = 10_000;

/// A buffer owned by a [`WriteNode`], holding the pending value for one
/// write. Freed exactly when the node is dropped.
struct OwnedBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl OwnedBuffer {
    fn new(source: &[u8]) -> Option<Self> {
        let alloc = GlobalAllocator;
        let ptr = alloc.malloc(source.len())?;
        // SAFETY: `ptr` points to at least `source.len()` freshly allocated bytes.
        unsafe {
            core::ptr::copy_nonoverlapping(source.as_ptr(), ptr.as_ptr(), source.len());
        }
        Some(Self { ptr, len: source.len() })
    }

    fn overwrite(&mut self, source: &[u8]) {
        debug_assert_eq!(self.len, source.len());
        // SAFETY: `self.ptr` owns `self.len` bytes, `source` is at least that long.
        unsafe {
            core::ptr::copy_nonoverlapping(source.as_ptr(), self.ptr.as_ptr(), self.len);
        }
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: `self.ptr` owns `self.len` initialized bytes.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for OwnedBuffer {
    fn drop(&mut self) {
        let alloc = GlobalAllocator;
        // SAFETY: `self.ptr`/`self.len` were produced by `alloc.malloc` above.
        unsafe { alloc.free(self.ptr, self.len, false) };
    }
}

/// A single buffered write: target address plus the pending value.
struct WriteNode {
    target: Addr,
    buffer: OwnedBuffer,
}

/// A write-set index entry.
#[derive(Clone, Copy)]
struct IndexSlot {
    key: Addr,
    node: u32,
}

/// The per-transaction write set: an owning sequence of [`WriteNode`]s plus
/// a fixed-size open-addressed lookup index over it.
pub struct WriteSet {
    nodes: Vec<WriteNode>,
    index: Box<[Option<IndexSlot>]>,
}

impl WriteSet {
    /// Create an empty write set with a fresh, empty index.
    ///
    /// Returns `None` on allocation exhaustion while sizing the index.
    pub fn try_new() -> Option<Self> {
        let mut index = Vec::new();
        index.try_reserve(WRITE_SET_INDEX_SLOTS).ok()?;
        index.resize_with(WRITE_SET_INDEX_SLOTS, || None);

        Some(Self {
            nodes: Vec::new(),
            index: index.into_boxed_slice(),
        })
    }

    #[inline]
    fn hash(addr: Addr) -> usize {
        (addr.0 as usize) % WRITE_SET_INDEX_SLOTS
    }

    /// Look up the buffered value for `target`, if this transaction has
    /// already written it.
    pub fn find(&self, target: Addr) -> Option<&[u8]> {
        let start = Self::hash(target);
        let mut slot = start;

        loop {
            match self.index[slot] {
                None => return None,
                Some(entry) if entry.key == target => {
                    return Some(self.nodes[entry.node as usize].buffer.as_slice());
                }
                Some(_) => {
                    slot = (slot + 1) % WRITE_SET_INDEX_SLOTS;
                    if slot == start {
                        // Probed the whole table with no match: treat as a
                        // miss rather than looping forever.
                        return None;
                    }
                }
            }
        }
    }

    /// Record a new write to `target`, buffering `source`. Returns `false`
    /// on allocation exhaustion (node, buffer, or index overflow), in
    /// which case the caller must abort the transaction.
    ///
    /// Caller must have already confirmed `target` is not present via
    /// [`find`](Self::find); this always appends a new node.
    pub fn add(&mut self, target: Addr, source: &[u8]) -> bool {
        let Some(buffer) = OwnedBuffer::new(source) else {
            return false;
        };
        if self.nodes.try_reserve(1).is_err() {
            return false;
        }

        let node_index = self.nodes.len();
        if !self.insert_index(target, node_index) {
            // Index is full: the transaction has exceeded the static upper
            // bound on distinct write addresses. Surfaced here as an abort.
            return false;
        }

        self.nodes.push(WriteNode { target, buffer });
        true
    }

    /// Overwrite the buffered value of an existing node for `target`.
    ///
    /// Panics in debug builds if `target` is not already present; callers
    /// must check [`find`](Self::find) first.
    pub fn overwrite(&mut self, target: Addr, source: &[u8]) {
        let start = Self::hash(target);
        let mut slot = start;
        loop {
            match self.index[slot] {
                Some(entry) if entry.key == target => {
                    self.nodes[entry.node as usize].buffer.overwrite(source);
                    return;
                }
                None => {
                    debug_assert!(false, "overwrite of address not in write set");
                    return;
                }
                Some(_) => {
                    slot = (slot + 1) % WRITE_SET_INDEX_SLOTS;
                    if slot == start {
                        debug_assert!(false, "overwrite of address not in write set");
                        return;
                    }
                }
            }
        }
    }

    fn insert_index(&mut self, key: Addr, node: usize) -> bool {
        let start = Self::hash(key);
        let mut slot = start;
        loop {
            if self.index[slot].is_none() {
                self.index[slot] = Some(IndexSlot {
                    key,
                    node: node as u32,
                });
                return true;
            }
            slot = (slot + 1) % WRITE_SET_INDEX_SLOTS;
            if slot == start {
                return false;
            }
        }
    }

    /// Iterate the write set in insertion order as `(target, buffered value)`.
    pub fn iter(&self) -> impl Iterator<Item = (Addr, &[u8])> {
        self.nodes.iter().map(|n| (n.target, n.buffer.as_slice()))
    }

    /// Number of distinct addresses written.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing has been written yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: usize) -> Addr {
        Addr(n as *mut u8)
    }

    #[test]
    fn find_on_empty_set_is_miss() {
        let set = WriteSet::try_new().unwrap();
        assert!(set.find(addr(8)).is_none());
    }

    #[test]
    fn add_then_find_round_trips() {
        let mut set = WriteSet::try_new().unwrap();
        assert!(set.add(addr(8), &[1, 2, 3, 4]));
        assert_eq!(set.find(addr(8)), Some(&[1, 2, 3, 4][..]));
        assert!(set.find(addr(16)).is_none());
    }

    #[test]
    fn overwrite_replaces_value_in_place() {
        let mut set = WriteSet::try_new().unwrap();
        set.add(addr(8), &[0, 0, 0, 0]);
        set.overwrite(addr(8), &[9, 9, 9, 9]);
        assert_eq!(set.find(addr(8)), Some(&[9, 9, 9, 9][..]));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn colliding_addresses_probe_past_each_other() {
        let mut set = WriteSet::try_new().unwrap();
        let a = addr(8);
        let b = addr(8 + WRITE_SET_INDEX_SLOTS * 8);

        assert!(set.add(a, &[1]));
        assert!(set.add(b, &[2]));

        assert_eq!(set.find(a), Some(&[1][..]));
        assert_eq!(set.find(b), Some(&[2][..]));
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut set = WriteSet::try_new().unwrap();
        set.add(addr(8), &[1]);
        set.add(addr(16), &[2]);
        set.add(addr(24), &[3]);

        let order: Vec<_> = set.iter().map(|(a, _)| a).collect();
        assert_eq!(order, alloc::vec![addr(8), addr(16), addr(24)]);
    }
}
