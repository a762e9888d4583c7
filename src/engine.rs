//! The TL2 commit protocol: `begin`, `read`, `write`, `end`, `alloc`, `free`.
//!
//! `begin` lives on [`Region`](crate::region::Region) (it only needs the
//! clock); the remaining five operations are implemented here and exposed
//! as thin wrapper methods on `Region` for ergonomics. Every failure path
//! here is terminal: a `false` return means the transaction must not be
//! used again. `read` and `write` only borrow the transaction, so they
//! never free it themselves on abort; owned callers simply drop it, and
//! pointer-owning callers (see [`ffi`](crate::ffi)) must free it
//! explicitly.

use alloc::alloc::{alloc_zeroed, Layout};
use core::ptr::NonNull;

use crate::locktable::Addr;
use crate::region::Region;
use crate::transaction::Transaction;

/// Outcome of [`Region::alloc`](crate::region::Region::alloc).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocStatus {
    /// Allocation succeeded; the segment's first byte is carried in the variant.
    Success(*mut u8),
    /// The allocator is exhausted.
    NoMem,
    /// The request is malformed (e.g. size is not a positive multiple of
    /// the region's alignment) and the transaction should abort.
    Abort,
}

// SAFETY: the carried pointer is opaque data here, handed back to the
// caller to use through the normal region read/write API.
unsafe impl Send for AllocStatus {}

#[inline]
fn word_count(len: usize, align: usize) -> Option<usize> {
    if len == 0 || len % align != 0 {
        None
    } else {
        Some(len / align)
    }
}

/// Copy `target.len()` bytes from `source` (in the region) into `target`
/// (private memory), recording reads and validating as it goes.
///
/// # Safety
/// See [`Region::read`](crate::region::Region::read).
pub(crate) unsafe fn read(
    region: &Region,
    txn: &mut Transaction,
    source: *const u8,
    target: &mut [u8],
) -> bool {
    let align = region.align();
    let Some(words) = word_count(target.len(), align) else {
        return false;
    };

    for i in 0..words {
        let word_ptr = source.add(i * align);
        let word_addr = Addr(word_ptr as *mut u8);
        let out = &mut target[i * align..(i + 1) * align];

        let pre_version = region.lock_table.stripe_version(word_addr);

        if txn.is_ro() {
            core::ptr::copy_nonoverlapping(word_ptr, out.as_mut_ptr(), align);
        } else {
            match txn.write_set().find(word_addr) {
                Some(buffered) => out.copy_from_slice(buffered),
                None => {
                    if !txn.read_set_mut().add(word_addr) {
                        return false;
                    }
                    core::ptr::copy_nonoverlapping(word_ptr, out.as_mut_ptr(), align);
                }
            }
        }

        // Extra pre/post version guard, strengthening the canonical
        // post-read-only validation: closes the narrow window between the
        // speculative copy above and the validation below.
        let post_version = region.lock_table.stripe_version(word_addr);
        if post_version != pre_version {
            return false;
        }

        if !region.lock_table.validate(word_addr, txn.rv()) {
            return false;
        }
    }

    true
}

/// Buffer a write of `source` (private memory) to `target` (in the region).
///
/// # Safety
/// See [`Region::write`](crate::region::Region::write).
pub(crate) unsafe fn write(
    region: &Region,
    txn: &mut Transaction,
    source: &[u8],
    target: *mut u8,
) -> bool {
    let align = region.align();
    let Some(words) = word_count(source.len(), align) else {
        return false;
    };

    for i in 0..words {
        let word_target = target.add(i * align);
        let word_addr = Addr(word_target);
        let word_source = &source[i * align..(i + 1) * align];

        if txn.write_set().find(word_addr).is_some() {
            txn.write_set_mut().overwrite(word_addr, word_source);
        } else if !txn.write_set_mut().add(word_addr, word_source) {
            return false;
        }
    }

    true
}

/// Attempt to commit `txn` against `region`. See
/// [`Region::end`](crate::region::Region::end).
pub(crate) fn end(region: &Region, txn: Transaction) -> bool {
    if txn.is_ro() {
        return true;
    }

    let mut acquired = 0usize;
    for (addr, _) in txn.write_set().iter() {
        if region.lock_table.acquire(addr) {
            acquired += 1;
        } else {
            release_prefix(region, &txn, acquired);
            return false;
        }
    }

    let wv = region.lock_table.clock_increment_and_get();

    if wv != txn.rv() + 1 {
        let mut read_set_ok = true;
        for addr in txn.read_set().iter() {
            if !region.lock_table.validate(addr, txn.rv()) {
                read_set_ok = false;
                break;
            }
        }
        if !read_set_ok {
            release_prefix(region, &txn, txn.write_set().len());
            return false;
        }
    }

    for (addr, buffered) in txn.write_set().iter() {
        // SAFETY: `addr` was produced by a prior `write()` call against
        // this region and holds exactly `buffered.len()` bytes; we hold
        // its stripe lock, acquired above.
        unsafe {
            core::ptr::copy_nonoverlapping(buffered.as_ptr(), addr.0, buffered.len());
        }
        region.lock_table.update(addr, wv);
        region.lock_table.release(addr);
    }

    true
}

fn release_prefix(region: &Region, txn: &Transaction, count: usize) {
    for (addr, _) in txn.write_set().iter().take(count) {
        region.lock_table.release(addr);
    }
}

/// Allocate a new segment within `txn`. See
/// [`Region::alloc`](crate::region::Region::alloc).
pub(crate) fn alloc(region: &Region, _txn: &mut Transaction, size: usize) -> AllocStatus {
    let align = region.align();
    if size == 0 || size % align != 0 {
        return AllocStatus::Abort;
    }

    let Ok(layout) = Layout::from_size_align(size, align) else {
        return AllocStatus::Abort;
    };

    // SAFETY: `layout` has non-zero size.
    let raw = unsafe { alloc_zeroed(layout) };
    match NonNull::new(raw) {
        None => AllocStatus::NoMem,
        Some(ptr) => {
            region.publish_segment(ptr, layout);
            AllocStatus::Success(ptr.as_ptr())
        }
    }
}

/// Logically free a segment. See
/// [`Region::free`](crate::region::Region::free).
///
/// # Safety
/// See [`Region::free`](crate::region::Region::free).
pub(crate) unsafe fn free(_region: &Region, _txn: &mut Transaction, _target: *mut u8) -> bool {
    // Reclamation is deferred to `Region`'s destructor; marking a segment
    // freed here would require tracking live readers, which this engine
    // does not do. The trivial no-op is a conformant minimal behavior for
    // a bounded-lifetime region.
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;

    #[test]
    fn read_rejects_zero_size() {
        let region = Region::new(64, 8).unwrap();
        let mut txn = region.begin(true).unwrap();
        let mut out = [0u8; 0];
        assert!(!unsafe { region.read(&mut txn, region.start(), &mut out) });
    }

    #[test]
    fn read_rejects_misaligned_size() {
        let region = Region::new(64, 8).unwrap();
        let mut txn = region.begin(true).unwrap();
        let mut out = [0u8; 3];
        assert!(!unsafe { region.read(&mut txn, region.start(), &mut out) });
    }

    #[test]
    fn single_writer_single_reader_round_trip() {
        let region = Region::new(64, 8).unwrap();

        let mut writer = region.begin(false).unwrap();
        let value = [0x11u8; 8];
        assert!(unsafe { region.write(&mut writer, &value, region.start()) });
        assert!(region.end(writer));

        let mut reader = region.begin(true).unwrap();
        let mut out = [0u8; 8];
        assert!(unsafe { region.read(&mut reader, region.start(), &mut out) });
        assert!(region.end(reader));
        assert_eq!(out, value);
    }

    #[test]
    fn read_your_writes() {
        let region = Region::new(64, 8).unwrap();
        let mut txn = region.begin(false).unwrap();

        let target = unsafe { region.start().add(8) };
        let value = [0xAAu8; 8];
        assert!(unsafe { region.write(&mut txn, &value, target) });

        let mut out = [0u8; 8];
        assert!(unsafe { region.read(&mut txn, target, &mut out) });
        assert_eq!(out, value);

        assert!(region.end(txn));

        let mut reader = region.begin(true).unwrap();
        let mut out2 = [0u8; 8];
        assert!(unsafe { region.read(&mut reader, target, &mut out2) });
        assert!(region.end(reader));
        assert_eq!(out2, value);
    }

    #[test]
    fn second_write_to_same_word_wins() {
        let region = Region::new(64, 8).unwrap();
        let mut txn = region.begin(false).unwrap();

        assert!(unsafe { region.write(&mut txn, &[1u8; 8], region.start()) });
        assert!(unsafe { region.write(&mut txn, &[2u8; 8], region.start()) });
        assert!(region.end(txn));

        let mut reader = region.begin(true).unwrap();
        let mut out = [0u8; 8];
        assert!(unsafe { region.read(&mut reader, region.start(), &mut out) });
        assert!(region.end(reader));
        assert_eq!(out, [2u8; 8]);
    }

    #[test]
    fn fast_path_skips_read_set_validation_on_uncontended_commit() {
        let region = Region::new(64, 8).unwrap();
        let mut txn = region.begin(false).unwrap();
        assert_eq!(txn.rv(), 0);
        assert!(unsafe { region.write(&mut txn, &[7u8; 8], region.start()) });
        assert!(region.end(txn));
        assert_eq!(region.lock_table.clock_get(), 1);
    }

    #[test]
    fn alloc_rejects_misaligned_size() {
        let region = Region::new(64, 8).unwrap();
        let mut txn = region.begin(false).unwrap();
        assert_eq!(region.alloc(&mut txn, 3), AllocStatus::Abort);
    }

    #[test]
    fn alloc_returns_zeroed_segment_usable_for_read_write() {
        let region = Region::new(64, 8).unwrap();
        let mut txn = region.begin(false).unwrap();

        let AllocStatus::Success(segment) = region.alloc(&mut txn, 16) else {
            panic!("expected successful allocation");
        };

        let mut out = [0xFFu8; 16];
        assert!(unsafe { region.read(&mut txn, segment, &mut out) });
        assert_eq!(out, [0u8; 16]);

        assert!(unsafe { region.write(&mut txn, &[3u8; 16], segment) });
        assert!(region.end(txn));
    }

    #[test]
    fn free_is_a_conformant_no_op() {
        let region = Region::new(64, 8).unwrap();
        let mut txn = region.begin(false).unwrap();
        assert!(unsafe { region.free(&mut txn, region.start()) });
    }
}
