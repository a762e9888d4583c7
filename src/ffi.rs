//! C-style opaque-handle API for embedding this engine from a non-Rust host.
//!
//! Regions and transactions are heap-allocated and handed out as raw
//! pointers; the host is responsible for passing them back exactly once to
//! the matching destructor (`tl2_destroy`, `tl2_end`). A null pointer is
//! the sentinel for an invalid region or transaction handle.

use alloc::boxed::Box;
use core::ptr;
use core::slice;

use crate::engine::AllocStatus;
use crate::region::Region;
use crate::transaction::Transaction;

/// Outcome of [`tl2_alloc`], mirroring the `{success, nomem, abort}` contract.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocResult {
    /// Allocation succeeded; the segment address was written through `out`.
    Success,
    /// The allocator is exhausted.
    NoMem,
    /// The request was malformed; the caller's transaction should abort.
    Abort,
}

/// Create a region with one non-freeable initial segment of `size` bytes,
/// aligned to `align`. Returns a null pointer on invalid parameters or
/// allocation exhaustion.
#[no_mangle]
pub extern "C" fn tl2_create(size: usize, align: usize) -> *mut Region {
    match Region::new(size, align) {
        Some(region) => Box::into_raw(Box::new(region)),
        None => ptr::null_mut(),
    }
}

/// Destroy a region created by [`tl2_create`]. The caller must ensure no
/// transactions are in flight.
///
/// # Safety
/// `region` must be a pointer previously returned by `tl2_create` and not
/// already destroyed. Passing null is a no-op.
#[no_mangle]
pub unsafe extern "C" fn tl2_destroy(region: *mut Region) {
    if !region.is_null() {
        drop(Box::from_raw(region));
    }
}

/// The first byte of `region`'s initial segment.
///
/// # Safety
/// `region` must be a valid, non-null handle from `tl2_create`.
#[no_mangle]
pub unsafe extern "C" fn tl2_start(region: *const Region) -> *mut u8 {
    (*region).start()
}

/// Size in bytes of `region`'s initial segment.
///
/// # Safety
/// `region` must be a valid, non-null handle from `tl2_create`.
#[no_mangle]
pub unsafe extern "C" fn tl2_size(region: *const Region) -> usize {
    (*region).size()
}

/// The word alignment `region` enforces.
///
/// # Safety
/// `region` must be a valid, non-null handle from `tl2_create`.
#[no_mangle]
pub unsafe extern "C" fn tl2_align(region: *const Region) -> usize {
    (*region).align()
}

/// Begin a transaction against `region`. Returns a null handle only on
/// allocation exhaustion.
///
/// # Safety
/// `region` must be a valid, non-null handle from `tl2_create`.
#[no_mangle]
pub unsafe extern "C" fn tl2_begin(region: *const Region, is_ro: bool) -> *mut Transaction {
    match (*region).begin(is_ro) {
        Some(txn) => Box::into_raw(Box::new(txn)),
        None => ptr::null_mut(),
    }
}

/// Attempt to commit (or, for a read-only transaction, close) `txn`.
/// Consumes the handle: it must not be reused afterward regardless of the
/// return value.
///
/// # Safety
/// `region` must be a valid, non-null handle from `tl2_create`; `txn` must
/// be a valid, non-null handle returned by `tl2_begin` on the same region.
#[no_mangle]
pub unsafe extern "C" fn tl2_end(region: *const Region, txn: *mut Transaction) -> bool {
    if txn.is_null() {
        return false;
    }
    (*region).end(*Box::from_raw(txn))
}

/// Read `size` bytes starting at `source` (an address in `region`) into
/// `target` (`size` bytes of host-owned memory). `size` must be a positive
/// multiple of `region`'s alignment.
///
/// On `false`, `txn` has already been freed (the transaction aborted); the
/// caller must not pass it to any other `tl2_*` function, including
/// `tl2_end`.
///
/// # Safety
/// `region` and `txn` must be valid non-null handles, with `txn` still
/// open on `region`. `source` must be a valid, aligned address of at least
/// `size` readable bytes in `region`. `target` must be valid for `size`
/// writable bytes.
#[no_mangle]
pub unsafe extern "C" fn tl2_read(
    region: *const Region,
    txn: *mut Transaction,
    source: *const u8,
    target: *mut u8,
    size: usize,
) -> bool {
    if txn.is_null() {
        return false;
    }
    let target = slice::from_raw_parts_mut(target, size);
    if (*region).read(&mut *txn, source, target) {
        true
    } else {
        drop(Box::from_raw(txn));
        false
    }
}

/// Buffer a write of `size` bytes from `source` (host-owned memory) to
/// `target` (an address in `region`), to be applied on a successful
/// `tl2_end`. `size` must be a positive multiple of `region`'s alignment.
///
/// On `false`, `txn` has already been freed (the transaction aborted); the
/// caller must not pass it to any other `tl2_*` function, including
/// `tl2_end`.
///
/// # Safety
/// `region` and `txn` must be valid non-null handles, with `txn` still
/// open on `region`. `source` must be valid for `size` readable bytes.
/// `target` must be a valid, aligned address of at least `size` bytes in
/// `region`.
#[no_mangle]
pub unsafe extern "C" fn tl2_write(
    region: *const Region,
    txn: *mut Transaction,
    source: *const u8,
    size: usize,
    target: *mut u8,
) -> bool {
    if txn.is_null() {
        return false;
    }
    let source = slice::from_raw_parts(source, size);
    if (*region).write(&mut *txn, source, target) {
        true
    } else {
        drop(Box::from_raw(txn));
        false
    }
}

/// Allocate a new zeroed, aligned segment of `size` bytes within `txn`,
/// writing its address through `out` on success.
///
/// # Safety
/// `region` and `txn` must be valid non-null handles, with `txn` still
/// open on `region`. `out` must be valid for one `*mut u8` write.
#[no_mangle]
pub unsafe extern "C" fn tl2_alloc(
    region: *const Region,
    txn: *mut Transaction,
    size: usize,
    out: *mut *mut u8,
) -> AllocResult {
    if txn.is_null() {
        return AllocResult::Abort;
    }
    match (*region).alloc(&mut *txn, size) {
        AllocStatus::Success(segment) => {
            *out = segment;
            AllocResult::Success
        }
        AllocStatus::NoMem => AllocResult::NoMem,
        AllocStatus::Abort => AllocResult::Abort,
    }
}

/// Logically free a segment previously returned by `tl2_alloc`.
///
/// # Safety
/// `region` and `txn` must be valid non-null handles, with `txn` still
/// open on `region`. `target` must have been returned by a prior
/// successful `tl2_alloc` on `region`.
#[no_mangle]
pub unsafe extern "C" fn tl2_free(
    region: *const Region,
    txn: *mut Transaction,
    target: *mut u8,
) -> bool {
    if txn.is_null() {
        return false;
    }
    (*region).free(&mut *txn, target)
}
