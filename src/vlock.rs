//! Versioned spinlock: the TL2 per-stripe lock.
//!
//! Each stripe in the [lock table](crate::locktable) is one of these: a
//! `taken` bit and a monotonically non-decreasing `version`. A holder sets
//! `taken`, writes `version` while holding the lock, then clears `taken`.
//! A non-holder can cheaply check "is this stripe unlocked, and was it last
//! written at a version I'm allowed to see" without ever blocking.
//!
//! Acquisition is bounded: after a fixed number of backoff bursts it gives
//! up and returns `false` rather than spin indefinitely. This is what lets
//! the commit protocol fail fast on overlapping write sets instead of
//! deadlocking.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::backoff::Backoff;

/// Number of backoff bursts [`VersionedSpinlock::acquire`] tolerates before
/// giving up. A handful of short pause bursts is enough to ride out brief
/// contention while still failing fast under a real conflict; any finite,
/// non-zero bound preserves correctness.
const ACQUIRE_BACKOFF_BURSTS: u32 = 10;

/// A versioned spinlock: one stripe of the [lock table](crate::locktable).
///
/// `taken` and `version` are kept as separate atomics rather than packed
/// into a single word; either layout works as long as `validate` observes
/// both atomically with respect to a holder's `update`/`release`.
#[repr(C)]
pub struct VersionedSpinlock {
    taken: AtomicBool,
    version: AtomicU64,
}

impl VersionedSpinlock {
    /// Create a new, unlocked stripe at version 0.
    #[inline]
    pub const fn new() -> Self {
        Self {
            taken: AtomicBool::new(false),
            version: AtomicU64::new(0),
        }
    }

    /// Attempt to acquire the stripe, spinning through a bounded backoff.
    ///
    /// Returns `true` on success (caller now holds the stripe). Returns
    /// `false` if the stripe was still held after the backoff bound was
    /// exhausted; the caller must treat this as a commit abort, never
    /// retry internally.
    #[inline]
    pub fn acquire(&self) -> bool {
        if !self.taken.swap(true, Ordering::Acquire) {
            return true;
        }

        let mut backoff = Backoff::new();
        for _ in 0..ACQUIRE_BACKOFF_BURSTS {
            backoff.spin();
            if !self.taken.swap(true, Ordering::Acquire) {
                return true;
            }
        }

        false
    }

    /// Release a stripe previously acquired by this caller.
    ///
    /// Calling this without holding the stripe is a logic error.
    #[inline]
    pub fn release(&self) {
        debug_assert!(self.taken.load(Ordering::Relaxed), "release of unheld stripe");
        self.taken.store(false, Ordering::Release);
    }

    /// Stamp a new version onto the stripe. Caller must hold the stripe.
    #[inline]
    pub fn update(&self, version: u64) {
        debug_assert!(self.taken.load(Ordering::Relaxed), "update of unheld stripe");
        self.version.store(version, Ordering::Release);
    }

    /// Validate that this stripe is unlocked and was last written at a
    /// version no greater than `rv`.
    ///
    /// Both the `taken` check and the `version` read are atomic loads;
    /// `taken` is checked with `Acquire` ordering so that a `false` result
    /// here synchronizes-with the holder's `release`, making the `version`
    /// read that follows observe a consistent snapshot.
    #[inline]
    pub fn validate(&self, rv: u64) -> bool {
        if self.taken.load(Ordering::Acquire) {
            return false;
        }
        self.version.load(Ordering::Acquire) <= rv
    }

    /// Snapshot the current version, for callers that want an extra
    /// pre/post guard around a speculative read in addition to
    /// [`validate`](Self::validate).
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Whether the stripe is currently held by some writer.
    #[inline]
    pub fn is_taken(&self) -> bool {
        self.taken.load(Ordering::Acquire)
    }
}

impl Default for VersionedSpinlock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_unlocked_at_version_zero() {
        let lock = VersionedSpinlock::new();
        assert!(!lock.is_taken());
        assert_eq!(lock.version(), 0);
    }

    #[test]
    fn acquire_then_release_roundtrip() {
        let lock = VersionedSpinlock::new();
        assert!(lock.acquire());
        assert!(lock.is_taken());
        lock.release();
        assert!(!lock.is_taken());
    }

    #[test]
    fn acquire_fails_when_already_held() {
        let lock = VersionedSpinlock::new();
        assert!(lock.acquire());
        assert!(!lock.acquire());
        lock.release();
        assert!(lock.acquire());
    }

    #[test]
    fn update_is_visible_after_release() {
        let lock = VersionedSpinlock::new();
        lock.acquire();
        lock.update(42);
        lock.release();
        assert_eq!(lock.version(), 42);
    }

    #[test]
    fn validate_fails_while_taken() {
        let lock = VersionedSpinlock::new();
        lock.acquire();
        assert!(!lock.validate(u64::MAX));
        lock.release();
        assert!(lock.validate(u64::MAX));
    }

    #[test]
    fn validate_fails_on_newer_version() {
        let lock = VersionedSpinlock::new();
        lock.acquire();
        lock.update(10);
        lock.release();

        assert!(lock.validate(10));
        assert!(lock.validate(11));
        assert!(!lock.validate(9));
    }
}
