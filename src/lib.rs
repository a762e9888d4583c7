//! # TL2 Software Transactional Memory
//!
//! A word-addressed software transactional memory (STM) engine implementing
//! **TL2** (Transactional Locking II): lazy versioned locking with a global
//! commit clock, encounter-time reads with post-validation, and buffered
//! writes committed under locks acquired only at end-of-transaction.
//!
//! Multiple actors execute speculative read/write transactions against a
//! shared [`Region`](region::Region) of memory; a transaction either commits
//! atomically or aborts cleanly, with no partial effects ever visible to
//! another transaction.
//!
//! ## Module Organization
//!
//! ### Foundation
//! - [`cc`] - Compiler compatibility utilities (bit operations, branch hints)
//! - [`malloc`] - Memory allocator abstraction
//! - [`pr`] - Atomic primitives and memory barriers
//! - [`backoff`] - Bounded backoff for contention management
//! - [`spinlock`] - Generic spinlock, reused as the region's segment-list guard
//!
//! ### TL2 engine
//! - [`vlock`] - Versioned spinlock: the per-stripe taken-bit + version pair
//! - [`locktable`] - Fixed-size lock table and the global version clock
//! - [`readset`] - Per-transaction read set
//! - [`writeset`] - Per-transaction write set and its lookup index
//! - [`transaction`] - Transaction state
//! - [`region`] - The shared memory region
//! - [`engine`] - The commit protocol: `begin`, `read`, `write`, `end`, `alloc`, `free`
//!
//! ### Interop
//! - [`ffi`] - C-style opaque-handle API for embedding from a non-Rust host
//!
//! ## Example
//!
//! ```
//! use tl2_stm::Region;
//!
//! let region = Region::new(64, 8).expect("create region");
//!
//! let mut txn = region.begin(false).expect("begin transaction");
//! let value: u64 = 0x1122_3344_5566_7788;
//! // SAFETY: `region.start()` is the first word of `region`'s initial segment.
//! unsafe {
//!     assert!(region.write(&mut txn, &value.to_ne_bytes(), region.start()));
//! }
//! assert!(region.end(txn));
//!
//! let mut txn = region.begin(true).expect("begin transaction");
//! let mut out = [0u8; 8];
//! unsafe {
//!     assert!(region.read(&mut txn, region.start(), &mut out));
//! }
//! assert!(region.end(txn));
//! assert_eq!(u64::from_ne_bytes(out), value);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_inception)]

extern crate alloc;

/// Compiler compatibility utilities.
pub mod cc;

/// Memory allocator abstraction.
pub mod malloc;

/// Atomic primitives and memory barriers.
pub mod pr;

/// Bounded exponential backoff for contention management.
pub mod backoff;

/// Generic spinlock, used as the region's coarse segment-list guard.
pub mod spinlock;

/// Versioned spinlock: the TL2 per-stripe lock.
pub mod vlock;

/// Fixed-size lock table and global version clock.
pub mod locktable;

/// Per-transaction read set.
pub mod readset;

/// Per-transaction write set and its lookup index.
pub mod writeset;

/// Transaction state.
pub mod transaction;

/// The shared memory region.
pub mod region;

/// The TL2 commit protocol.
pub mod engine;

/// C-style opaque-handle API.
pub mod ffi;

pub use engine::AllocStatus;
pub use region::Region;
pub use transaction::Transaction;
