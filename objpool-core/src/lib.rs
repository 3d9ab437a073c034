//! Error types and atomic-index primitives shared by `objpool`.
//!
//! Split out of the main crate the way the teacher keeps ring internals in
//! a `-core` crate: this is the part that never needs `alloc` and can be
//! depended on by `no_std` callers that bring their own allocator shim.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

#[cfg(test)]
extern crate alloc;

mod error;
mod index;

pub use error::{PoolError, MAX_CORES};
pub use index::Index;

/// Target cache-line size in bytes. Correct for x86-64 and most ARM64
/// server cores; adjust for platforms with a different line size.
pub const CACHE_LINE: usize = 64;
