//! A scalable, lock-free, per-core MPMC object pool.
//!
//! Modeled on the per-CPU ring-array design used by the Linux kernel's
//! `objpool` subsystem (the backing store for kretprobe instances):
//! `init` pre-allocates (or adopts) a fixed working set of object
//! references, scattered across one [`slot::Slot`] ring per core. `push`
//! and `pop` are lock-free — wait-free in the uncontended case — and
//! never allocate or block, so they are safe to call from interrupt and
//! NMI-like contexts. The pool does not grow after `init`, does not
//! preserve push/pop order, and does not preserve an object's identity
//! between a `pop` and a later `push` — see each module's docs for the
//! full invariant list.
//!
//! ```
//! use objpool::{ObjPool, PoolConfig, RoundRobinPlacement};
//!
//! let placement = RoundRobinPlacement::new(4);
//! let mut pool = ObjPool::init(placement, PoolConfig::embedded(16, || 0u64))
//!     .expect("pool sized for 16 u64 slots");
//!
//! let r = pool.pop().expect("16 objects were embedded at init");
//! pool.push(r);
//!
//! pool.fini(|_| {});
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

mod config;
mod metrics;
mod placement;
mod pool;
mod slot;

pub use config::{AllocFlags, Asym, EmbedFactory, PoolConfig};
pub use metrics::PoolMetrics;
pub use placement::{CorePlacement, RoundRobinPlacement};
#[cfg(feature = "std")]
pub use placement::StdPlacement;
pub use pool::{DrainedObject, ObjPool};

pub use objpool_core::{PoolError, MAX_CORES};

/// Crate-wide result alias, matching the teacher's convention of a single
/// error enum threaded through every fallible entry point.
pub type Result<T> = core::result::Result<T, PoolError>;
