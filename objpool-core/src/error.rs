//! Pool error kinds.
//!
//! Four kinds, matching the operations that can legitimately fail:
//! allocation at `init`, bad arguments at `populate`/`add_scattered`,
//! capacity exhaustion during population, and an unsupported core count.
//! `push` and `pop` never return this type — `push` loops to success
//! under default sizing and `pop` signals emptiness with `None`, not an
//! error (spec.md §7).

use snafu::Snafu;

/// Maximum core count the 16-bit slot-index field can address.
pub const MAX_CORES: u32 = 1 << 16;

/// Errors returned by the pool's fallible, initialization-time operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum PoolError {
    /// The backing allocator could not satisfy a slot or object allocation.
    #[snafu(display("objpool: allocation failed while sizing {requested} objects"))]
    OutOfMemory {
        /// The object count `init` was asked to provision.
        requested: usize,
    },

    /// A caller-supplied argument violated a documented precondition.
    #[snafu(display("objpool: invalid argument ({reason})"))]
    InvalidArgument {
        /// Human-readable reason, e.g. "stride must be nonzero".
        reason: &'static str,
    },

    /// `populate` found no object that fit the buffer, or the pool is
    /// already full and cannot accept another `add_scattered` insertion,
    /// or `pop` observed every slot empty (not itself an error — callers
    /// see `None`, but `fini`'s drain loop reuses this kind internally).
    #[snafu(display("objpool: not found"))]
    NotFound,

    /// `init` was asked to provision more cores than the slot table's
    /// 16-bit index field can address.
    #[snafu(display("objpool: unsupported core count {num_cores} (max {MAX_CORES})"))]
    Unsupported {
        /// The core count that was requested.
        num_cores: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn display_is_stable_and_non_panicking() {
        let errs = [
            PoolError::OutOfMemory { requested: 16 },
            PoolError::InvalidArgument {
                reason: "stride must be nonzero",
            },
            PoolError::NotFound,
            PoolError::Unsupported { num_cores: 1 << 17 },
        ];
        for err in &errs {
            assert!(!format!("{err}").is_empty());
        }
    }
}
