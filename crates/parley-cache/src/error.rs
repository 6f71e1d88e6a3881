//! Cache construction errors.
//!
//! Cache lookups never fail: a miss is `None`. Only invalid configuration,
//! which is a programmer error, is reported.

use thiserror::Error;

/// Invalid cache configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Time-to-live must be non-zero
    #[error("cache TTL must be greater than zero")]
    InvalidTtl,

    /// Room capacity must be non-zero
    #[error("invalid room cache capacity: {0}")]
    InvalidCapacity(usize),
}
