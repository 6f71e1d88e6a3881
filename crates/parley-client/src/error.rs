//! Client error types.

use parley_cache::{CacheError, RoomId};
use thiserror::Error;

use crate::api::ApiError;

/// Errors from the websocket driver handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The driver task is no longer running
    #[error("transport task has shut down")]
    Shutdown,
}

/// Errors surfaced to callers of [`crate::ChatStore`].
#[derive(Error, Debug)]
pub enum ClientError {
    /// REST call failed. Any optimistic write has already been rolled back.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Cache misconfigured
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Invalidation pattern failed to compile
    #[error("invalid cache pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Room detail could not be loaded into the cache
    #[error("room {0} unavailable")]
    RoomUnavailable(RoomId),
}
