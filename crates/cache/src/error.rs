//! Error types for the tile texture cache

use thiserror::Error;

/// Errors returned by the cache containers and the texture store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A constructor or configuration received an unusable value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller broke the frame, pinning or entry protocol
    ///
    /// This always indicates a bug in the caller and is never recovered from
    /// by the store.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

impl CacheError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        CacheError::ProtocolViolation(message.into())
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CacheError::InvalidArgument(message.into())
    }
}
