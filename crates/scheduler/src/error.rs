//! Load error taxonomy
//!
//! Errors reported by the asynchronous asset and texture operations.

use futures::future::LocalBoxFuture;
use thiserror::Error;

/// A cancellable asynchronous load yielding `O` or a [`LoadError`]
///
/// Loads run on the caller's thread of control, so the future is not
/// required to be `Send`.
pub type LoadFuture<O> = LocalBoxFuture<'static, Result<O, LoadError>>;

/// Failure of a tile load
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The load was cancelled before it resolved
    #[error("load cancelled")]
    Cancelled,

    /// Transient failure fetching the asset (eligible for retry)
    #[error("network error: {0}")]
    Network(String),

    /// The asset could not be decoded or is unusable
    #[error("asset error: {0}")]
    Asset(String),

    /// The render backend failed to build a texture
    #[error("texture error: {0}")]
    Texture(String),
}

impl LoadError {
    /// Returns true if this error signals cancellation rather than failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadError::Cancelled)
    }

    /// Returns true if repeating the operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadError::Network(_))
    }
}
