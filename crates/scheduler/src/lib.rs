//! Panoview Scheduler Library
//!
//! Load-pipeline primitives shared by the tile texture cache.
//!
//! This crate provides cooperative cancellation for asynchronous tile loads,
//! the error taxonomy those loads report, and the retry policy applied to
//! failed asset fetches. Operations are plain futures; wrapping one in
//! [`Cancellable`] ties it to a [`CancellationToken`] so that a cancel request
//! resolves it early, while a cancel issued after it resolved is ignored.
//!
//! # Example
//!
//! ```
//! use futures::executor::block_on;
//! use futures::future::{self, FutureExt};
//! use panoview_scheduler::{Cancellable, CancellationToken, LoadError};
//!
//! let token = CancellationToken::new();
//! let load = future::pending::<Result<u32, LoadError>>().boxed_local();
//! let guarded = Cancellable::new(load, token.clone());
//!
//! // Navigating away from the tile cancels the fetch
//! token.cancel();
//! assert_eq!(block_on(guarded), Err(LoadError::Cancelled));
//! ```

mod cancel;
mod error;
mod retry;

// Re-export public API
pub use cancel::{Cancellable, CancellationToken};
pub use error::{LoadError, LoadFuture};
pub use retry::RetryPolicy;
