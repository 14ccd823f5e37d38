//! Cancellation tokens for tile loads
//!
//! Provides cancellation tokens that allow in-flight loads to be cancelled
//! cooperatively, and a future wrapper that resolves an operation with
//! [`LoadError::Cancelled`] once its token is cancelled.

use std::future::Future;
use std::pin::Pin;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::task::{Context, Poll};

use futures::future::FusedFuture;
use futures::task::AtomicWaker;

use crate::LoadError;

struct TokenState {
    cancelled: AtomicBool,
    waker: AtomicWaker,
}

/// Cancellation token for cooperative load cancellation
///
/// Collaborators doing long-running work can periodically check
/// `is_cancelled()` to stop early. Multiple tokens can share the same
/// underlying cancellation state via Arc.
///
/// # Example
///
/// ```
/// use panoview_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// // In the decoder:
/// // for row in rows {
/// //     if worker_token.is_cancelled() {
/// //         return; // Stop early
/// //     }
/// //     // ... decode row ...
/// // }
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Create a new cancellation token
    ///
    /// The token starts in a non-cancelled state.
    pub fn new() -> Self {
        Self {
            state: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                waker: AtomicWaker::new(),
            }),
        }
    }

    /// Cancel this token
    ///
    /// All clones of this token will also observe the cancellation, and a
    /// task waiting on a [`Cancellable`] guarded by it is woken.
    /// This operation is idempotent - calling it multiple times is safe.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.waker.wake();
    }

    /// Check if this token has been cancelled
    ///
    /// Returns `true` if `cancel()` has been called on this token or any clone.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    fn register(&self, cx: &Context<'_>) {
        self.state.waker.register(cx.waker());
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A load operation tied to a cancellation token
///
/// Resolves with the inner operation's result, or with
/// [`LoadError::Cancelled`] if the token is cancelled first. Once the
/// operation has resolved, later cancel requests are ignored: the result is
/// handed out exactly once and the future reports itself terminated.
pub struct Cancellable<F> {
    inner: Option<F>,
    token: CancellationToken,
}

impl<F> Cancellable<F> {
    /// Wrap `inner` so that cancelling `token` resolves it early
    pub fn new(inner: F, token: CancellationToken) -> Self {
        Self {
            inner: Some(inner),
            token,
        }
    }

    /// The token guarding this operation
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl<F, T> Future for Cancellable<F>
where
    F: Future<Output = Result<T, LoadError>> + Unpin,
{
    type Output = Result<T, LoadError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        let Some(inner) = this.inner.as_mut() else {
            // Already handed off its result
            return Poll::Pending;
        };

        if this.token.is_cancelled() {
            this.inner = None;
            return Poll::Ready(Err(LoadError::Cancelled));
        }

        match Pin::new(inner).poll(cx) {
            Poll::Ready(result) => {
                this.inner = None;
                Poll::Ready(result)
            }
            Poll::Pending => {
                this.token.register(cx);
                // A cancel racing the registration must not be lost
                if this.token.is_cancelled() {
                    this.inner = None;
                    return Poll::Ready(Err(LoadError::Cancelled));
                }
                Poll::Pending
            }
        }
    }
}

impl<F, T> FusedFuture for Cancellable<F>
where
    F: Future<Output = Result<T, LoadError>> + Unpin,
{
    fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}
