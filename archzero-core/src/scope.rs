//! Request scopes tie in-flight calls to the lifetime of whatever started them.
//!
//! A view (or CLI command) owns a [`RequestScope`]; cancelling it, or dropping
//! the guard from [`RequestScope::drop_guard`], makes every call running under
//! it resolve to [`Cancelled`] instead of applying a stale response.

use std::future::Future;

use thiserror::Error;
use tokio_util::sync::{CancellationToken, DropGuard};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("request cancelled")]
pub struct Cancelled;

#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    token: CancellationToken,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope cancelled together with `self`, but cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancels the scope when the returned guard is dropped.
    pub fn drop_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    /// Drive `fut` to completion unless the scope is cancelled first, in which
    /// case `fut` is dropped mid-flight.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Cancelled>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Cancelled),
            out = fut => Ok(out),
        }
    }
}
