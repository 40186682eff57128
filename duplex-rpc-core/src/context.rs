//! Per-call deadline and cancellation.
//!
//! A [`CallContext`] is created once per call and shared by every task that
//! works on that call: both directions on the server, both directions on the
//! client, and the in-process transport between them. Clones are cheap and
//! observe the same state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::Status;

/// Shared per-call metadata: an optional absolute deadline and a one-shot
/// cancellation flag.
///
/// The deadline is fixed at creation. The cancellation flag moves from unset
/// to set at most once; every clone observes the transition.
///
/// # Example
///
/// ```
/// use duplex_rpc_core::CallContext;
///
/// let ctx = CallContext::new();
/// let peer = ctx.clone();
///
/// assert!(ctx.cancel());
/// assert!(!ctx.cancel()); // already cancelled
/// assert!(peer.is_cancelled());
/// ```
#[derive(Clone, Debug)]
pub struct CallContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    deadline: Option<Instant>,
    cancelled: watch::Sender<bool>,
}

impl CallContext {
    /// Create a context with no deadline.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    /// Create a context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Some(Instant::now() + timeout))
    }

    /// Create a context from an optional timeout.
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        match timeout {
            Some(timeout) => Self::with_timeout(timeout),
            None => Self::new(),
        }
    }

    fn build(deadline: Option<Instant>) -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                deadline,
                cancelled,
            }),
        }
    }

    /// The absolute deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before the deadline. Zero once expired, `None` without a deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Cancel the call.
    ///
    /// Returns `true` if this invocation performed the transition and `false`
    /// if the call was already cancelled.
    pub fn cancel(&self) -> bool {
        self.inner.cancelled.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    /// Returns whether the call has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.borrow()
    }

    /// Resolves once the call is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.cancelled.subscribe();
        // The sender lives as long as `self`, so this only returns once the flag is set.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Resolves once the deadline passes. Never resolves without a deadline.
    pub async fn expired(&self) {
        match self.inner.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Check the context before starting new work.
    ///
    /// Fails with `Cancelled` if the call was cancelled, then with
    /// `DeadlineExceeded` if the deadline has passed.
    pub fn check(&self) -> Result<(), Status> {
        if self.is_cancelled() {
            return Err(Status::cancelled("call was cancelled"));
        }
        if self.is_expired() {
            return Err(Status::deadline_exceeded("call deadline exceeded"));
        }
        Ok(())
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the effective timeout from a default and a per-call timeout.
///
/// The smaller timeout always wins. Returns `None` if neither is set.
pub fn compute_effective_timeout(
    default_timeout: Option<Duration>,
    call_timeout: Option<Duration>,
) -> Option<Duration> {
    match (default_timeout, call_timeout) {
        (Some(default), Some(call)) => Some(default.min(call)),
        (Some(default), None) => Some(default),
        (None, Some(call)) => Some(call),
        (None, None) => None,
    }
}
