//! Execution context handed to every handler, hook and rollback.

use super::CancellationToken;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Why a context is no longer live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelCause {
    /// Cancellation was requested with the given reason.
    Cancelled(String),
    /// The context's deadline has passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled(reason) => write!(f, "cancelled: {reason}"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// A cheaply cloneable cancellation and deadline carrier.
///
/// Cancellation is cooperative: the engines never interrupt a running
/// handler, handlers are expected to check [`is_cancelled`](Self::is_cancelled)
/// or race their work against [`cancelled`](Self::cancelled).
#[derive(Clone, Default)]
pub struct ExecutionContext {
    token: Arc<CancellationToken>,
    deadline: Option<Instant>,
}

impl ExecutionContext {
    /// Creates a root context with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a context that is cancelled with this one but can also be
    /// cancelled on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: CancellationToken::child_of(&self.token),
            deadline: self.deadline,
        }
    }

    /// Derives a child context whose deadline is at most `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a child context with the earlier of `deadline` and the
    /// current deadline.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.child();
        child.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        child
    }

    /// Requests cancellation of this context and all contexts derived from it.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.token.cancel(reason);
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline, if any.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns true once cancelled or past the deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_cause().is_some()
    }

    /// Returns why the context is done, or `None` while it is live.
    #[must_use]
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        if self.token.is_cancelled() {
            return Some(CancelCause::Cancelled(self.token.reason().unwrap_or_default()));
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelCause::DeadlineExceeded),
            _ => None,
        }
    }

    /// Renders the cancel cause, e.g. `cancelled: shutdown`.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<String> {
        self.cancel_cause().map(|cause| cause.to_string())
    }

    /// Waits until the context is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Returns the underlying token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}
