//! Stages: the atomic unit of work.
//!
//! A stage wraps an async handler with an optional before/after hook, a
//! retry policy and an optional rollback action. [`Stage::run`] never lets a
//! panic escape and records its outcome on the stage for later inspection.

mod retry;
mod status;

pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
pub use status::StageStatus;

use crate::cancellation::ExecutionContext;
use crate::errors::{ConfigError, HandlerError, RollbackError, StageError};
use crate::runtime::panic_message;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::backtrace::Backtrace;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Future returned by a boxed handler.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A unit of work, hook or rollback action.
pub type Handler = Arc<dyn Fn(ExecutionContext) -> HandlerFuture + Send + Sync>;

/// Boxes an async closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

#[derive(Debug, Default)]
struct StageState {
    status: StageStatus,
    last_error: Option<StageError>,
    attempts: u64,
}

/// A named unit of work with retry, hooks and an optional rollback.
///
/// Stages are not re-entrant: run a given instance from one task at a time.
pub struct Stage {
    description: String,
    handler: Handler,
    before_hook: Option<Handler>,
    after_hook: Option<Handler>,
    rollback_handler: Option<Handler>,
    retry: RetryPolicy,
    continue_on_error: bool,
    state: Mutex<StageState>,
}

impl Stage {
    /// Creates a stage from a description and an async handler.
    pub fn new<F, Fut>(description: impl Into<String>, f: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::from_handler(description, handler(f))
    }

    /// Creates a stage from an already boxed handler.
    #[must_use]
    pub fn from_handler(description: impl Into<String>, handler: Handler) -> Self {
        Self {
            description: description.into(),
            handler,
            before_hook: None,
            after_hook: None,
            rollback_handler: None,
            retry: RetryPolicy::default(),
            continue_on_error: false,
            state: Mutex::new(StageState::default()),
        }
    }

    /// Runs `f` before the retry loop. A failure skips the handler.
    #[must_use]
    pub fn with_before_hook<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.before_hook = Some(handler(f));
        self
    }

    /// Runs `f` after a successful retry loop. A failure overrides the success.
    #[must_use]
    pub fn with_after_hook<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.after_hook = Some(handler(f));
        self
    }

    /// Sets the compensating action run by an owning pipeline's rollback cascade.
    #[must_use]
    pub fn with_rollback<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.rollback_handler = Some(handler(f));
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Replaces the retry policy after checking it.
    pub fn try_with_retry(self, policy: RetryPolicy) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(self.with_retry(policy))
    }

    /// Sets the number of retries after the first attempt.
    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry = self.retry.with_retry_count(retry_count);
        self
    }

    /// Sets the base wait between attempts.
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry = self.retry.with_interval(interval);
        self
    }

    /// Keeps the owning pipeline going when this stage fails.
    #[must_use]
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Returns the stage description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns true if a failure of this stage must not abort the pipeline.
    #[must_use]
    pub fn continue_on_error(&self) -> bool {
        self.continue_on_error
    }

    /// Returns true if the stage has a rollback action.
    #[must_use]
    pub fn has_rollback(&self) -> bool {
        self.rollback_handler.is_some()
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the error recorded by the most recent run.
    #[must_use]
    pub fn last_error(&self) -> Option<StageError> {
        self.state.lock().last_error.clone()
    }

    /// Returns the stage status.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        self.state.lock().status
    }

    /// Returns how many times the handler was invoked by the most recent run.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.state.lock().attempts
    }

    /// Runs the stage: before hook, retry loop, after hook.
    ///
    /// Panics raised anywhere in the protocol are contained and returned as
    /// [`StageError::Panicked`]. The result is also recorded on the stage.
    pub async fn run(&self, ctx: &ExecutionContext) -> Result<(), StageError> {
        {
            let mut state = self.state.lock();
            state.status = StageStatus::Running;
            state.last_error = None;
            state.attempts = 0;
        }

        let result = match AssertUnwindSafe(self.run_protocol(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(StageError::Panicked {
                stage: self.description.clone(),
                message: panic_message(&*payload),
                backtrace: Arc::from(Backtrace::force_capture().to_string()),
            }),
        };

        {
            let mut state = self.state.lock();
            state.status = if result.is_ok() {
                StageStatus::Succeeded
            } else {
                StageStatus::Failed
            };
            state.last_error = result.as_ref().err().cloned();
        }
        result
    }

    async fn run_protocol(&self, ctx: &ExecutionContext) -> Result<(), StageError> {
        if let Some(before) = &self.before_hook {
            before(ctx.clone()).await.map_err(|e| StageError::BeforeHook {
                stage: self.description.clone(),
                source: HandlerError::new(e),
            })?;
        }

        let mut retry = 0u32;
        loop {
            self.state.lock().attempts += 1;
            let outcome = (self.handler)(ctx.clone()).await;
            let Err(err) = outcome else { break };

            if retry >= self.retry.retry_count {
                return Err(StageError::RetriesExhausted {
                    stage: self.description.clone(),
                    retries: retry,
                    source: HandlerError::new(err),
                });
            }

            let delay = self.retry.delay_for(retry);
            debug!(
                stage = %self.description,
                attempt = retry + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Retrying stage after error"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            retry += 1;
        }

        if let Some(after) = &self.after_hook {
            after(ctx.clone()).await.map_err(|e| StageError::AfterHook {
                stage: self.description.clone(),
                source: HandlerError::new(e),
            })?;
        }
        Ok(())
    }

    /// Invokes the rollback action, if any.
    ///
    /// Never called by [`run`](Self::run); owning pipelines decide when.
    pub async fn rollback(&self, ctx: &ExecutionContext) -> Result<(), RollbackError> {
        let Some(rollback) = &self.rollback_handler else {
            return Ok(());
        };

        let invocation = async { rollback(ctx.clone()).await };
        match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RollbackError::Failed {
                stage: self.description.clone(),
                source: HandlerError::new(e),
            }),
            Err(payload) => Err(RollbackError::Panicked {
                stage: self.description.clone(),
                message: panic_message(&*payload),
            }),
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("description", &self.description)
            .field("retry", &self.retry)
            .field("continue_on_error", &self.continue_on_error)
            .field("has_rollback", &self.has_rollback())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
