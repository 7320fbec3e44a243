//! Error types for the stagekit engines.
//!
//! Handler-supplied failures travel as [`anyhow::Error`] wrapped in a
//! cloneable [`HandlerError`], so a [`StageError`] can be stored on the stage
//! and returned to the caller at the same time.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A cloneable wrapper around an error returned by a user handler.
#[derive(Clone)]
pub struct HandlerError(Arc<anyhow::Error>);

impl HandlerError {
    /// Wraps an [`anyhow::Error`].
    #[must_use]
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    /// Returns the wrapped error.
    #[must_use]
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Attempts to downcast the wrapped error to a concrete type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let inner: &(dyn std::error::Error + Send + Sync + 'static) = (*self.0).as_ref();
        inner.source()
    }
}

/// Error produced by a single [`Stage::run`](crate::stage::Stage::run).
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// A hook or the handler panicked. The panic was contained.
    #[error("{stage} occur panic: {message}")]
    Panicked {
        /// Stage description.
        stage: String,
        /// Panic payload rendered as text.
        message: String,
        /// Backtrace captured where the panic was recovered.
        backtrace: Arc<str>,
    },

    /// The before-stage hook failed; the handler never ran.
    #[error("before stage error: {source}")]
    BeforeHook {
        /// Stage description.
        stage: String,
        /// The hook's error.
        #[source]
        source: HandlerError,
    },

    /// The handler failed on every attempt.
    #[error("run handler[last retry count:{retries}] error: {source}")]
    RetriesExhausted {
        /// Stage description.
        stage: String,
        /// Number of retries performed after the first attempt.
        retries: u32,
        /// The last attempt's error.
        #[source]
        source: HandlerError,
    },

    /// The after-stage hook failed, overriding a successful run.
    #[error("after stage error: {source}")]
    AfterHook {
        /// Stage description.
        stage: String,
        /// The hook's error.
        #[source]
        source: HandlerError,
    },
}

impl StageError {
    /// Returns the description of the stage that produced this error.
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            Self::Panicked { stage, .. }
            | Self::BeforeHook { stage, .. }
            | Self::RetriesExhausted { stage, .. }
            | Self::AfterHook { stage, .. } => stage,
        }
    }

    /// Returns the underlying handler error, if the failure was not a panic.
    #[must_use]
    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            Self::Panicked { .. } => None,
            Self::BeforeHook { source, .. }
            | Self::RetriesExhausted { source, .. }
            | Self::AfterHook { source, .. } => Some(source),
        }
    }

    /// Returns true if the failure was a contained panic.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }

    /// Short machine-readable kind, used in emitted events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Panicked { .. } => "panicked",
            Self::BeforeHook { .. } => "before_hook",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::AfterHook { .. } => "after_hook",
        }
    }
}

/// Error produced by a stage's rollback handler.
///
/// Rollback errors are reported to the event sink and logged; they are never
/// returned from a pipeline run.
#[derive(Debug, Clone, Error)]
pub enum RollbackError {
    /// The rollback handler returned an error.
    #[error("{stage} RollbackFn error: {source}")]
    Failed {
        /// Stage description.
        stage: String,
        /// The rollback handler's error.
        #[source]
        source: HandlerError,
    },

    /// The rollback handler panicked.
    #[error("{stage} RollbackFn panic: {message}")]
    Panicked {
        /// Stage description.
        stage: String,
        /// Panic payload rendered as text.
        message: String,
    },
}

impl RollbackError {
    /// Returns the description of the stage being rolled back.
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            Self::Failed { stage, .. } | Self::Panicked { stage, .. } => stage,
        }
    }
}

/// Error returned from a pipeline run.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// An unmasked stage failure aborted the pipeline.
    #[error("stage {index} ({stage}) aborted the pipeline: {source}")]
    StageFailed {
        /// Index of the aborting stage.
        index: usize,
        /// Description of the aborting stage.
        stage: String,
        /// The stage's error.
        #[source]
        source: StageError,
    },

    /// Stage admission failed because the caller's context was cancelled.
    #[error("pipeline cancelled: {0}")]
    Cancelled(String),
}

impl PipelineError {
    /// Returns the index of the aborting stage, if this is a stage failure.
    #[must_use]
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            Self::StageFailed { index, .. } => Some(*index),
            Self::Cancelled(_) => None,
        }
    }

    /// Returns the aborting stage's error, if this is a stage failure.
    #[must_use]
    pub fn stage_error(&self) -> Option<&StageError> {
        match self {
            Self::StageFailed { source, .. } => Some(source),
            Self::Cancelled(_) => None,
        }
    }
}

/// Error raised when an engine configuration is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `max_concurrency` must be at least one.
    #[error("max_concurrency must be greater than zero")]
    ZeroConcurrency,

    /// `max_interval_ms` is smaller than `retry_interval_ms`.
    #[error("max_interval_ms ({max_ms}) must not be smaller than retry_interval_ms ({base_ms})")]
    IntervalCap {
        /// Configured base interval.
        base_ms: u64,
        /// Configured cap.
        max_ms: u64,
    },

    /// A log directive could not be parsed.
    #[error("invalid log filter '{0}'")]
    InvalidLogFilter(String),

    /// A global tracing subscriber is already installed.
    #[error("logging already initialised: {0}")]
    LoggingInitialised(String),
}
