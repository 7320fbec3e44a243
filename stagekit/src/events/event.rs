//! Engine events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which engine produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Sequential abort-on-error pipeline.
    Sequential,
    /// Bounded-concurrency pipeline.
    Bounded,
    /// Unordered worker pool.
    Pool,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Bounded => write!(f, "bounded"),
            Self::Pool => write!(f, "pool"),
        }
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A stage was admitted and is about to run.
    StageStarted {
        /// Stage index in declaration order.
        index: usize,
        /// Stage description.
        stage: String,
    },
    /// A stage finished without error.
    StageSucceeded {
        /// Stage index.
        index: usize,
        /// Stage description.
        stage: String,
        /// Handler invocations.
        attempts: u64,
        /// Wall time in milliseconds.
        duration_ms: f64,
    },
    /// A stage finished with an error.
    StageFailed {
        /// Stage index.
        index: usize,
        /// Stage description.
        stage: String,
        /// Rendered error.
        error: String,
        /// Error kind (`panicked`, `before_hook`, ...).
        error_kind: String,
        /// True if the stage is `continue_on_error`.
        masked: bool,
        /// Handler invocations.
        attempts: u64,
        /// Wall time in milliseconds.
        duration_ms: f64,
    },
    /// A pipeline-wide observer hook panicked; the panic was contained.
    HookPanicked {
        /// Stage index.
        index: usize,
        /// Stage description.
        stage: String,
        /// `before_every_stage` or `after_every_stage`.
        hook: String,
        /// Panic payload.
        message: String,
    },
    /// A pipeline stopped starting new stages because of a stage failure.
    PipelineAborted {
        /// Index of the aborting stage.
        index: usize,
        /// Aborting stage description.
        stage: String,
        /// Rendered error.
        error: String,
    },
    /// Stage admission stopped because the caller's context was cancelled.
    AdmissionCancelled {
        /// Index of the first stage that was not admitted.
        index: usize,
        /// Cancellation cause.
        reason: String,
    },
    /// A rollback action completed.
    RollbackSucceeded {
        /// Stage index.
        index: usize,
        /// Stage description.
        stage: String,
    },
    /// A rollback action failed. The cascade continues.
    RollbackFailed {
        /// Stage index.
        index: usize,
        /// Stage description.
        stage: String,
        /// Rendered error.
        error: String,
    },
    /// A run finished.
    RunCompleted {
        /// Stages in the engine.
        total: usize,
        /// Stages that succeeded.
        succeeded: usize,
        /// Stages that failed.
        failed: usize,
        /// Index of the aborting stage, if any.
        abort_index: Option<usize>,
        /// Wall time in milliseconds.
        duration_ms: f64,
    },
}

impl EventKind {
    /// Returns the dotted event type, e.g. `stage.failed`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StageStarted { .. } => "stage.started",
            Self::StageSucceeded { .. } => "stage.succeeded",
            Self::StageFailed { .. } => "stage.failed",
            Self::HookPanicked { .. } => "stage.hook_panicked",
            Self::PipelineAborted { .. } => "pipeline.aborted",
            Self::AdmissionCancelled { .. } => "pipeline.admission_cancelled",
            Self::RollbackSucceeded { .. } => "rollback.succeeded",
            Self::RollbackFailed { .. } => "rollback.failed",
            Self::RunCompleted { .. } => "run.completed",
        }
    }
}

/// An event emitted by an engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Identifies the run; shared by all events of one `run` call.
    pub run_id: Uuid,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Emitting engine.
    pub engine: EngineKind,
    /// Payload.
    #[serde(flatten)]
    pub kind: EventKind,
}

impl EngineEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(run_id: Uuid, engine: EngineKind, kind: EventKind) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            engine,
            kind,
        }
    }

    /// Returns the dotted event type.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Serializes the event to JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
