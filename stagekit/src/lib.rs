//! # Stagekit
//!
//! A staged task execution engine.
//!
//! Work is expressed as [`Stage`](stage::Stage)s: async handlers with an
//! optional before/after hook, a retry policy and an optional rollback
//! action. Three engines run them:
//!
//! - **Sequential pipeline**: declaration order, abort on the first unmasked
//!   failure, then roll back from the failing stage to the first
//! - **Bounded-concurrency pipeline**: ordered admission through a counting
//!   limiter, stop admitting on failure, report the lowest-indexed failure
//! - **Worker pool**: a fixed set of workers drains a shared cursor with no
//!   ordering or abort semantics
//!
//! Panics inside handlers and hooks are contained and surface as
//! [`StageError::Panicked`](errors::StageError::Panicked). Engines report
//! what happens to an injected [`EventSink`](events::EventSink).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagekit::prelude::*;
//!
//! let mut pipeline = SequentialPipeline::new()
//!     .stage(Stage::new("reserve stock", |_ctx| async { Ok(()) })
//!         .with_rollback(|_ctx| async { Ok(()) }))
//!     .stage(Stage::new("charge card", |_ctx| async { Ok(()) })
//!         .with_retry_count(3)
//!         .with_retry_interval(Duration::from_millis(200)));
//!
//! pipeline.run(&ExecutionContext::new()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod pool;
pub mod runtime;
pub mod stage;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancelCause, CancellationToken, ExecutionContext};
    pub use crate::config::{PipelineConfig, PoolConfig};
    pub use crate::engine::{StageFailure, StageHooks};
    pub use crate::errors::{
        ConfigError, HandlerError, PipelineError, RollbackError, StageError,
    };
    pub use crate::events::{
        CollectingEventSink, EngineEvent, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::observability::{init_logging, LogConfig, LogFormat};
    pub use crate::pipeline::{BoundedPipeline, SequentialPipeline};
    pub use crate::pool::{PoolSummary, WorkerPool};
    pub use crate::runtime::spawn_guarded;
    pub use crate::stage::{
        BackoffStrategy, JitterStrategy, RetryPolicy, Stage, StageStatus,
    };
    pub use std::time::Duration;
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[tokio::test]
    async fn test_prelude_covers_a_full_run() {
        let sink = std::sync::Arc::new(CollectingEventSink::new());
        let mut pipeline = SequentialPipeline::new()
            .with_event_sink(sink.clone())
            .stage(Stage::new("reserve stock", |_| async { Ok(()) }).with_rollback(|_| async { Ok(()) }))
            .stage(
                Stage::new("charge card", |_| async { Ok(()) })
                    .with_retry_count(3)
                    .with_retry_interval(Duration::from_millis(200)),
            );

        pipeline.run(&ExecutionContext::new()).await.unwrap();

        assert!(pipeline.stages().iter().all(|s| s.status() == StageStatus::Succeeded));
        assert_eq!(sink.events_of_type("run.completed").len(), 1);
    }
}
