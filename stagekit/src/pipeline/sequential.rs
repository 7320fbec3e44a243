//! Sequential abort-on-error pipeline.

use super::rollback::rollback_cascade;
use crate::cancellation::ExecutionContext;
use crate::engine::{EngineCore, StageFailure, StageHooks};
use crate::errors::{PipelineError, RollbackError};
use crate::events::{EngineKind, EventKind, EventSink, RunEmitter};
use crate::stage::{Stage, StageStatus};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Runs stages one after another in declaration order.
///
/// The first failing stage that is not `continue_on_error` aborts the run:
/// no later stage starts, and every stage from the aborting one back to the
/// first is rolled back.
#[derive(Debug, Default)]
pub struct SequentialPipeline {
    core: EngineCore,
    abort_index: Option<usize>,
    rollback_errors: Vec<RollbackError>,
}

impl SequentialPipeline {
    /// Creates an empty pipeline that reports to a [`LoggingEventSink`](crate::events::LoggingEventSink).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.core.sink = sink;
        self
    }

    /// Replaces the pipeline-wide hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: StageHooks) -> Self {
        self.core.hooks = hooks;
        self
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.core.push(stage);
        self
    }

    /// Appends a stage and returns a handle for inspecting it after the run.
    pub fn add_stage(&mut self, stage: Stage) -> Arc<Stage> {
        self.core.push(stage)
    }

    /// Returns the stages in declaration order.
    #[must_use]
    pub fn stages(&self) -> &[Arc<Stage>] {
        &self.core.stages
    }

    /// Index of the stage that aborted the last run, if any.
    #[must_use]
    pub fn abort_index(&self) -> Option<usize> {
        self.abort_index
    }

    /// Rollback failures of the last run, in cascade order.
    #[must_use]
    pub fn rollback_errors(&self) -> &[RollbackError] {
        &self.rollback_errors
    }

    /// Every stage that recorded an error, masked ones included.
    #[must_use]
    pub fn stage_errors(&self) -> Vec<StageFailure> {
        self.core.failures()
    }

    /// Runs the pipeline.
    ///
    /// Returns the aborting stage's error, or `Ok(())` if every stage either
    /// succeeded or was masked by `continue_on_error`.
    pub async fn run(&mut self, ctx: &ExecutionContext) -> Result<(), PipelineError> {
        self.abort_index = None;
        self.rollback_errors.clear();

        let emitter = RunEmitter::new(Arc::clone(&self.core.sink), EngineKind::Sequential);
        let runner = self.core.runner(emitter.clone());
        let started = Instant::now();
        debug!(run_id = %emitter.run_id(), stages = self.core.stages.len(), "Starting sequential pipeline");

        let mut outcome = Ok(());
        for (index, stage) in self.core.stages.iter().enumerate() {
            if let Err(err) = runner.run(ctx, index, stage).await {
                if stage.continue_on_error() {
                    continue;
                }
                self.abort_index = Some(index);
                outcome = Err(PipelineError::StageFailed {
                    index,
                    stage: stage.description().to_string(),
                    source: err,
                });
                break;
            }
        }

        if let Err(PipelineError::StageFailed { index, stage, source }) = &outcome {
            emitter.emit(EventKind::PipelineAborted {
                index: *index,
                stage: stage.clone(),
                error: source.to_string(),
            });
            self.rollback_errors = rollback_cascade(&self.core.stages, *index, ctx, &emitter).await;
        }

        emitter.emit(EventKind::RunCompleted {
            total: self.core.stages.len(),
            succeeded: self.core.count_status(StageStatus::Succeeded),
            failed: self.core.count_status(StageStatus::Failed),
            abort_index: self.abort_index,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        });
        outcome
    }
}
