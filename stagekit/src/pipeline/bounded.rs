//! Bounded-concurrency pipeline.
//!
//! Stages are admitted in declaration order through a counting semaphore and
//! run as independent tokio tasks. An unmasked failure cancels the shared run
//! context so that no further stage is admitted; tasks already running are
//! left to finish. Once every task has been joined the lowest-indexed failure
//! becomes the pipeline's error and the rollback cascade runs from it.

use super::rollback::rollback_cascade;
use crate::cancellation::ExecutionContext;
use crate::config::PipelineConfig;
use crate::engine::{EngineCore, StageFailure, StageHooks};
use crate::errors::{ConfigError, PipelineError, RollbackError, StageError};
use crate::events::{EngineKind, EventKind, EventSink, RunEmitter};
use crate::runtime::panic_message;
use crate::stage::{Stage, StageStatus};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

/// Runs stages concurrently, at most `max_concurrency` at a time.
#[derive(Debug, Default)]
pub struct BoundedPipeline {
    core: EngineCore,
    config: PipelineConfig,
    abort_index: Option<usize>,
    rollback_errors: Vec<RollbackError>,
}

impl BoundedPipeline {
    /// Creates an empty pipeline with the default admission limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty pipeline with the given configuration.
    pub fn with_config(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
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

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Index of the stage whose error the last run returned, if any.
    #[must_use]
    pub fn abort_index(&self) -> Option<usize> {
        self.abort_index
    }

    /// Rollback failures of the last run, in cascade order.
    #[must_use]
    pub fn rollback_errors(&self) -> &[RollbackError] {
        &self.rollback_errors
    }

    /// Failed stages up to and including the abort index.
    ///
    /// Without an abort every failed stage is listed.
    #[must_use]
    pub fn stage_errors(&self) -> Vec<StageFailure> {
        let mut failures = self.core.failures();
        if let Some(abort) = self.abort_index {
            failures.retain(|f| f.index <= abort);
        }
        failures
    }

    /// Runs the pipeline.
    pub async fn run(&mut self, ctx: &ExecutionContext) -> Result<(), PipelineError> {
        self.abort_index = None;
        self.rollback_errors.clear();

        let emitter = RunEmitter::new(Arc::clone(&self.core.sink), EngineKind::Bounded);
        let runner = self.core.runner(emitter.clone());
        let started = Instant::now();
        let run_ctx = ctx.child();
        let limiter = Arc::new(Semaphore::new(
            self.config.max_concurrency.min(Semaphore::MAX_PERMITS),
        ));
        debug!(
            run_id = %emitter.run_id(),
            stages = self.core.stages.len(),
            max_concurrency = self.config.max_concurrency,
            "Starting bounded pipeline"
        );

        let mut tasks: Vec<(usize, JoinHandle<Result<(), StageError>>)> =
            Vec::with_capacity(self.core.stages.len());
        let mut admission_stopped = None;

        for (index, stage) in self.core.stages.iter().enumerate() {
            let Some(permit) = admit(&run_ctx, &limiter).await else {
                debug!(run_id = %emitter.run_id(), index, "Admission stopped");
                admission_stopped = Some(index);
                break;
            };

            let stage = Arc::clone(stage);
            let runner = runner.clone();
            let task_ctx = run_ctx.clone();
            tasks.push((
                index,
                tokio::spawn(async move {
                    let _permit = permit;
                    let result = runner.run(&task_ctx, index, &stage).await;
                    if result.is_err() && !stage.continue_on_error() {
                        task_ctx.cancel(format!("stage {index} ({}) failed", stage.description()));
                    }
                    result
                }),
            ));
        }

        // Tasks are joined in index order, so the first unmasked failure seen
        // is the lowest-indexed one.
        let mut first_failure: Option<(usize, StageError)> = None;
        for (index, handle) in tasks {
            let stage = &self.core.stages[index];
            let result = handle
                .await
                .unwrap_or_else(|err| Err(join_failure(stage.description(), err)));
            if let Err(err) = result {
                if !stage.continue_on_error() && first_failure.is_none() {
                    first_failure = Some((index, err));
                }
            }
        }

        let outcome = if let Some((index, source)) = first_failure {
            self.abort_index = Some(index);
            let stage = self.core.stages[index].description().to_string();
            emitter.emit(EventKind::PipelineAborted {
                index,
                stage: stage.clone(),
                error: source.to_string(),
            });
            self.rollback_errors = rollback_cascade(&self.core.stages, index, ctx, &emitter).await;
            Err(PipelineError::StageFailed { index, stage, source })
        } else if let Some(index) = admission_stopped {
            let reason = ctx
                .cancel_reason()
                .or_else(|| run_ctx.cancel_reason())
                .unwrap_or_else(|| "cancelled".to_string());
            emitter.emit(EventKind::AdmissionCancelled {
                index,
                reason: reason.clone(),
            });
            Err(PipelineError::Cancelled(reason))
        } else {
            Ok(())
        };

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

/// Waits for a permit unless the run context is cancelled first.
async fn admit(run_ctx: &ExecutionContext, limiter: &Arc<Semaphore>) -> Option<OwnedSemaphorePermit> {
    let permit = tokio::select! {
        biased;
        () = run_ctx.cancelled() => None,
        permit = Arc::clone(limiter).acquire_owned() => permit.ok(),
    }?;
    // A permit freed by a failing task can race with that task's cancel.
    if run_ctx.is_cancelled() {
        return None;
    }
    Some(permit)
}

fn join_failure(stage: &str, err: JoinError) -> StageError {
    warn!(stage = %stage, error = %err, "Stage task did not complete");
    let message = match err.try_into_panic() {
        Ok(payload) => panic_message(&*payload),
        Err(err) => err.to_string(),
    };
    StageError::Panicked {
        stage: stage.to_string(),
        message,
        backtrace: Arc::from(std::backtrace::Backtrace::force_capture().to_string()),
    }
}
