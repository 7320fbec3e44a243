//! Unordered worker pool.
//!
//! A fixed set of workers drains a shared stage cursor. Stages are
//! independent: a failure is recorded on its stage and reported to the event
//! sink, but never stops other stages and never produces a pool-level error.

mod cursor;

use crate::cancellation::ExecutionContext;
use crate::config::PoolConfig;
use crate::engine::{EngineCore, StageFailure, StageHooks};
use crate::errors::ConfigError;
use crate::events::{EngineKind, EventKind, EventSink, RunEmitter};
use crate::runtime::spawn_guarded;
use crate::stage::{Stage, StageStatus};
use cursor::StageCursor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Outcome counts of a pool run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolSummary {
    /// Stages in the pool.
    pub total: usize,
    /// Stages that succeeded.
    pub succeeded: usize,
    /// Stages that failed.
    pub failed: usize,
}

impl PoolSummary {
    /// Returns true if no stage failed.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.succeeded == self.total
    }
}

/// Runs independent stages on up to `max_concurrency` workers.
#[derive(Debug, Default)]
pub struct WorkerPool {
    core: EngineCore,
    config: PoolConfig,
}

impl WorkerPool {
    /// Creates an empty pool with the default worker limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty pool with the given configuration.
    pub fn with_config(config: PoolConfig) -> Result<Self, ConfigError> {
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

    /// Replaces the pool-wide hooks.
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
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Every stage that failed in the last run.
    #[must_use]
    pub fn failures(&self) -> Vec<StageFailure> {
        self.core.failures()
    }

    /// Same as [`failures`](Self::failures).
    #[must_use]
    pub fn stage_errors(&self) -> Vec<StageFailure> {
        self.failures()
    }

    /// Runs every stage once and waits for all workers to exit.
    pub async fn run(&self, ctx: &ExecutionContext) -> PoolSummary {
        let emitter = RunEmitter::new(Arc::clone(&self.core.sink), EngineKind::Pool);
        let runner = self.core.runner(emitter.clone());
        let started = Instant::now();
        let stages: Arc<[Arc<Stage>]> = self.core.stages.iter().cloned().collect();
        let cursor = Arc::new(StageCursor::new(stages));
        let workers = self.config.worker_count(self.core.stages.len());
        debug!(run_id = %emitter.run_id(), stages = self.core.stages.len(), workers, "Starting worker pool");

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let cursor = Arc::clone(&cursor);
                let runner = runner.clone();
                let ctx = ctx.clone();
                spawn_guarded(format!("pool worker {worker}"), async move {
                    let mut processed = 0_usize;
                    while let Some((index, stage)) = cursor.claim() {
                        // Errors stay on the stage and in the sink.
                        let _ = runner.run(&ctx, index, &stage).await;
                        processed += 1;
                    }
                    processed
                })
            })
            .collect();

        for (worker, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Some(processed)) => debug!(run_id = %emitter.run_id(), worker, processed, "Worker exited"),
                Ok(None) => warn!(run_id = %emitter.run_id(), worker, "Worker panicked"),
                Err(err) => warn!(run_id = %emitter.run_id(), worker, error = %err, "Worker task failed"),
            }
        }

        let summary = PoolSummary {
            total: self.core.stages.len(),
            succeeded: self.core.count_status(StageStatus::Succeeded),
            failed: self.core.count_status(StageStatus::Failed),
        };
        emitter.emit(EventKind::RunCompleted {
            total: summary.total,
            succeeded: summary.succeeded,
            failed: summary.failed,
            abort_index: None,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        });
        summary
    }
}
