//! Pieces shared by the three engines: stage list, pipeline-wide hooks, and
//! the per-stage driver that applies hooks and reports events.

use crate::cancellation::ExecutionContext;
use crate::errors::StageError;
use crate::events::{default_sink, EventKind, EventSink, RunEmitter};
use crate::runtime::panic_message;
use crate::stage::{Stage, StageStatus};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Observer invoked before or after every stage of an engine.
///
/// Observers see the stage itself, so an `after_every_stage` observer can read
/// [`Stage::last_error`] to raise alarms. A panicking observer is contained and
/// reported as a `stage.hook_panicked` event.
pub type StageObserver = Arc<dyn Fn(&ExecutionContext, &Stage) + Send + Sync>;

/// Pipeline-wide hooks, applied uniformly to every stage.
#[derive(Clone, Default)]
pub struct StageHooks {
    before_every_stage: Option<StageObserver>,
    after_every_stage: Option<StageObserver>,
}

impl StageHooks {
    /// Creates an empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the observer run before every stage.
    #[must_use]
    pub fn with_before_every_stage<F>(mut self, f: F) -> Self
    where
        F: Fn(&ExecutionContext, &Stage) + Send + Sync + 'static,
    {
        self.before_every_stage = Some(Arc::new(f));
        self
    }

    /// Sets the observer run after every stage.
    #[must_use]
    pub fn with_after_every_stage<F>(mut self, f: F) -> Self
    where
        F: Fn(&ExecutionContext, &Stage) + Send + Sync + 'static,
    {
        self.after_every_stage = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for StageHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageHooks")
            .field("before_every_stage", &self.before_every_stage.is_some())
            .field("after_every_stage", &self.after_every_stage.is_some())
            .finish()
    }
}

/// A failed stage, as listed by `stage_errors()`.
#[derive(Debug, Clone)]
pub struct StageFailure {
    /// Stage index in declaration order.
    pub index: usize,
    /// Stage description.
    pub stage: String,
    /// The recorded error.
    pub error: StageError,
}

/// Stage list, hooks and sink held by every engine.
pub(crate) struct EngineCore {
    pub(crate) stages: Vec<Arc<Stage>>,
    pub(crate) hooks: StageHooks,
    pub(crate) sink: Arc<dyn EventSink>,
}

impl Default for EngineCore {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            hooks: StageHooks::default(),
            sink: default_sink(),
        }
    }
}

impl EngineCore {
    pub(crate) fn push(&mut self, stage: Stage) -> Arc<Stage> {
        let stage = Arc::new(stage);
        self.stages.push(Arc::clone(&stage));
        stage
    }

    pub(crate) fn failures(&self) -> Vec<StageFailure> {
        self.stages
            .iter()
            .enumerate()
            .filter_map(|(index, stage)| {
                stage.last_error().map(|error| StageFailure {
                    index,
                    stage: stage.description().to_string(),
                    error,
                })
            })
            .collect()
    }

    pub(crate) fn count_status(&self, status: StageStatus) -> usize {
        self.stages.iter().filter(|s| s.status() == status).count()
    }

    pub(crate) fn runner(&self, emitter: RunEmitter) -> StageRunner {
        StageRunner {
            hooks: self.hooks.clone(),
            emitter,
        }
    }
}

impl fmt::Debug for EngineCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineCore")
            .field("stages", &self.stages.len())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// Drives one stage inside an engine run.
#[derive(Clone)]
pub(crate) struct StageRunner {
    hooks: StageHooks,
    emitter: RunEmitter,
}

impl StageRunner {
    /// Runs `before_every_stage`, the stage, then `after_every_stage`, and
    /// reports the outcome.
    pub(crate) async fn run(
        &self,
        ctx: &ExecutionContext,
        index: usize,
        stage: &Stage,
    ) -> Result<(), StageError> {
        self.observe("before_every_stage", self.hooks.before_every_stage.as_ref(), ctx, index, stage);

        self.emitter.emit(EventKind::StageStarted {
            index,
            stage: stage.description().to_string(),
        });
        let started = Instant::now();
        let result = stage.run(ctx).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(()) => self.emitter.emit(EventKind::StageSucceeded {
                index,
                stage: stage.description().to_string(),
                attempts: stage.attempts(),
                duration_ms,
            }),
            Err(err) => self.emitter.emit(EventKind::StageFailed {
                index,
                stage: stage.description().to_string(),
                error: err.to_string(),
                error_kind: err.kind().to_string(),
                masked: stage.continue_on_error(),
                attempts: stage.attempts(),
                duration_ms,
            }),
        }

        self.observe("after_every_stage", self.hooks.after_every_stage.as_ref(), ctx, index, stage);
        result
    }

    fn observe(
        &self,
        hook: &str,
        observer: Option<&StageObserver>,
        ctx: &ExecutionContext,
        index: usize,
        stage: &Stage,
    ) {
        let Some(observer) = observer else { return };
        if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| observer(ctx, stage))) {
            self.emitter.emit(EventKind::HookPanicked {
                index,
                stage: stage.description().to_string(),
                hook: hook.to_string(),
                message: panic_message(&*payload),
            });
        }
    }
}
