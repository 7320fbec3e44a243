//! Backward rollback cascade.

use crate::cancellation::ExecutionContext;
use crate::errors::RollbackError;
use crate::events::{EventKind, RunEmitter};
use crate::stage::Stage;
use std::sync::Arc;
use tracing::{debug, warn};

/// Rolls back stages `from, from-1, ..., 0`.
///
/// Stages without a rollback action are skipped. A failing rollback is
/// reported and logged; the cascade always continues down to index 0.
pub(crate) async fn rollback_cascade(
    stages: &[Arc<Stage>],
    from: usize,
    ctx: &ExecutionContext,
    emitter: &RunEmitter,
) -> Vec<RollbackError> {
    let mut failures = Vec::new();
    let upper = from.min(stages.len().saturating_sub(1));

    for index in (0..=upper).rev() {
        let Some(stage) = stages.get(index) else { continue };
        if !stage.has_rollback() {
            continue;
        }

        debug!(run_id = %emitter.run_id(), index, stage = %stage.description(), "Rolling back stage");
        match stage.rollback(ctx).await {
            Ok(()) => emitter.emit(EventKind::RollbackSucceeded {
                index,
                stage: stage.description().to_string(),
            }),
            Err(err) => {
                warn!(run_id = %emitter.run_id(), index, error = %err, "Rollback failed, continuing cascade");
                emitter.emit(EventKind::RollbackFailed {
                    index,
                    stage: stage.description().to_string(),
                    error: err.to_string(),
                });
                failures.push(err);
            }
        }
    }

    failures
}
