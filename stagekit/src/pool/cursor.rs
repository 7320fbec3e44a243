//! Shared claim cursor over a fixed stage list.

use crate::stage::Stage;
use parking_lot::Mutex;
use std::sync::Arc;

/// Hands out each stage exactly once, in declaration order, to whichever
/// worker asks first.
#[derive(Debug)]
pub(crate) struct StageCursor {
    stages: Arc<[Arc<Stage>]>,
    next: Mutex<usize>,
}

impl StageCursor {
    pub(crate) fn new(stages: Arc<[Arc<Stage>]>) -> Self {
        Self {
            stages,
            next: Mutex::new(0),
        }
    }

    /// Claims the next stage, or `None` once the list is exhausted.
    pub(crate) fn claim(&self) -> Option<(usize, Arc<Stage>)> {
        let mut next = self.next.lock();
        let stage = self.stages.get(*next)?;
        let index = *next;
        *next += 1;
        Some((index, Arc::clone(stage)))
    }
}
