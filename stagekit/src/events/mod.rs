//! Diagnostics events.
//!
//! Every engine reports stage outcomes, rollbacks and run completion to an
//! injected [`EventSink`]. There is no process-wide sink: each engine holds
//! its own `Arc<dyn EventSink>`, defaulting to [`LoggingEventSink`].

mod event;
mod sink;

pub use event::{EngineEvent, EngineKind, EventKind};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

#[cfg(test)]
pub use sink::MockEventSink;

use crate::runtime::panic_message;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Stamps events of one run with its id and engine kind.
#[derive(Clone)]
pub(crate) struct RunEmitter {
    sink: Arc<dyn EventSink>,
    run_id: Uuid,
    engine: EngineKind,
}

impl RunEmitter {
    pub(crate) fn new(sink: Arc<dyn EventSink>, engine: EngineKind) -> Self {
        Self {
            sink,
            run_id: Uuid::now_v7(),
            engine,
        }
    }

    pub(crate) fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Delivers one event. A panicking sink is logged and otherwise ignored.
    pub(crate) fn emit(&self, kind: EventKind) {
        let event = EngineEvent::new(self.run_id, self.engine, kind);
        if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| self.sink.emit(&event))) {
            error!(
                run_id = %self.run_id,
                event_type = event.event_type(),
                panic = %panic_message(&*payload),
                "Event sink panicked"
            );
        }
    }
}

/// The sink engines use when none is configured.
#[must_use]
pub fn default_sink() -> Arc<dyn EventSink> {
    Arc::new(LoggingEventSink::default())
}
