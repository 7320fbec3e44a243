//! Event sink trait and implementations.

use super::{EngineEvent, EventKind};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn, Level};

/// Receives diagnostics from the engines.
///
/// Sinks are injected into each engine at construction. Implementations must
/// not block for long and must never panic; the engines call them inline.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    /// Receives one event.
    fn emit(&self, event: &EngineEvent);
}

/// A no-op event sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &EngineEvent) {}
}

/// An event sink that logs events using the tracing framework.
///
/// Routine events are logged at the configured level; failures are always
/// logged at WARN (stage failures) or ERROR (rollback failures, contained
/// hook panics).
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    /// The log level for routine events.
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates an info-level logging sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn log_routine(&self, event: &EngineEvent) {
        let data = event.to_json();
        if self.level <= Level::INFO {
            // tracing orders more severe levels lower.
            info!(
                run_id = %event.run_id,
                engine = %event.engine,
                event_type = event.event_type(),
                event_data = %data,
                "Event: {}", event.event_type()
            );
        } else {
            debug!(
                run_id = %event.run_id,
                engine = %event.engine,
                event_type = event.event_type(),
                event_data = %data,
                "Event: {}", event.event_type()
            );
        }
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &EngineEvent) {
        match &event.kind {
            EventKind::StageFailed {
                index,
                stage,
                error,
                masked,
                ..
            } => {
                warn!(
                    run_id = %event.run_id,
                    engine = %event.engine,
                    index,
                    masked,
                    "{} occur error: {}", stage, error
                );
            }
            EventKind::PipelineAborted { index, stage, error } => {
                warn!(
                    run_id = %event.run_id,
                    engine = %event.engine,
                    index,
                    "pipeline aborted at {}: {}", stage, error
                );
            }
            EventKind::RollbackFailed { index, error, .. } => {
                error!(
                    run_id = %event.run_id,
                    engine = %event.engine,
                    index,
                    "{}", error
                );
            }
            EventKind::HookPanicked {
                index,
                stage,
                hook,
                message,
            } => {
                error!(
                    run_id = %event.run_id,
                    engine = %event.engine,
                    index,
                    hook = %hook,
                    "{} hook panicked for {}: {}", hook, stage, message
                );
            }
            _ => self.log_routine(event),
        }
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<EngineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events whose dotted type starts with `type_prefix`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<EngineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Returns the dotted types of all events, in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(EngineEvent::event_type).collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &EngineEvent) {
        self.events.write().push(event.clone());
    }
}
