//! Observability utilities.
//!
//! Engines log through `tracing` and report structured events to an
//! [`EventSink`](crate::events::EventSink). This module installs the global
//! subscriber that renders those logs.

mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};
