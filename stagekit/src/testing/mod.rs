//! Testing utilities for stagekit engines.
//!
//! This module provides:
//! - Recorders for call order and handler concurrency
//! - Ready-made stages (recording, failing, panicking, slow, flaky)
//!
//! [`CollectingEventSink`](crate::events::CollectingEventSink) complements
//! these for asserting on emitted events.

mod fixtures;
mod mocks;

pub use fixtures::{CallLog, ConcurrencyProbe, ProbeGuard};
pub use mocks::{failing_stage, flaky_stage, panicking_stage, recording_stage, slow_stage};
