//! Ready-made stages for tests.

use super::CallLog;
use crate::stage::Stage;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A stage that records its description into `log` and succeeds.
#[must_use]
pub fn recording_stage(name: &str, log: &CallLog) -> Stage {
    let log = log.clone();
    let entry = name.to_string();
    Stage::new(name, move |_| {
        log.record(entry.clone());
        async { Ok(()) }
    })
}

/// A stage that records its description into `log` and fails with `message`.
#[must_use]
pub fn failing_stage(name: &str, message: &str, log: &CallLog) -> Stage {
    let log = log.clone();
    let entry = name.to_string();
    let message = message.to_string();
    Stage::new(name, move |_| {
        log.record(entry.clone());
        let message = message.clone();
        async move { Err(anyhow::anyhow!(message)) }
    })
}

/// A stage whose handler panics with `message`.
#[must_use]
pub fn panicking_stage(name: &str, message: &'static str) -> Stage {
    Stage::new(name, move |_| async move {
        if !message.is_empty() {
            panic!("{message}");
        }
        Ok(())
    })
}

/// A stage that sleeps for `delay` before succeeding.
#[must_use]
pub fn slow_stage(name: &str, delay: Duration) -> Stage {
    Stage::new(name, move |_| async move {
        tokio::time::sleep(delay).await;
        Ok(())
    })
}

/// A stage that fails its first `failures` invocations and then succeeds.
///
/// Returns the stage and a counter of invocations.
#[must_use]
pub fn flaky_stage(name: &str, failures: u32) -> (Stage, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let stage = Stage::new(name, move |_| {
        let call = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if call < failures {
                anyhow::bail!("transient failure {}", call + 1);
            }
            Ok(())
        }
    });
    (stage, calls)
}
