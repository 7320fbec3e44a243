//! End-to-end scenarios across the three engines.

#[cfg(test)]
mod tests {
    use crate::cancellation::ExecutionContext;
    use crate::config::{PipelineConfig, PoolConfig};
    use crate::errors::PipelineError;
    use crate::events::{CollectingEventSink, EventKind, MockEventSink};
    use crate::pipeline::{BoundedPipeline, SequentialPipeline};
    use crate::pool::WorkerPool;
    use crate::stage::{Stage, StageStatus};
    use crate::testing::{
        failing_stage, flaky_stage, panicking_stage, recording_stage, slow_stage, CallLog,
        ConcurrencyProbe,
    };
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    fn with_logged_rollback(stage: Stage, log: &CallLog, fail: bool) -> Stage {
        let log = log.clone();
        let entry = format!("rollback {}", stage.description());
        stage.with_rollback(move |_| {
            log.record(entry.clone());
            async move {
                if fail {
                    anyhow::bail!("undo failed");
                }
                Ok(())
            }
        })
    }

    fn probed(name: String, delay: Duration, probe: &ConcurrencyProbe) -> Stage {
        let probe = probe.clone();
        Stage::new(name, move |_| {
            let probe = probe.clone();
            async move {
                let _inside = probe.enter();
                tokio::time::sleep(delay).await;
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_rollback_runs_backwards_from_abort() {
        let log = CallLog::new();
        let mut pipeline = SequentialPipeline::new()
            .stage(with_logged_rollback(recording_stage("A", &log), &log, false))
            .stage(with_logged_rollback(recording_stage("B", &log), &log, true))
            .stage(failing_stage("C", "C broke", &log));

        let err = pipeline.run(&ExecutionContext::new()).await.unwrap_err();

        assert_eq!(log.entries(), vec!["A", "B", "C", "rollback B", "rollback A"]);
        assert_eq!(err.stage_index(), Some(2));
        assert_eq!(pipeline.abort_index(), Some(2));
        assert_eq!(pipeline.rollback_errors().len(), 1);
        assert_eq!(pipeline.rollback_errors()[0].to_string(), "B RollbackFn error: undo failed");
    }

    #[tokio::test]
    async fn test_aborting_stage_rolls_itself_back() {
        let log = CallLog::new();
        let mut pipeline = SequentialPipeline::new()
            .stage(with_logged_rollback(recording_stage("A", &log), &log, false))
            .stage(with_logged_rollback(failing_stage("B", "boom", &log), &log, false))
            .stage(with_logged_rollback(recording_stage("C", &log), &log, false));

        let _ = pipeline.run(&ExecutionContext::new()).await;

        assert_eq!(log.entries(), vec!["A", "B", "rollback B", "rollback A"]);
    }

    #[tokio::test]
    async fn test_masked_failures_still_reported() {
        let log = CallLog::new();
        let sink = Arc::new(CollectingEventSink::new());
        let mut pipeline = SequentialPipeline::new()
            .with_event_sink(sink.clone())
            .stage(recording_stage("A", &log))
            .stage(failing_stage("B", "tolerated", &log).with_continue_on_error(true))
            .stage(recording_stage("C", &log));

        pipeline.run(&ExecutionContext::new()).await.unwrap();

        assert_eq!(log.entries(), vec!["A", "B", "C"]);
        let failed = sink.events_of_type("stage.failed");
        assert_eq!(failed.len(), 1);
        match &failed[0].kind {
            EventKind::StageFailed { index, masked, .. } => {
                assert_eq!(*index, 1);
                assert!(*masked);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(sink.events_of_type("rollback.").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_inside_pipeline() {
        let (flaky, flaky_calls) = flaky_stage("flaky", 2);
        let (broken, broken_calls) = flaky_stage("broken", u32::MAX);
        let mut pipeline = SequentialPipeline::new()
            .stage(flaky.with_retry_count(2).with_retry_interval(Duration::from_millis(100)))
            .stage(broken.with_retry_count(3).with_retry_interval(Duration::from_millis(100)));

        let err = pipeline.run(&ExecutionContext::new()).await.unwrap_err();

        assert_eq!(flaky_calls.load(Ordering::SeqCst), 3);
        assert_eq!(broken_calls.load(Ordering::SeqCst), 4);
        assert_eq!(pipeline.stages()[0].status(), StageStatus::Succeeded);
        let source = err.stage_error().unwrap();
        assert_eq!(
            source.to_string(),
            "run handler[last retry count:3] error: transient failure 4"
        );
    }

    #[tokio::test]
    async fn test_panicking_stage_aborts_sequential_run() {
        let log = CallLog::new();
        let mut pipeline = SequentialPipeline::new()
            .stage(with_logged_rollback(recording_stage("A", &log), &log, false))
            .stage(panicking_stage("B", "index out of range"))
            .stage(recording_stage("C", &log));

        let err = pipeline.run(&ExecutionContext::new()).await.unwrap_err();

        let source = err.stage_error().unwrap();
        assert!(source.is_panic());
        assert_eq!(source.to_string(), "B occur panic: index out of range");
        assert_eq!(log.entries(), vec!["A", "rollback A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_limit_holds_for_twenty_stages() {
        let probe = ConcurrencyProbe::new();
        let config = PipelineConfig::new().with_max_concurrency(5);
        let mut pipeline = BoundedPipeline::with_config(config).unwrap();
        for i in 0..20_u64 {
            pipeline.add_stage(probed(format!("stage {i}"), Duration::from_millis(5 + i % 7), &probe));
        }

        pipeline.run(&ExecutionContext::new()).await.unwrap();

        assert!(probe.peak() <= 5);
        assert_eq!(probe.peak(), 5);
        assert_eq!(pipeline.abort_index(), None);
        assert!(pipeline.stages().iter().all(|s| s.status() == StageStatus::Succeeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_reports_lowest_index_failure() {
        let log = CallLog::new();
        let config = PipelineConfig::new().with_max_concurrency(2);
        let mut pipeline = BoundedPipeline::with_config(config).unwrap();

        let slow_fail = Stage::new("slow", |_| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            anyhow::bail!("slow failure")
        });
        pipeline.add_stage(with_logged_rollback(slow_fail, &log, false));
        pipeline.add_stage(with_logged_rollback(failing_stage("fast", "fast failure", &log), &log, false));
        pipeline.add_stage(recording_stage("never 1", &log));
        pipeline.add_stage(recording_stage("never 2", &log));

        let err = pipeline.run(&ExecutionContext::new()).await.unwrap_err();

        assert_eq!(err.stage_index(), Some(0));
        assert_eq!(pipeline.abort_index(), Some(0));
        assert_eq!(log.entries(), vec!["fast", "rollback slow"]);
        assert_eq!(pipeline.stages()[1].status(), StageStatus::Failed);
        assert_eq!(pipeline.stages()[2].status(), StageStatus::Pending);
        assert_eq!(pipeline.stage_errors().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_masked_failure_below_unmasked_one() {
        let log = CallLog::new();
        let config = PipelineConfig::new().with_max_concurrency(1);
        let mut pipeline = BoundedPipeline::with_config(config).unwrap();
        pipeline.add_stage(failing_stage("tolerated", "ignored", &log).with_continue_on_error(true));
        let slow = pipeline.add_stage(slow_stage("slow", Duration::from_millis(20)));
        pipeline.add_stage(failing_stage("fatal", "fatal failure", &log));
        pipeline.add_stage(recording_stage("never", &log));

        let err = pipeline.run(&ExecutionContext::new()).await.unwrap_err();

        assert_eq!(err.stage_index(), Some(2));
        assert_eq!(pipeline.abort_index(), Some(2));
        assert_eq!(log.entries(), vec!["tolerated", "fatal"]);
        assert_eq!(slow.status(), StageStatus::Succeeded);
        assert_eq!(pipeline.stages()[3].status(), StageStatus::Pending);
        let indices: Vec<usize> = pipeline.stage_errors().iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_running_handlers_see_cancellation() {
        let config = PipelineConfig::new().with_max_concurrency(4);
        let mut pipeline = BoundedPipeline::with_config(config).unwrap();
        let waiter = pipeline.add_stage(Stage::new("waiter", |ctx: ExecutionContext| async move {
            ctx.cancelled().await;
            Ok(())
        }));
        pipeline.add_stage(Stage::new("breaker", |_| async { anyhow::bail!("broken") }));

        let err = pipeline.run(&ExecutionContext::new()).await.unwrap_err();

        assert_eq!(err.stage_index(), Some(1));
        assert_eq!(waiter.status(), StageStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_cancelled_caller_starts_nothing() {
        let log = CallLog::new();
        let sink = Arc::new(CollectingEventSink::new());
        let mut pipeline = BoundedPipeline::new()
            .with_event_sink(sink.clone())
            .stage(with_logged_rollback(recording_stage("A", &log), &log, false))
            .stage(recording_stage("B", &log));

        let ctx = ExecutionContext::new();
        ctx.cancel("shutdown");
        let err = pipeline.run(&ctx).await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled(ref reason) if reason == "cancelled: shutdown"));
        assert!(log.is_empty());
        assert_eq!(pipeline.abort_index(), None);
        assert_eq!(
            sink.event_types(),
            vec!["pipeline.admission_cancelled", "run.completed"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_starts_nothing() {
        let log = CallLog::new();
        let mut pipeline = BoundedPipeline::new().stage(recording_stage("A", &log));

        let ctx = ExecutionContext::new().with_timeout(Duration::ZERO);
        let err = pipeline.run(&ctx).await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled(ref reason) if reason == "deadline exceeded"));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_caller_cancel_mid_run_skips_rollback() {
        let log = CallLog::new();
        let caller = ExecutionContext::new();
        let trigger = caller.clone();
        let config = PipelineConfig::new().with_max_concurrency(1);
        let mut pipeline = BoundedPipeline::with_config(config).unwrap();

        let first = Stage::new("A", move |_| {
            trigger.cancel("shutdown");
            async { Ok(()) }
        });
        pipeline.add_stage(with_logged_rollback(first, &log, false));
        pipeline.add_stage(recording_stage("B", &log));

        let err = pipeline.run(&caller).await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled(_)));
        assert!(log.is_empty());
        assert_eq!(pipeline.stages()[0].status(), StageStatus::Succeeded);
        assert_eq!(pipeline.stages()[1].status(), StageStatus::Pending);
        assert_eq!(pipeline.abort_index(), None);
    }

    #[tokio::test]
    async fn test_pool_runs_every_stage_exactly_once() {
        let log = CallLog::new();
        let mut pool = WorkerPool::with_config(PoolConfig::new().with_max_concurrency(7)).unwrap();
        for i in 0..50 {
            let name = format!("stage {i}");
            if i % 10 == 3 {
                pool.add_stage(failing_stage(&name, "nope", &log));
            } else {
                pool.add_stage(recording_stage(&name, &log));
            }
        }

        let summary = pool.run(&ExecutionContext::new()).await;

        assert_eq!(summary.total, 50);
        assert_eq!(summary.failed, 5);
        assert_eq!(summary.succeeded, 45);
        assert_eq!(log.len(), 50);
        for i in 0..50 {
            assert_eq!(log.count(&format!("stage {i}")), 1);
        }
        assert!(pool.stages().iter().all(|s| s.status().is_finished()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_worker_count_bounds_concurrency() {
        let probe = ConcurrencyProbe::new();
        let mut pool = WorkerPool::with_config(PoolConfig::new().with_max_concurrency(4)).unwrap();
        for i in 0..12_u64 {
            pool.add_stage(probed(format!("job {i}"), Duration::from_millis(10 + i), &probe));
        }

        let summary = pool.run(&ExecutionContext::new()).await;

        assert!(summary.all_succeeded());
        assert_eq!(probe.peak(), 4);
    }

    #[tokio::test]
    async fn test_pool_reports_completion_once() {
        let mut sink = MockEventSink::new();
        sink.expect_emit()
            .withf(|e| e.event_type() == "run.completed")
            .times(1)
            .return_const(());
        sink.expect_emit()
            .withf(|e| e.event_type() != "run.completed")
            .return_const(());

        let log = CallLog::new();
        let pool = WorkerPool::new()
            .with_event_sink(Arc::new(sink))
            .stage(recording_stage("a", &log))
            .stage(failing_stage("b", "nope", &log));

        let summary = pool.run(&ExecutionContext::new()).await;
        assert_eq!(summary.failed, 1);
    }
}
