use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use digest_scheduler_core::{SchedulerConfig, SchedulerError, SchedulerResult, TaskGroupConfig};
use digest_scheduler_dispatcher::{DispatchResult, SchedulerService, SkipReason, TaskFilter};
use digest_scheduler_domain::{
    HistoryQuery, SchedulerEvent, TaskContext, TaskDefinition, TaskHandler,
};

/// 每年只触发一次，避免测试期间被CRON意外触发
const RARE_SCHEDULE: &str = "0 0 1 1 *";

struct CountingHandler {
    calls: Arc<AtomicU32>,
    fail_first: u32,
    delay: Duration,
}

impl CountingHandler {
    fn new(calls: &Arc<AtomicU32>) -> Self {
        Self {
            calls: Arc::clone(calls),
            fail_first: 0,
            delay: Duration::ZERO,
        }
    }

    fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl TaskHandler for CountingHandler {
    async fn run(&self, ctx: TaskContext) -> SchedulerResult<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if call <= self.fail_first {
            return Err(SchedulerError::execution_error(format!("attempt {} failed", ctx.attempt)));
        }
        Ok(json!({ "call": call }))
    }
}

struct PendingHandler;

#[async_trait]
impl TaskHandler for PendingHandler {
    async fn run(&self, _ctx: TaskContext) -> SchedulerResult<Value> {
        std::future::pending::<()>().await;
        Ok(Value::Null)
    }
}

/// 同步阻塞线程，超时计时器在阻塞期间无法触发
struct BlockingHandler(Duration);

#[async_trait]
impl TaskHandler for BlockingHandler {
    async fn run(&self, _ctx: TaskContext) -> SchedulerResult<Value> {
        std::thread::sleep(self.0);
        Ok(Value::Null)
    }
}

fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        max_history_size: 100,
        ..Default::default()
    }
}

fn create_service(config: SchedulerConfig, groups: &[TaskGroupConfig]) -> Arc<SchedulerService> {
    Arc::new(SchedulerService::new(config, groups))
}

fn definition(id: &str, handler: impl TaskHandler + 'static) -> TaskDefinition {
    TaskDefinition::new(id, RARE_SCHEDULE, handler)
        .with_id(id)
        .with_max_retries(1)
        .with_retry_delay(Duration::from_millis(10))
        .with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn test_invalid_cron_rejected_before_registration() {
    let service = create_service(test_config(), &[]);
    let calls = Arc::new(AtomicU32::new(0));

    let result = service
        .register_task(
            TaskDefinition::new("bad", "not-a-cron", CountingHandler::new(&calls)).with_id("bad"),
        )
        .await;
    assert!(matches!(result, Err(SchedulerError::InvalidCron { .. })));
    assert!(service.get_task_details("bad").await.is_none());

    let task = service
        .register_task(
            TaskDefinition::new("good", "*/5 * * * *", CountingHandler::new(&calls)).with_id("good"),
        )
        .await
        .unwrap();
    assert_eq!(task.id(), "good");
    assert_eq!(service.get_stats().await.total_tasks, 1);
}

#[tokio::test]
async fn test_registration_validation_errors() {
    let service = create_service(test_config(), &[]);
    let calls = Arc::new(AtomicU32::new(0));

    service
        .register_task(definition("a", CountingHandler::new(&calls)))
        .await
        .unwrap();

    let duplicate = service
        .register_task(definition("a", CountingHandler::new(&calls)))
        .await;
    assert!(matches!(duplicate, Err(SchedulerError::DuplicateTask { .. })));

    let unnamed = service
        .register_task(TaskDefinition::new("", RARE_SCHEDULE, CountingHandler::new(&calls)))
        .await;
    assert!(matches!(unnamed, Err(SchedulerError::Validation(_))));

    let self_dep = service
        .register_task(definition("b", CountingHandler::new(&calls)).with_dependencies(&["b"]))
        .await;
    assert!(matches!(self_dep, Err(SchedulerError::CircularDependency { .. })));
}

#[tokio::test]
async fn test_dependency_cycle_rejected() {
    let service = create_service(test_config(), &[]);
    let calls = Arc::new(AtomicU32::new(0));

    service
        .register_task(definition("a", CountingHandler::new(&calls)).with_dependencies(&["b"]))
        .await
        .unwrap();
    let result = service
        .register_task(definition("b", CountingHandler::new(&calls)).with_dependencies(&["a"]))
        .await;
    assert!(matches!(result, Err(SchedulerError::CircularDependency { .. })));
}

#[tokio::test]
async fn test_non_concurrent_task_runs_once() {
    let service = create_service(test_config(), &[]);
    let calls = Arc::new(AtomicU32::new(0));
    service
        .register_task(definition(
            "exclusive",
            CountingHandler::new(&calls).with_delay(Duration::from_millis(200)),
        ))
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        service.execute_task("exclusive"),
        service.execute_task("exclusive")
    );

    let executed = [&first, &second]
        .iter()
        .filter(|r| matches!(r, DispatchResult::Executed(_)))
        .count();
    let skipped: Vec<_> = [first, second]
        .into_iter()
        .filter_map(|r| match r {
            DispatchResult::Skipped(reason) => Some(reason),
            _ => None,
        })
        .collect();

    assert_eq!(executed, 1);
    assert_eq!(skipped, vec![SkipReason::AlreadyRunning]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        service
            .get_history(&HistoryQuery::for_task("exclusive"))
            .await
            .pagination
            .total,
        1
    );
}

#[tokio::test]
async fn test_concurrent_task_can_overlap() {
    let service = create_service(test_config(), &[]);
    let calls = Arc::new(AtomicU32::new(0));
    service
        .register_task(
            definition(
                "overlap",
                CountingHandler::new(&calls).with_delay(Duration::from_millis(100)),
            )
            .concurrent(true),
        )
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        service.execute_task("overlap"),
        service.execute_task("overlap")
    );
    assert!(first.outcome().is_some());
    assert!(second.outcome().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let details = service.get_task_details("overlap").await.unwrap();
    assert_eq!(details.stats.run_count, 2);
    assert!(!details.summary.is_running);
}

#[tokio::test]
async fn test_always_failing_handler_retries_max_times() {
    let service = create_service(test_config(), &[]);
    let mut events = service.subscribe();
    let calls = Arc::new(AtomicU32::new(0));
    service
        .register_task(
            definition("flaky", CountingHandler::new(&calls).failing_first(u32::MAX))
                .with_max_retries(3),
        )
        .await
        .unwrap();

    let result = service.run_task_now("flaky").await.unwrap();
    let outcome = result.outcome().unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let mut saw_failed = false;
    while let Ok(event) = events.try_recv() {
        if let SchedulerEvent::JobFailed { attempts, .. } = event {
            assert_eq!(attempts, 3);
            saw_failed = true;
        }
    }
    assert!(saw_failed);

    let history = service.get_history(&HistoryQuery::for_task("flaky")).await;
    assert_eq!(history.pagination.total, 1);
    assert!(!history.data[0].success);
}

#[tokio::test]
async fn test_handler_succeeding_on_second_attempt() {
    let service = create_service(test_config(), &[]);
    let mut events = service.subscribe();
    let calls = Arc::new(AtomicU32::new(0));
    service
        .register_task(
            definition("recovering", CountingHandler::new(&calls).failing_first(1))
                .with_max_retries(3),
        )
        .await
        .unwrap();

    let result = service.run_task_now("recovering").await.unwrap();
    let outcome = result.outcome().unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let mut saw_completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            SchedulerEvent::JobCompleted { attempts, .. } => {
                assert_eq!(attempts, 2);
                saw_completed = true;
            }
            SchedulerEvent::JobFailed { .. } => panic!("unexpected failure event"),
            _ => {}
        }
    }
    assert!(saw_completed);
}

#[tokio::test]
async fn test_timeout_yields_failure() {
    let service = create_service(test_config(), &[]);
    service
        .register_task(definition("hang", PendingHandler).with_timeout(Duration::from_millis(100)))
        .await
        .unwrap();

    let started = Instant::now();
    let result = service.run_task_now("hang").await.unwrap();
    let elapsed = started.elapsed();

    let outcome = result.outcome().unwrap();
    assert!(!outcome.success);
    assert!(outcome.error.as_deref().unwrap().contains("task timeout: hang"));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(2));

    let details = service.get_task_details("hang").await.unwrap();
    assert!(!details.summary.is_running);
}

#[tokio::test]
async fn test_group_concurrency_limit() {
    let groups = vec![TaskGroupConfig::new("shared", "Shared", 1, &["shared"])];
    let service = create_service(test_config(), &groups);
    let calls = Arc::new(AtomicU32::new(0));

    for id in ["first", "second"] {
        service
            .register_task(
                definition(id, CountingHandler::new(&calls).with_delay(Duration::from_millis(200)))
                    .with_tags(&["shared"]),
            )
            .await
            .unwrap();
    }

    let runner = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.execute_task("first").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = service.execute_task("second").await;
    assert!(matches!(
        second,
        DispatchResult::Skipped(SkipReason::GroupAtCapacity { ref group, max_concurrency: 1 }) if group == "shared"
    ));

    assert!(runner.await.unwrap().outcome().unwrap().success);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // 第一个任务结束后组内恢复可用
    assert!(service.execute_task("second").await.outcome().is_some());
}

#[tokio::test]
async fn test_history_keeps_most_recent_entries() {
    let config = SchedulerConfig {
        max_history_size: 3,
        ..Default::default()
    };
    let service = create_service(config, &[]);
    let calls = Arc::new(AtomicU32::new(0));
    service
        .register_task(definition("repeat", CountingHandler::new(&calls)))
        .await
        .unwrap();

    for _ in 0..5 {
        service.run_task_now("repeat").await.unwrap();
    }

    let history = service.get_history(&HistoryQuery::default()).await;
    assert_eq!(history.pagination.total, 3);
    assert_eq!(service.get_stats().await.history_size, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_dependency_running_blocks_dependent() {
    let service = create_service(test_config(), &[]);
    let a_calls = Arc::new(AtomicU32::new(0));
    let b_calls = Arc::new(AtomicU32::new(0));

    service
        .register_task(definition(
            "a",
            CountingHandler::new(&a_calls).with_delay(Duration::from_millis(200)),
        ))
        .await
        .unwrap();
    service
        .register_task(definition("b", CountingHandler::new(&b_calls)).with_dependencies(&["a"]))
        .await
        .unwrap();

    let runner = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.execute_task("a").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = service.execute_task("b").await;
    assert!(matches!(
        result,
        DispatchResult::Skipped(SkipReason::DependencyBlocked { .. })
    ));
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        service.get_history(&HistoryQuery::for_task("b")).await.pagination.total,
        0
    );

    runner.await.unwrap();
    assert!(service.execute_task("b").await.outcome().unwrap().success);
}

#[tokio::test]
async fn test_failed_or_missing_dependency_blocks_dependent() {
    let service = create_service(test_config(), &[]);
    let calls = Arc::new(AtomicU32::new(0));

    service
        .register_task(definition(
            "broken",
            CountingHandler::new(&calls).failing_first(u32::MAX),
        ))
        .await
        .unwrap();
    service
        .register_task(definition("downstream", CountingHandler::new(&calls)).with_dependencies(&["broken"]))
        .await
        .unwrap();
    service
        .register_task(definition("orphan", CountingHandler::new(&calls)).with_dependencies(&["ghost"]))
        .await
        .unwrap();

    service.execute_task("broken").await;
    assert!(service.execute_task("downstream").await.is_skipped());
    assert!(service.execute_task("orphan").await.is_skipped());
}

#[tokio::test]
async fn test_stop_start_and_delete_task() {
    let service = create_service(test_config(), &[]);
    let mut events = service.subscribe();
    let calls = Arc::new(AtomicU32::new(0));
    service
        .register_task(definition("toggle", CountingHandler::new(&calls)))
        .await
        .unwrap();

    service.stop_task("toggle").await.unwrap();
    let details = service.get_task_details("toggle").await.unwrap();
    assert!(!details.summary.enabled);
    assert!(details.summary.next_run_at.is_none());
    assert!(matches!(
        service.run_task_now("toggle").await.unwrap(),
        DispatchResult::Skipped(SkipReason::Disabled)
    ));

    service.start_task("toggle").await.unwrap();
    assert!(service.run_task_now("toggle").await.unwrap().outcome().is_some());
    assert_eq!(
        service.get_task_details("toggle").await.unwrap().upcoming_runs.len(),
        5
    );

    service.delete_task("toggle").await.unwrap();
    assert!(service.get_task_details("toggle").await.is_none());
    assert!(matches!(
        service.run_task_now("toggle").await,
        Err(SchedulerError::TaskNotFound { .. })
    ));
    assert!(matches!(service.execute_task("toggle").await, DispatchResult::NotFound));
    assert!(service.delete_task("toggle").await.is_err());

    let mut types = Vec::new();
    while let Ok(event) = events.try_recv() {
        types.push(match event {
            SchedulerEvent::JobAdded { .. } => "added",
            SchedulerEvent::JobStopped { .. } => "stopped",
            SchedulerEvent::JobStarted { .. } => "started",
            SchedulerEvent::JobCompleted { .. } => "completed",
            SchedulerEvent::JobDeleted { .. } => "deleted",
            _ => "other",
        });
    }
    assert_eq!(types, vec!["added", "stopped", "started", "completed", "deleted"]);
}

#[tokio::test]
async fn test_task_queries_and_group_stats() {
    let groups = TaskGroupConfig::defaults();
    let service = create_service(test_config(), &groups);
    let calls = Arc::new(AtomicU32::new(0));

    service
        .register_task(definition("rss", CountingHandler::new(&calls)).with_tags(&["rss"]))
        .await
        .unwrap();
    service
        .register_task(definition("digest", CountingHandler::new(&calls)).with_tags(&["email", "news"]))
        .await
        .unwrap();
    service
        .register_task(definition("idle", CountingHandler::new(&calls)).enabled(false))
        .await
        .unwrap();

    let all = service.get_tasks(&TaskFilter::default()).await;
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].name, "digest");

    let news = service
        .get_tasks(&TaskFilter {
            group: Some("news".to_string()),
            ..Default::default()
        })
        .await;
    assert_eq!(news.len(), 2);

    let disabled = service
        .get_tasks(&TaskFilter {
            enabled: Some(false),
            ..Default::default()
        })
        .await;
    assert_eq!(disabled.len(), 1);
    assert_eq!(disabled[0].id, "idle");

    let tagged = service
        .get_tasks(&TaskFilter {
            tag: Some("email".to_string()),
            ..Default::default()
        })
        .await;
    assert_eq!(tagged.len(), 1);

    let stats = service.get_group_stats().await;
    assert_eq!(stats["news"].total_tasks, 2);
    assert_eq!(stats["notification"].total_tasks, 1);
    assert_eq!(stats["analysis"].total_tasks, 0);

    let details = service.get_task_details("digest").await.unwrap();
    assert_eq!(details.groups, vec!["news", "notification"]);

    service
        .add_group(&TaskGroupConfig::new("everything", "All", 5, &["rss", "email"]))
        .await
        .unwrap();
    assert_eq!(service.get_group_stats().await["everything"].total_tasks, 2);
    assert!(service
        .add_group(&TaskGroupConfig::new("everything", "Dup", 1, &["x"]))
        .await
        .is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_detect_stuck_tasks() {
    let service = create_service(test_config(), &[]);
    let mut events = service.subscribe();
    service
        .register_task(definition("slow", BlockingHandler(Duration::from_millis(300))).with_timeout(Duration::from_millis(50)))
        .await
        .unwrap();

    assert!(service.detect_stuck_tasks().await.is_empty());

    let runner = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.execute_task("slow").await })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;

    let stuck = service.detect_stuck_tasks().await;
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].task_id, "slow");
    assert_eq!(stuck[0].timeout_ms, 50);
    assert!(stuck[0].running_for_ms > 50);

    let mut saw_stuck = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SchedulerEvent::StuckTasksDetected { .. }) {
            saw_stuck = true;
        }
    }
    assert!(saw_stuck);

    runner.await.unwrap();
    assert!(service.detect_stuck_tasks().await.is_empty());
}

#[tokio::test]
async fn test_retry_wait_is_not_running_or_stuck() {
    let service = create_service(test_config(), &[]);
    let calls = Arc::new(AtomicU32::new(0));
    let task = service
        .register_task(
            definition("flaky", CountingHandler::new(&calls).failing_first(u32::MAX))
                .with_timeout(Duration::from_millis(50))
                .with_retry_delay(Duration::from_millis(400))
                .with_max_retries(2),
        )
        .await
        .unwrap();

    let runner = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.execute_task("flaky").await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    // 第一次尝试已失败，正处于重试等待
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!task.is_running());
    assert!(task.is_busy());
    assert!(!service.get_task_details("flaky").await.unwrap().summary.is_running);
    assert!(service.detect_stuck_tasks().await.is_empty());
    assert_eq!(service.get_stats().await.running_tasks, 0);

    // 等待期间仍然不允许重叠执行
    assert!(matches!(
        service.execute_task("flaky").await,
        DispatchResult::Skipped(SkipReason::AlreadyRunning)
    ));

    let outcome = runner.await.unwrap();
    assert_eq!(outcome.outcome().unwrap().attempts, 2);
    assert!(!task.is_busy());
}

#[tokio::test]
async fn test_cron_trigger_executes_task() {
    let service = create_service(test_config(), &[]);
    let calls = Arc::new(AtomicU32::new(0));
    service
        .register_task(
            TaskDefinition::new("every-second", "* * * * * *", CountingHandler::new(&calls))
                .with_id("every-second")
                .with_max_retries(1),
        )
        .await
        .unwrap();
    service.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(service
        .get_task_details("every-second")
        .await
        .unwrap()
        .summary
        .next_run_at
        .is_some());

    tokio::time::sleep(Duration::from_millis(2_200)).await;
    assert!(calls.load(Ordering::SeqCst) >= 1);

    service.shutdown().await;
    assert!(service.wait_for_idle(Duration::from_secs(1)).await);
    let after_shutdown = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_shutdown);
}

#[tokio::test]
async fn test_shutdown_skips_new_executions() {
    let service = create_service(test_config(), &[]);
    let calls = Arc::new(AtomicU32::new(0));
    service
        .register_task(definition("late", CountingHandler::new(&calls)))
        .await
        .unwrap();

    service.start().await.unwrap();
    assert!(service.get_stats().await.is_running);
    service.shutdown().await;

    assert!(matches!(
        service.execute_task("late").await,
        DispatchResult::Skipped(SkipReason::ShuttingDown)
    ));
    assert!(!service.get_stats().await.is_running);
    assert!(service.start().await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_service_stats_counters() {
    let service = create_service(test_config(), &[]);
    let calls = Arc::new(AtomicU32::new(0));
    service
        .register_task(definition("ok", CountingHandler::new(&calls)))
        .await
        .unwrap();
    service
        .register_task(definition("bad", CountingHandler::new(&calls).failing_first(u32::MAX)))
        .await
        .unwrap();
    service
        .register_task(definition("off", CountingHandler::new(&calls)).enabled(false))
        .await
        .unwrap();

    service.execute_task("ok").await;
    service.execute_task("bad").await;
    service.execute_task("off").await;

    let stats = service.get_stats().await;
    assert_eq!(stats.total_tasks, 3);
    assert_eq!(stats.enabled_tasks, 2);
    assert_eq!(stats.total_executions, 2);
    assert_eq!(stats.successful_executions, 1);
    assert_eq!(stats.failed_executions, 1);
    assert_eq!(stats.skipped_executions, 1);
    assert_eq!(stats.executor.active_count, 0);
    assert_eq!(service.trim_history().await, 0);
}
