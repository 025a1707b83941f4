use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use digest_scheduler::{Application, ShutdownManager};
use digest_scheduler_core::AppConfig;
use digest_scheduler_dispatcher::{DispatchResult, TaskFilter};
use digest_scheduler_tasks::predefined::HEALTH_CHECK_ID;
use digest_scheduler_tasks::{Collaborators, HealthProbe};

struct DownProbe;

#[async_trait]
impl HealthProbe for DownProbe {
    fn name(&self) -> &str {
        "database"
    }

    async fn is_healthy(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn test_application_registers_health_check_only() {
    let app = Application::new(AppConfig::default()).await.unwrap();

    let tasks = app.scheduler().get_tasks(&TaskFilter::default()).await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, HEALTH_CHECK_ID);
    assert_eq!(app.breakers().names(), vec!["ai", "email", "http"]);

    app.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_health_check_runs_with_injected_probes() {
    let collaborators = Collaborators {
        probes: vec![Arc::new(DownProbe)],
        ..Default::default()
    };
    let app = Application::with_collaborators(AppConfig::default(), collaborators)
        .await
        .unwrap();

    // 一个探针异常，三个熔断器正常
    match app.scheduler().run_task_now(HEALTH_CHECK_ID).await.unwrap() {
        DispatchResult::Executed(outcome) => {
            assert!(outcome.success);
            let result = outcome.result.unwrap();
            assert_eq!(result["status"], "degraded");
            assert_eq!(result["unhealthy"][0], "database");
        }
        other => panic!("unexpected dispatch result: {other:?}"),
    }

    app.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_health_check_critical_when_breakers_open() {
    let app = Application::new(AppConfig::default()).await.unwrap();
    for name in app.breakers().names() {
        if let Some(breaker) = app.breakers().get(&name) {
            breaker.force_open().await;
        }
    }

    match app.scheduler().run_task_now(HEALTH_CHECK_ID).await.unwrap() {
        DispatchResult::Executed(outcome) => {
            assert_eq!(outcome.result.unwrap()["status"], "critical");
        }
        other => panic!("unexpected dispatch result: {other:?}"),
    }

    app.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = AppConfig::default();
    config.tasks.health_check.schedule = "not a cron".to_string();

    assert!(Application::new(config).await.is_err());
}

#[tokio::test]
async fn test_run_until_shutdown_signal() {
    let app = Arc::new(Application::new(AppConfig::default()).await.unwrap());
    let manager = ShutdownManager::with_grace_period(Duration::from_secs(1));

    let handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = manager.subscribe().await;
        tokio::spawn(async move { app.run(shutdown_rx, Duration::from_secs(1)).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(app.scheduler().is_running());

    let drained = manager
        .graceful_shutdown(async move { matches!(handle.await, Ok(Ok(true))) })
        .await;

    assert!(drained);
    assert!(!app.scheduler().is_running());
}

#[tokio::test]
async fn test_disabled_scheduler_does_not_start() {
    let mut config = AppConfig::default();
    config.scheduler.enabled = false;
    let app = Application::new(config).await.unwrap();

    let (tx, rx) = broadcast::channel(1);
    tx.send(()).unwrap();
    let idle = app.run(rx, Duration::from_millis(100)).await.unwrap();

    assert!(idle);
    assert!(!app.scheduler().is_running());
}

#[tokio::test]
async fn test_application_from_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        "[scheduler]\nmax_history_size = 50\n\n[tasks.health_check]\nschedule = \"*/30 * * * *\""
    )
    .unwrap();

    let config = AppConfig::load(file.path().to_str()).unwrap();
    assert_eq!(config.scheduler.max_history_size, 50);

    let app = Application::new(config).await.unwrap();
    let details = app.scheduler().get_task_details(HEALTH_CHECK_ID).await.unwrap();
    assert_eq!(details.summary.schedule, "*/30 * * * *");

    app.stop(Duration::from_secs(1)).await;
}

#[test]
fn test_bundled_config_is_valid() {
    let config = AppConfig::load(Some("config/digest-scheduler.toml")).unwrap();
    assert_eq!(config.groups.len(), 4);
    assert_eq!(config.tasks.health_check.schedule, "*/10 * * * *");
}
