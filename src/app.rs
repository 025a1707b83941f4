use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use digest_scheduler_core::{AppConfig, CircuitBreakerRegistry};
use digest_scheduler_dispatcher::SchedulerService;
use digest_scheduler_domain::{DomainEvent, SchedulerEvent};
use digest_scheduler_tasks::{Collaborators, PredefinedTasks};

/// 主应用程序
///
/// 组装调度服务、熔断器与内置任务，并负责启动与停止。
pub struct Application {
    config: AppConfig,
    scheduler: Arc<SchedulerService>,
    breakers: CircuitBreakerRegistry,
}

impl Application {
    /// 不注入外部协作者，仅注册健康检查任务
    pub async fn new(config: AppConfig) -> Result<Self> {
        Self::with_collaborators(config, Collaborators::default()).await
    }

    pub async fn with_collaborators(config: AppConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate().context("配置校验失败")?;
        info!(groups = config.groups.len(), "初始化应用程序");

        let scheduler = Arc::new(SchedulerService::new(config.scheduler.clone(), &config.groups));
        let mut breakers = CircuitBreakerRegistry::from_configs(config.resilience.breakers());

        let definitions = PredefinedTasks::definitions(
            &config.tasks,
            &config.transport_retry,
            &mut breakers,
            &collaborators,
            scheduler.event_bus(),
        );
        for definition in definitions {
            let name = definition.name.clone();
            scheduler
                .register_task(definition)
                .await
                .with_context(|| format!("注册内置任务失败: {name}"))?;
        }

        Ok(Self {
            config,
            scheduler,
            breakers,
        })
    }

    pub fn scheduler(&self) -> &Arc<SchedulerService> {
        &self.scheduler
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 运行直到收到关闭信号，返回运行中的任务是否在 `grace_period` 内全部结束
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>, grace_period: Duration) -> Result<bool> {
        if self.config.scheduler.enabled {
            self.scheduler.start().await.context("启动任务调度服务失败")?;
        } else {
            warn!("调度器在配置中被禁用，任务只能手动触发");
        }

        let event_logger = tokio::spawn(log_events(self.scheduler.subscribe(), shutdown_rx.resubscribe()));

        let _ = shutdown_rx.recv().await;
        info!("应用收到关闭信号");

        let idle = self.stop(grace_period).await;
        event_logger.abort();
        Ok(idle)
    }

    pub async fn stop(&self, grace_period: Duration) -> bool {
        self.scheduler.shutdown().await;
        let idle = self.scheduler.wait_for_idle(grace_period).await;
        let stats = self.scheduler.get_stats().await;
        info!(
            total_executions = stats.total_executions,
            failed_executions = stats.failed_executions,
            idle,
            "应用程序已停止"
        );
        idle
    }
}

/// 将调度事件写入日志，直到关闭
async fn log_events(mut events: broadcast::Receiver<SchedulerEvent>, mut shutdown_rx: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "事件日志落后，已丢弃部分事件"),
                Err(RecvError::Closed) => break,
            },
            _ = shutdown_rx.recv() => break,
        }
    }
    debug!("事件日志循环已退出");
}

fn log_event(event: &SchedulerEvent) {
    match event {
        SchedulerEvent::JobFailed {
            task_id,
            error: message,
            attempts,
            ..
        } => error!(task_id = %task_id, attempts, error = %message, "任务执行失败"),
        SchedulerEvent::StuckTasksDetected { tasks, .. } => {
            warn!(count = tasks.len(), "检测到可能卡住的任务")
        }
        SchedulerEvent::HealthCheckFailed { status, unhealthy, .. } => {
            warn!(status = %status, unhealthy = ?unhealthy, "健康检查未通过")
        }
        other => debug!(
            event_type = other.event_type(),
            aggregate_id = %other.aggregate_id(),
            "调度事件"
        ),
    }
}
