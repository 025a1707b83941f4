use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use digest_scheduler_core::{CircuitBreakerRegistry, SchedulerError, SchedulerResult};
use digest_scheduler_domain::{EventBus, SchedulerEvent, TaskContext, TaskHandler};

use crate::collaborators::{CleanupCollaborator, HealthProbe};

/// 依次执行所有清理器，单个失败不会中断其余清理器
pub struct CleanupTask {
    cleaners: Vec<Arc<dyn CleanupCollaborator>>,
}

impl CleanupTask {
    pub fn new(cleaners: Vec<Arc<dyn CleanupCollaborator>>) -> Self {
        Self { cleaners }
    }
}

#[async_trait]
impl TaskHandler for CleanupTask {
    async fn run(&self, _ctx: TaskContext) -> SchedulerResult<Value> {
        let mut removed = 0u64;
        let mut failures = Vec::new();

        for cleaner in &self.cleaners {
            match cleaner.cleanup().await {
                Ok(count) => {
                    info!(cleaner = cleaner.name(), removed = count, "清理完成");
                    removed += count;
                }
                Err(error) => {
                    warn!(cleaner = cleaner.name(), error = %error, "清理失败");
                    failures.push(cleaner.name().to_string());
                }
            }
        }

        if !self.cleaners.is_empty() && failures.len() == self.cleaners.len() {
            return Err(SchedulerError::execution_error(format!(
                "所有清理器均失败: {}",
                failures.join(", ")
            )));
        }

        Ok(json!({ "removed": removed, "failed": failures }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Critical => "critical",
        }
    }

    /// 组件包括健康探针和熔断器：不健康的达到一半及以上为 critical，
    /// 其余任何组件异常为 degraded
    pub fn evaluate(total_components: usize, unhealthy_components: usize) -> Self {
        if total_components > 0 && unhealthy_components * 2 >= total_components {
            HealthStatus::Critical
        } else if unhealthy_components > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// 汇总健康探针与熔断器状态
///
/// 检查本身不会失败；状态异常时发布 `HealthCheckFailed` 事件。
pub struct HealthCheckTask {
    probes: Vec<Arc<dyn HealthProbe>>,
    breakers: CircuitBreakerRegistry,
    events: EventBus,
}

impl HealthCheckTask {
    pub fn new(probes: Vec<Arc<dyn HealthProbe>>, breakers: CircuitBreakerRegistry, events: EventBus) -> Self {
        Self {
            probes,
            breakers,
            events,
        }
    }
}

#[async_trait]
impl TaskHandler for HealthCheckTask {
    async fn run(&self, _ctx: TaskContext) -> SchedulerResult<Value> {
        let mut services = serde_json::Map::new();
        let mut unhealthy = Vec::new();

        for probe in &self.probes {
            let healthy = probe.is_healthy().await;
            services.insert(probe.name().to_string(), Value::Bool(healthy));
            if !healthy {
                unhealthy.push(probe.name().to_string());
            }
        }

        let breakers = self.breakers.health().await;
        for breaker in breakers.iter().filter(|b| !b.is_healthy()) {
            unhealthy.push(format!("circuit:{}", breaker.name));
        }

        let status = HealthStatus::evaluate(self.probes.len() + breakers.len(), unhealthy.len());
        match status {
            HealthStatus::Healthy => info!("系统健康检查通过"),
            HealthStatus::Degraded => warn!(unhealthy = ?unhealthy, "系统处于降级状态"),
            HealthStatus::Critical => error!(unhealthy = ?unhealthy, "系统处于严重异常状态"),
        }

        if status != HealthStatus::Healthy {
            self.events
                .publish(SchedulerEvent::health_check_failed(status.as_str(), unhealthy.clone()));
        }

        Ok(json!({
            "status": status,
            "services": services,
            "circuitBreakers": breakers,
            "unhealthy": unhealthy,
        }))
    }
}
