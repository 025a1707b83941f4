//! 领域事件
//!
//! 调度器生命周期事件，通过 [`EventBus`] 以广播方式发布给应用层

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// 领域事件基础trait
pub trait DomainEvent: Send + Sync {
    fn event_id(&self) -> Uuid;
    fn event_type(&self) -> &str;
    fn occurred_at(&self) -> DateTime<Utc>;
    fn aggregate_id(&self) -> String;
}

/// 卡住任务的诊断信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StuckTask {
    pub task_id: String,
    pub task_name: String,
    pub running_for_ms: u64,
    pub timeout_ms: u64,
}

/// 调度器事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SchedulerEvent {
    JobAdded {
        id: Uuid,
        task_id: String,
        task_name: String,
        occurred_at: DateTime<Utc>,
    },
    JobStarted {
        id: Uuid,
        task_id: String,
        task_name: String,
        occurred_at: DateTime<Utc>,
    },
    JobCompleted {
        id: Uuid,
        task_id: String,
        task_name: String,
        execution_time_ms: u64,
        attempts: u32,
        occurred_at: DateTime<Utc>,
    },
    JobFailed {
        id: Uuid,
        task_id: String,
        task_name: String,
        error: String,
        attempts: u32,
        occurred_at: DateTime<Utc>,
    },
    JobStopped {
        id: Uuid,
        task_id: String,
        task_name: String,
        occurred_at: DateTime<Utc>,
    },
    JobDeleted {
        id: Uuid,
        task_id: String,
        task_name: String,
        occurred_at: DateTime<Utc>,
    },
    StuckTasksDetected {
        id: Uuid,
        tasks: Vec<StuckTask>,
        occurred_at: DateTime<Utc>,
    },
    HealthCheckFailed {
        id: Uuid,
        status: String,
        unhealthy: Vec<String>,
        occurred_at: DateTime<Utc>,
    },
}

impl SchedulerEvent {
    pub fn job_added(task_id: &str, task_name: &str) -> Self {
        Self::JobAdded {
            id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
            occurred_at: Utc::now(),
        }
    }

    pub fn job_started(task_id: &str, task_name: &str) -> Self {
        Self::JobStarted {
            id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
            occurred_at: Utc::now(),
        }
    }

    pub fn job_completed(task_id: &str, task_name: &str, execution_time_ms: u64, attempts: u32) -> Self {
        Self::JobCompleted {
            id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
            execution_time_ms,
            attempts,
            occurred_at: Utc::now(),
        }
    }

    pub fn job_failed(task_id: &str, task_name: &str, error: &str, attempts: u32) -> Self {
        Self::JobFailed {
            id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
            error: error.to_string(),
            attempts,
            occurred_at: Utc::now(),
        }
    }

    pub fn job_stopped(task_id: &str, task_name: &str) -> Self {
        Self::JobStopped {
            id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
            occurred_at: Utc::now(),
        }
    }

    pub fn job_deleted(task_id: &str, task_name: &str) -> Self {
        Self::JobDeleted {
            id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
            occurred_at: Utc::now(),
        }
    }

    pub fn stuck_tasks_detected(tasks: Vec<StuckTask>) -> Self {
        Self::StuckTasksDetected {
            id: Uuid::new_v4(),
            tasks,
            occurred_at: Utc::now(),
        }
    }

    pub fn health_check_failed(status: &str, unhealthy: Vec<String>) -> Self {
        Self::HealthCheckFailed {
            id: Uuid::new_v4(),
            status: status.to_string(),
            unhealthy,
            occurred_at: Utc::now(),
        }
    }

    /// 事件关联的任务ID（系统级事件返回 None）
    pub fn task_id(&self) -> Option<&str> {
        match self {
            SchedulerEvent::JobAdded { task_id, .. }
            | SchedulerEvent::JobStarted { task_id, .. }
            | SchedulerEvent::JobCompleted { task_id, .. }
            | SchedulerEvent::JobFailed { task_id, .. }
            | SchedulerEvent::JobStopped { task_id, .. }
            | SchedulerEvent::JobDeleted { task_id, .. } => Some(task_id),
            SchedulerEvent::StuckTasksDetected { .. } | SchedulerEvent::HealthCheckFailed { .. } => {
                None
            }
        }
    }
}

impl DomainEvent for SchedulerEvent {
    fn event_id(&self) -> Uuid {
        match self {
            SchedulerEvent::JobAdded { id, .. }
            | SchedulerEvent::JobStarted { id, .. }
            | SchedulerEvent::JobCompleted { id, .. }
            | SchedulerEvent::JobFailed { id, .. }
            | SchedulerEvent::JobStopped { id, .. }
            | SchedulerEvent::JobDeleted { id, .. }
            | SchedulerEvent::StuckTasksDetected { id, .. }
            | SchedulerEvent::HealthCheckFailed { id, .. } => *id,
        }
    }

    fn event_type(&self) -> &str {
        match self {
            SchedulerEvent::JobAdded { .. } => "jobAdded",
            SchedulerEvent::JobStarted { .. } => "jobStarted",
            SchedulerEvent::JobCompleted { .. } => "jobCompleted",
            SchedulerEvent::JobFailed { .. } => "jobFailed",
            SchedulerEvent::JobStopped { .. } => "jobStopped",
            SchedulerEvent::JobDeleted { .. } => "jobDeleted",
            SchedulerEvent::StuckTasksDetected { .. } => "stuckTasksDetected",
            SchedulerEvent::HealthCheckFailed { .. } => "healthCheckFailed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SchedulerEvent::JobAdded { occurred_at, .. }
            | SchedulerEvent::JobStarted { occurred_at, .. }
            | SchedulerEvent::JobCompleted { occurred_at, .. }
            | SchedulerEvent::JobFailed { occurred_at, .. }
            | SchedulerEvent::JobStopped { occurred_at, .. }
            | SchedulerEvent::JobDeleted { occurred_at, .. }
            | SchedulerEvent::StuckTasksDetected { occurred_at, .. }
            | SchedulerEvent::HealthCheckFailed { occurred_at, .. } => *occurred_at,
        }
    }

    fn aggregate_id(&self) -> String {
        match self.task_id() {
            Some(task_id) => task_id.to_string(),
            None => "scheduler".to_string(),
        }
    }
}

/// 基于 broadcast 的事件总线
///
/// 没有订阅者时发布事件不视为错误；订阅者处理过慢时会丢失最早的事件（`RecvError::Lagged`）。
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: SchedulerEvent) {
        trace!(event_type = event.event_type(), "发布调度事件");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
