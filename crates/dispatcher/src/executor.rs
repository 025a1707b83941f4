use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use digest_scheduler_core::SchedulerError;
use digest_scheduler_domain::{Task, TaskContext};

/// 单次执行（或整个重试序列）的结构化结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    #[serde(rename = "execution_time_ms", with = "duration_ms")]
    pub execution_time: Duration,
    pub attempts: u32,
}

impl ExecutionOutcome {
    pub fn succeeded(result: Value, execution_time: Duration, attempts: u32) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            execution_time,
            attempts,
        }
    }

    pub fn failed(error: String, execution_time: Duration, attempts: u32) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            execution_time,
            attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTaskInfo {
    pub task_id: String,
    pub task_name: String,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub running_ms: u64,
    pub timeout_ms: u64,
}

impl ActiveTaskInfo {
    /// 单次尝试的运行时间是否已超过任务超时
    pub fn is_overdue(&self) -> bool {
        self.running_ms > self.timeout_ms
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub active_count: usize,
    pub max_concurrent: usize,
    pub active: Vec<ActiveTaskInfo>,
}

#[derive(Debug, Clone)]
struct ActiveExecution {
    task_id: String,
    task_name: String,
    attempt: u32,
    started_at: DateTime<Utc>,
    started: Instant,
    timeout: Duration,
}

/// 任务执行器
///
/// 只负责单次尝试：超时竞速、统计更新、活跃任务登记。
/// 并发门控由调度器在调用前完成，这里不做限制。
pub struct TaskExecutor {
    max_concurrent: usize,
    next_execution_id: AtomicU64,
    active_tasks: RwLock<HashMap<u64, ActiveExecution>>,
}

impl TaskExecutor {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            next_execution_id: AtomicU64::new(1),
            active_tasks: RwLock::new(HashMap::new()),
        }
    }

    /// 执行一次尝试，处理器错误、panic 与超时都被归一化为失败结果
    pub async fn execute(&self, task: &Arc<Task>, attempt: u32) -> ExecutionOutcome {
        let _guard = task.acquire_run();
        let execution_id = self.next_execution_id.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        task.record_start().await;
        self.active_tasks.write().await.insert(
            execution_id,
            ActiveExecution {
                task_id: task.id().to_string(),
                task_name: task.name().to_string(),
                attempt,
                started_at: Utc::now(),
                started,
                timeout: task.timeout(),
            },
        );

        let ctx = TaskContext {
            task_id: task.id().to_string(),
            task_name: task.name().to_string(),
            attempt,
            max_attempts: task.policy().max_retries,
        };

        debug!(
            task_id = task.id(),
            task_name = task.name(),
            attempt,
            "开始执行任务"
        );

        let handler = task.handler();
        let run = AssertUnwindSafe(handler.run(ctx)).catch_unwind();
        let result = match tokio::time::timeout(task.timeout(), run).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SchedulerError::execution_error(format!(
                "任务处理器发生panic: {}",
                task.name()
            ))),
            Err(_) => Err(SchedulerError::TaskTimeout {
                name: task.name().to_string(),
                timeout_ms: task.timeout().as_millis() as u64,
            }),
        };

        let execution_time = started.elapsed();
        self.active_tasks.write().await.remove(&execution_id);

        match result {
            Ok(value) => {
                task.record_success(execution_time).await;
                debug!(
                    task_id = task.id(),
                    attempt,
                    elapsed_ms = execution_time.as_millis() as u64,
                    "任务执行成功"
                );
                ExecutionOutcome::succeeded(value, execution_time, attempt)
            }
            Err(error) => {
                let message = error.to_string();
                task.record_error(execution_time, &message).await;
                warn!(
                    task_id = task.id(),
                    attempt,
                    elapsed_ms = execution_time.as_millis() as u64,
                    error = %message,
                    "任务执行失败"
                );
                ExecutionOutcome::failed(message, execution_time, attempt)
            }
        }
    }

    pub async fn active_count(&self) -> usize {
        self.active_tasks.read().await.len()
    }

    pub async fn get_active_stats(&self) -> ExecutorStats {
        let active_tasks = self.active_tasks.read().await;
        let mut active: Vec<ActiveTaskInfo> = active_tasks
            .values()
            .map(|execution| ActiveTaskInfo {
                task_id: execution.task_id.clone(),
                task_name: execution.task_name.clone(),
                attempt: execution.attempt,
                started_at: execution.started_at,
                running_ms: execution.started.elapsed().as_millis() as u64,
                timeout_ms: execution.timeout.as_millis() as u64,
            })
            .collect();
        active.sort_by(|a, b| a.started_at.cmp(&b.started_at));

        ExecutorStats {
            active_count: active.len(),
            max_concurrent: self.max_concurrent,
            active,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
