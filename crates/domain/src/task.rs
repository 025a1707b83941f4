use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use digest_scheduler_core::{SchedulerError, SchedulerResult, MAX_DEPENDENCY_FAILURE_WINDOW};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::handler::TaskHandler;

/// 最近执行结果的保留条数上限
const OUTCOME_WINDOW: usize = MAX_DEPENDENCY_FAILURE_WINDOW;

/// 任务优先级，仅用于展示，调度器不据此排序
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low = 1,
    #[default]
    Normal = 5,
    High = 10,
}

/// 任务执行策略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPolicy {
    pub enabled: bool,
    /// 是否允许同一任务的多次执行重叠
    pub concurrent: bool,
    /// 总尝试次数（含首次），至少为1
    pub max_retries: u32,
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    pub dependencies: Vec<String>,
    pub tags: Vec<String>,
    pub priority: TaskPriority,
}

impl Default for TaskPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrent: false,
            max_retries: 3,
            retry_delay: Duration::from_millis(5_000),
            timeout: Duration::from_millis(300_000),
            dependencies: Vec::new(),
            tags: Vec::new(),
            priority: TaskPriority::Normal,
        }
    }
}

/// 任务注册请求
#[derive(Clone)]
pub struct TaskDefinition {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub schedule: String,
    pub handler: Arc<dyn TaskHandler>,
    pub policy: TaskPolicy,
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TaskDefinition {
    pub fn new<H>(name: &str, schedule: &str, handler: H) -> Self
    where
        H: TaskHandler + 'static,
    {
        Self::with_shared_handler(name, schedule, Arc::new(handler))
    }

    pub fn with_shared_handler(name: &str, schedule: &str, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            description: None,
            schedule: schedule.to_string(),
            handler,
            policy: TaskPolicy::default(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_policy(mut self, policy: TaskPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.policy.enabled = enabled;
        self
    }

    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.policy.concurrent = concurrent;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.policy.retry_delay = retry_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.policy.timeout = timeout;
        self
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.policy.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.policy.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.policy.priority = priority;
        self
    }

    /// 基本字段校验，CRON 语法由调度器在注册时校验
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::validation_error("任务名称不能为空"));
        }
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(SchedulerError::validation_error("任务ID不能为空字符串"));
            }
        }
        if self.schedule.trim().is_empty() {
            return Err(SchedulerError::validation_error(format!(
                "任务 {} 缺少调度表达式",
                self.name
            )));
        }
        if self.policy.max_retries == 0 {
            return Err(SchedulerError::validation_error(format!(
                "任务 {} 的最大重试次数必须至少为1",
                self.name
            )));
        }
        if self.policy.timeout.is_zero() {
            return Err(SchedulerError::validation_error(format!(
                "任务 {} 的超时时间必须大于0",
                self.name
            )));
        }
        Ok(())
    }
}

/// 任务的可变运行状态，统一由 `Task::runtime` 锁串行化
#[derive(Debug, Clone)]
struct TaskRuntime {
    enabled: bool,
    run_count: u64,
    error_count: u64,
    last_run_at: Option<DateTime<Utc>>,
    next_run_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    average_execution_time_ms: f64,
    max_execution_time_ms: u64,
    min_execution_time_ms: Option<u64>,
    recent_outcomes: VecDeque<bool>,
}

impl TaskRuntime {
    fn record_timing(&mut self, elapsed: Duration) {
        self.run_count += 1;
        let elapsed_ms = elapsed.as_millis() as u64;
        let n = self.run_count as f64;
        self.average_execution_time_ms =
            (self.average_execution_time_ms * (n - 1.0) + elapsed_ms as f64) / n;
        self.max_execution_time_ms = self.max_execution_time_ms.max(elapsed_ms);
        self.min_execution_time_ms = Some(match self.min_execution_time_ms {
            Some(min) => min.min(elapsed_ms),
            None => elapsed_ms,
        });
    }
}

/// 已注册的任务
pub struct Task {
    id: String,
    name: String,
    description: Option<String>,
    schedule: String,
    handler: Arc<dyn TaskHandler>,
    policy: TaskPolicy,
    created_at: DateTime<Utc>,
    /// 正在进行的单次尝试数，驱动 `is_running()`
    in_flight: AtomicUsize,
    /// 调度器占用的执行序列数（含重试间隔），用于不允许并发的门控
    reserved: AtomicUsize,
    runtime: Mutex<TaskRuntime>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .field("reserved", &self.reserved.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Task {
    /// 由注册请求构建任务，未指定ID时生成UUID
    pub fn from_definition(definition: TaskDefinition) -> Self {
        let id = definition
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let enabled = definition.policy.enabled;

        Self {
            id,
            name: definition.name,
            description: definition.description,
            schedule: definition.schedule,
            handler: definition.handler,
            policy: definition.policy,
            created_at: Utc::now(),
            in_flight: AtomicUsize::new(0),
            reserved: AtomicUsize::new(0),
            runtime: Mutex::new(TaskRuntime {
                enabled,
                run_count: 0,
                error_count: 0,
                last_run_at: None,
                next_run_at: None,
                last_error: None,
                average_execution_time_ms: 0.0,
                max_execution_time_ms: 0,
                min_execution_time_ms: None,
                recent_outcomes: VecDeque::with_capacity(OUTCOME_WINDOW),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    pub fn handler(&self) -> Arc<dyn TaskHandler> {
        Arc::clone(&self.handler)
    }

    pub fn policy(&self) -> &TaskPolicy {
        &self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.policy.timeout
    }

    pub fn dependencies(&self) -> &[String] {
        &self.policy.dependencies
    }

    pub fn tags(&self) -> &[String] {
        &self.policy.tags
    }

    /// 是否有尝试正在执行，重试等待期间为 false
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// 有尝试在执行，或执行序列已被占用（包括重试等待）
    pub fn is_busy(&self) -> bool {
        self.is_running() || self.reserved.load(Ordering::SeqCst) > 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// 标记一次尝试开始执行，守卫释放时自动归还
    pub fn acquire_run(self: &Arc<Self>) -> RunGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        RunGuard {
            task: Arc::clone(self),
        }
    }

    /// 占用整个执行序列（所有尝试及其间的重试等待）
    pub fn reserve(self: &Arc<Self>) -> RunReservation {
        self.reserved.fetch_add(1, Ordering::SeqCst);
        RunReservation {
            task: Arc::clone(self),
        }
    }

    pub async fn is_enabled(&self) -> bool {
        self.runtime.lock().await.enabled
    }

    pub async fn set_enabled(&self, enabled: bool) {
        self.runtime.lock().await.enabled = enabled;
    }

    /// enabled 且（允许并发 或 当前未运行）
    pub async fn can_run(&self) -> bool {
        self.is_enabled().await && (self.policy.concurrent || !self.is_busy())
    }

    pub async fn set_next_run_at(&self, next: Option<DateTime<Utc>>) {
        self.runtime.lock().await.next_run_at = next;
    }

    pub async fn next_run_at(&self) -> Option<DateTime<Utc>> {
        self.runtime.lock().await.next_run_at
    }

    pub async fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.runtime.lock().await.last_run_at
    }

    pub async fn record_start(&self) {
        self.runtime.lock().await.last_run_at = Some(Utc::now());
    }

    pub async fn record_success(&self, elapsed: Duration) {
        let mut runtime = self.runtime.lock().await;
        runtime.record_timing(elapsed);
        runtime.last_error = None;
    }

    pub async fn record_error(&self, elapsed: Duration, error: &str) {
        let mut runtime = self.runtime.lock().await;
        runtime.record_timing(elapsed);
        runtime.error_count += 1;
        runtime.last_error = Some(error.to_string());
    }

    /// 记录一次完整执行序列（含重试）的最终结果
    pub async fn record_outcome(&self, success: bool) {
        let mut runtime = self.runtime.lock().await;
        if runtime.recent_outcomes.len() == OUTCOME_WINDOW {
            runtime.recent_outcomes.pop_front();
        }
        runtime.recent_outcomes.push_back(success);
    }

    /// 最近 `window` 次最终结果中是否出现失败
    pub async fn failed_recently(&self, window: usize) -> bool {
        let runtime = self.runtime.lock().await;
        runtime
            .recent_outcomes
            .iter()
            .rev()
            .take(window)
            .any(|success| !success)
    }

    pub async fn stats(&self) -> TaskStats {
        let runtime = self.runtime.lock().await;
        TaskStats {
            run_count: runtime.run_count,
            error_count: runtime.error_count,
            average_execution_time_ms: runtime.average_execution_time_ms,
            max_execution_time_ms: runtime.max_execution_time_ms,
            min_execution_time_ms: runtime.min_execution_time_ms,
            success_rate: if runtime.run_count == 0 {
                0.0
            } else {
                (runtime.run_count - runtime.error_count) as f64 / runtime.run_count as f64
            },
        }
    }

    pub async fn summary(&self) -> TaskSummary {
        let runtime = self.runtime.lock().await;
        TaskSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            schedule: self.schedule.clone(),
            enabled: runtime.enabled,
            is_running: self.is_running(),
            priority: self.policy.priority,
            tags: self.policy.tags.clone(),
            run_count: runtime.run_count,
            error_count: runtime.error_count,
            last_run_at: runtime.last_run_at,
            next_run_at: runtime.next_run_at,
            last_error: runtime.last_error.clone(),
        }
    }

    pub async fn details(
        &self,
        groups: Vec<String>,
        upcoming_runs: Vec<DateTime<Utc>>,
    ) -> TaskDetails {
        let summary = self.summary().await;
        let stats = self.stats().await;
        TaskDetails {
            summary,
            description: self.description.clone(),
            policy: self.policy.clone(),
            groups,
            upcoming_runs,
            in_flight: self.in_flight(),
            created_at: self.created_at,
            stats,
        }
    }
}

/// 运行槽位守卫
#[derive(Debug)]
pub struct RunGuard {
    task: Arc<Task>,
}

impl RunGuard {
    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.task.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 执行序列占用守卫
#[derive(Debug)]
pub struct RunReservation {
    task: Arc<Task>,
}

impl Drop for RunReservation {
    fn drop(&mut self) {
        self.task.reserved.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStats {
    pub run_count: u64,
    pub error_count: u64,
    pub average_execution_time_ms: f64,
    pub max_execution_time_ms: u64,
    pub min_execution_time_ms: Option<u64>,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub name: String,
    pub schedule: String,
    pub enabled: bool,
    pub is_running: bool,
    pub priority: TaskPriority,
    pub tags: Vec<String>,
    pub run_count: u64,
    pub error_count: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetails {
    #[serde(flatten)]
    pub summary: TaskSummary,
    pub description: Option<String>,
    pub policy: TaskPolicy,
    pub groups: Vec<String>,
    pub upcoming_runs: Vec<DateTime<Utc>>,
    pub in_flight: usize,
    pub created_at: DateTime<Utc>,
    pub stats: TaskStats,
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
