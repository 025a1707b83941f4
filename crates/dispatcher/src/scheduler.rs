use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use digest_scheduler_core::{SchedulerConfig, SchedulerError, SchedulerResult, TaskGroupConfig};
use digest_scheduler_domain::{
    EventBus, GroupStats, HistoryBuffer, HistoryEntry, HistoryPage, HistoryQuery, SchedulerEvent,
    StuckTask, Task, TaskDefinition, TaskDetails, TaskGroup, TaskSummary,
};

use crate::cron_utils::CronScheduler;
use crate::dependency_checker::DependencyChecker;
use crate::executor::{ExecutionOutcome, ExecutorStats, TaskExecutor};
use crate::monitor;

const UPCOMING_RUNS: usize = 5;

/// 任务被门控跳过的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    AlreadyRunning,
    DependencyBlocked { detail: String },
    GroupAtCapacity { group: String, max_concurrency: usize },
    ShuttingDown,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "任务已禁用"),
            SkipReason::AlreadyRunning => write!(f, "任务正在运行且不允许并发"),
            SkipReason::DependencyBlocked { detail } => write!(f, "{detail}"),
            SkipReason::GroupAtCapacity {
                group,
                max_concurrency,
            } => write!(f, "任务组 {group} 已达到最大并发数 {max_concurrency}"),
            SkipReason::ShuttingDown => write!(f, "调度器正在关闭"),
        }
    }
}

/// 一次调度请求的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchResult {
    Executed(ExecutionOutcome),
    Skipped(SkipReason),
    NotFound,
}

impl DispatchResult {
    pub fn outcome(&self) -> Option<&ExecutionOutcome> {
        match self {
            DispatchResult::Executed(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, DispatchResult::Skipped(_))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub enabled: Option<bool>,
    pub running: Option<bool>,
    pub tag: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub is_running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_seconds: i64,
    pub total_tasks: usize,
    pub enabled_tasks: usize,
    pub running_tasks: usize,
    pub total_groups: usize,
    pub history_size: usize,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub skipped_executions: u64,
    pub executor: ExecutorStats,
}

#[derive(Debug, Default)]
struct DispatchCounters {
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// 进程内任务调度服务
///
/// 持有任务注册表、任务组、CRON触发器和执行历史。
/// 门控检查与运行槽位占用在同一把调度锁内完成，保证不允许并发的任务不会被重复执行。
pub struct SchedulerService {
    config: SchedulerConfig,
    tasks: RwLock<HashMap<String, Arc<Task>>>,
    groups: RwLock<HashMap<String, TaskGroup>>,
    triggers: Mutex<HashMap<String, JoinHandle<()>>>,
    history: RwLock<HistoryBuffer>,
    executor: TaskExecutor,
    dependency_checker: DependencyChecker,
    events: EventBus,
    dispatch_lock: Mutex<()>,
    monitors: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
    is_running: AtomicBool,
    is_shutdown: AtomicBool,
    started_at: RwLock<Option<DateTime<Utc>>>,
    counters: DispatchCounters,
}

impl SchedulerService {
    pub fn new(config: SchedulerConfig, groups: &[TaskGroupConfig]) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        let groups = groups
            .iter()
            .map(|group| (group.id.clone(), TaskGroup::from(group)))
            .collect();

        Self {
            history: RwLock::new(HistoryBuffer::new(config.max_history_size)),
            executor: TaskExecutor::new(config.max_concurrent_tasks),
            dependency_checker: DependencyChecker::new(config.dependency_failure_window),
            events: EventBus::new(config.event_channel_capacity),
            config,
            tasks: RwLock::new(HashMap::new()),
            groups: RwLock::new(groups),
            triggers: Mutex::new(HashMap::new()),
            dispatch_lock: Mutex::new(()),
            monitors: Mutex::new(Vec::new()),
            shutdown_tx,
            is_running: AtomicBool::new(false),
            is_shutdown: AtomicBool::new(false),
            started_at: RwLock::new(None),
            counters: DispatchCounters::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// 事件总线，供内置任务发布系统事件
    pub fn event_bus(&self) -> EventBus {
        self.events.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// 注册任务；启用状态的任务立即绑定CRON触发器
    pub async fn register_task(self: &Arc<Self>, definition: TaskDefinition) -> SchedulerResult<Arc<Task>> {
        definition.validate()?;
        let cron = CronScheduler::new(&definition.schedule)?;
        let task = Arc::new(Task::from_definition(definition));

        {
            let mut tasks = self.tasks.write().await;
            if tasks.contains_key(task.id()) {
                return Err(SchedulerError::DuplicateTask {
                    id: task.id().to_string(),
                });
            }

            let graph: HashMap<String, Vec<String>> = tasks
                .iter()
                .map(|(id, t)| (id.clone(), t.dependencies().to_vec()))
                .collect();
            self.dependency_checker
                .validate_dependencies(task.id(), task.dependencies(), &graph)?;

            tasks.insert(task.id().to_string(), Arc::clone(&task));
        }

        let joined = self.join_groups(&task).await;

        if task.is_enabled().await && !self.is_shutdown.load(Ordering::SeqCst) {
            self.spawn_trigger(&task, cron).await;
        }

        info!(
            task_id = task.id(),
            task_name = task.name(),
            schedule = task.schedule(),
            groups = ?joined,
            "任务注册成功"
        );
        self.events
            .publish(SchedulerEvent::job_added(task.id(), task.name()));

        Ok(task)
    }

    async fn join_groups(&self, task: &Task) -> Vec<String> {
        let mut groups = self.groups.write().await;
        let mut joined = Vec::new();
        for group in groups.values_mut() {
            if group.matches(task.tags()) {
                group.add_member(task.id());
                joined.push(group.id.clone());
            }
        }
        joined.sort();
        joined
    }

    /// 新增任务组，并按标签把已注册任务归入该组
    pub async fn add_group(&self, config: &TaskGroupConfig) -> SchedulerResult<()> {
        config
            .validate()
            .map_err(|e| SchedulerError::validation_error(e.to_string()))?;

        let mut group = TaskGroup::from(config);
        {
            let tasks = self.tasks.read().await;
            for task in tasks.values() {
                if group.matches(task.tags()) {
                    group.add_member(task.id());
                }
            }
        }

        let mut groups = self.groups.write().await;
        if groups.contains_key(&group.id) {
            return Err(SchedulerError::validation_error(format!(
                "任务组已存在: {}",
                group.id
            )));
        }
        info!(group_id = %group.id, members = group.members.len(), "添加任务组");
        groups.insert(group.id.clone(), group);
        Ok(())
    }

    async fn spawn_trigger(self: &Arc<Self>, task: &Arc<Task>, cron: CronScheduler) {
        let mut triggers = self.triggers.lock().await;
        if triggers.contains_key(task.id()) {
            return;
        }

        let handle = tokio::spawn(cron_trigger_loop(
            Arc::downgrade(self),
            Arc::clone(task),
            cron,
        ));
        triggers.insert(task.id().to_string(), handle);
    }

    async fn abort_trigger(&self, task_id: &str) -> bool {
        match self.triggers.lock().await.remove(task_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// 注册表中同一ID对应的是否仍是这个任务实例
    async fn is_registered(&self, task: &Arc<Task>) -> bool {
        self.tasks
            .read()
            .await
            .get(task.id())
            .is_some_and(|registered| Arc::ptr_eq(registered, task))
    }

    async fn get_task(&self, task_id: &str) -> SchedulerResult<Arc<Task>> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| SchedulerError::task_not_found(task_id))
    }

    pub async fn start_task(self: &Arc<Self>, task_id: &str) -> SchedulerResult<()> {
        let task = self.get_task(task_id).await?;
        let cron = CronScheduler::new(task.schedule())?;

        task.set_enabled(true).await;
        if !self.is_shutdown.load(Ordering::SeqCst) {
            self.spawn_trigger(&task, cron).await;
        }

        info!(task_id, task_name = task.name(), "任务已启动");
        Ok(())
    }

    pub async fn stop_task(&self, task_id: &str) -> SchedulerResult<()> {
        let task = self.get_task(task_id).await?;

        task.set_enabled(false).await;
        self.abort_trigger(task_id).await;
        task.set_next_run_at(None).await;

        info!(task_id, task_name = task.name(), "任务已停止");
        self.events
            .publish(SchedulerEvent::job_stopped(task.id(), task.name()));
        Ok(())
    }

    /// 删除任务，不可恢复；正在执行的实例会自然结束
    pub async fn delete_task(&self, task_id: &str) -> SchedulerResult<()> {
        self.abort_trigger(task_id).await;

        let task = self
            .tasks
            .write()
            .await
            .remove(task_id)
            .ok_or_else(|| SchedulerError::task_not_found(task_id))?;

        for group in self.groups.write().await.values_mut() {
            group.remove_member(task_id);
        }

        info!(task_id, task_name = task.name(), "任务已删除");
        self.events
            .publish(SchedulerEvent::job_deleted(task.id(), task.name()));
        Ok(())
    }

    /// 手动触发，仍然经过完整的门控流程
    pub async fn run_task_now(&self, task_id: &str) -> SchedulerResult<DispatchResult> {
        self.get_task(task_id).await?;
        match self.execute_task(task_id).await {
            DispatchResult::NotFound => Err(SchedulerError::task_not_found(task_id)),
            result => Ok(result),
        }
    }

    /// 门控检查后执行任务（含重试），记录历史并发布事件
    pub async fn execute_task(&self, task_id: &str) -> DispatchResult {
        let Some(task) = self.tasks.read().await.get(task_id).cloned() else {
            warn!(task_id, "任务不存在，忽略执行请求");
            return DispatchResult::NotFound;
        };

        let reservation = {
            let _dispatch = self.dispatch_lock.lock().await;
            if let Some(reason) = self.check_gates(&task).await {
                info!(
                    task_id,
                    task_name = task.name(),
                    reason = %reason,
                    "跳过任务执行"
                );
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return DispatchResult::Skipped(reason);
            }
            task.reserve()
        };

        self.counters.total.fetch_add(1, Ordering::Relaxed);
        self.events
            .publish(SchedulerEvent::job_started(task.id(), task.name()));
        info!(task_id, task_name = task.name(), "开始执行任务");

        let outcome = self.execute_with_retry(&task).await;
        task.record_outcome(outcome.success).await;

        if self.config.enable_history {
            self.history.write().await.push(HistoryEntry::new(
                task.id(),
                task.name(),
                outcome.success,
                outcome.execution_time.as_millis() as u64,
                outcome.attempts,
                outcome.error.clone(),
            ));
        }

        if outcome.success {
            self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
            info!(
                task_id,
                task_name = task.name(),
                attempts = outcome.attempts,
                elapsed_ms = outcome.execution_time.as_millis() as u64,
                "任务执行完成"
            );
            self.events.publish(SchedulerEvent::job_completed(
                task.id(),
                task.name(),
                outcome.execution_time.as_millis() as u64,
                outcome.attempts,
            ));
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            let error = outcome.error.as_deref().unwrap_or("未知错误");
            error!(
                task_id,
                task_name = task.name(),
                attempts = outcome.attempts,
                error = %error,
                "任务执行失败，重试次数已用尽"
            );
            self.events.publish(SchedulerEvent::job_failed(
                task.id(),
                task.name(),
                error,
                outcome.attempts,
            ));
        }

        drop(reservation);
        DispatchResult::Executed(outcome)
    }

    async fn check_gates(&self, task: &Arc<Task>) -> Option<SkipReason> {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Some(SkipReason::ShuttingDown);
        }
        if !task.is_enabled().await {
            return Some(SkipReason::Disabled);
        }
        if !task.can_run().await {
            return Some(SkipReason::AlreadyRunning);
        }

        let tasks = self.tasks.read().await;
        let dependencies = self.dependency_checker.check_dependencies(task, &tasks).await;
        if !dependencies.can_execute {
            return Some(SkipReason::DependencyBlocked {
                detail: dependencies.reason.unwrap_or_default(),
            });
        }

        let groups = self.groups.read().await;
        for group in groups.values().filter(|g| g.contains(task.id())) {
            let running = group
                .members
                .iter()
                .filter_map(|member| tasks.get(member))
                .filter(|member| member.is_running())
                .count();
            if running >= group.max_concurrency {
                return Some(SkipReason::GroupAtCapacity {
                    group: group.id.clone(),
                    max_concurrency: group.max_concurrency,
                });
            }
        }

        None
    }

    /// 固定间隔重试，`max_retries` 为总尝试次数
    async fn execute_with_retry(&self, task: &Arc<Task>) -> ExecutionOutcome {
        let max_attempts = task.policy().max_retries.max(1);
        let retry_delay = task.policy().retry_delay;
        let started = Instant::now();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let mut attempt = 1;
        loop {
            let outcome = self.executor.execute(task, attempt).await;
            if outcome.success {
                return ExecutionOutcome {
                    execution_time: started.elapsed(),
                    ..outcome
                };
            }

            if attempt >= max_attempts || self.is_shutdown.load(Ordering::SeqCst) {
                return ExecutionOutcome {
                    execution_time: started.elapsed(),
                    ..outcome
                };
            }

            warn!(
                task_id = task.id(),
                attempt,
                max_attempts,
                delay_ms = retry_delay.as_millis() as u64,
                "任务执行失败，等待重试"
            );

            tokio::select! {
                _ = tokio::time::sleep(retry_delay) => {}
                _ = shutdown_rx.recv() => {
                    info!(task_id = task.id(), "调度器关闭，放弃剩余重试");
                    return ExecutionOutcome {
                        execution_time: started.elapsed(),
                        ..outcome
                    };
                }
            }
            attempt += 1;
        }
    }

    pub async fn get_tasks(&self, filter: &TaskFilter) -> Vec<TaskSummary> {
        let tasks: Vec<Arc<Task>> = self.tasks.read().await.values().cloned().collect();
        let group_members = match &filter.group {
            Some(group_id) => Some(
                self.groups
                    .read()
                    .await
                    .get(group_id)
                    .map(|g| g.members.clone())
                    .unwrap_or_default(),
            ),
            None => None,
        };

        let mut summaries = Vec::with_capacity(tasks.len());
        for task in tasks {
            if let Some(tag) = &filter.tag {
                if !task.tags().contains(tag) {
                    continue;
                }
            }
            if let Some(members) = &group_members {
                if !members.contains(task.id()) {
                    continue;
                }
            }
            let summary = task.summary().await;
            if filter.enabled.is_some_and(|enabled| summary.enabled != enabled) {
                continue;
            }
            if filter.running.is_some_and(|running| summary.is_running != running) {
                continue;
            }
            summaries.push(summary);
        }

        summaries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    pub async fn get_task_details(&self, task_id: &str) -> Option<TaskDetails> {
        let task = self.tasks.read().await.get(task_id).cloned()?;

        let mut groups: Vec<String> = self
            .groups
            .read()
            .await
            .values()
            .filter(|g| g.contains(task_id))
            .map(|g| g.id.clone())
            .collect();
        groups.sort();

        let upcoming_runs = if task.is_enabled().await {
            CronScheduler::new(task.schedule())
                .map(|cron| cron.upcoming_times(Utc::now(), UPCOMING_RUNS))
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Some(task.details(groups, upcoming_runs).await)
    }

    pub async fn get_group_stats(&self) -> BTreeMap<String, GroupStats> {
        let tasks = self.tasks.read().await;
        let groups = self.groups.read().await;

        let mut stats = BTreeMap::new();
        for group in groups.values() {
            let members: Vec<&Arc<Task>> = group
                .members
                .iter()
                .filter_map(|id| tasks.get(id))
                .collect();

            let mut enabled_tasks = 0;
            for member in &members {
                if member.is_enabled().await {
                    enabled_tasks += 1;
                }
            }

            stats.insert(
                group.id.clone(),
                GroupStats {
                    id: group.id.clone(),
                    name: group.name.clone(),
                    max_concurrency: group.max_concurrency,
                    total_tasks: members.len(),
                    running_tasks: members.iter().filter(|t| t.is_running()).count(),
                    enabled_tasks,
                },
            );
        }
        stats
    }

    pub async fn get_history(&self, query: &HistoryQuery) -> HistoryPage {
        self.history.read().await.query(query)
    }

    pub async fn get_stats(&self) -> SchedulerStats {
        let tasks: Vec<Arc<Task>> = self.tasks.read().await.values().cloned().collect();
        let mut enabled_tasks = 0;
        for task in &tasks {
            if task.is_enabled().await {
                enabled_tasks += 1;
            }
        }
        let started_at = *self.started_at.read().await;

        SchedulerStats {
            is_running: self.is_running(),
            started_at,
            uptime_seconds: started_at
                .map(|at| (Utc::now() - at).num_seconds())
                .unwrap_or(0),
            total_tasks: tasks.len(),
            enabled_tasks,
            running_tasks: tasks.iter().filter(|t| t.is_running()).count(),
            total_groups: self.groups.read().await.len(),
            history_size: self.history.read().await.len(),
            total_executions: self.counters.total.load(Ordering::Relaxed),
            successful_executions: self.counters.succeeded.load(Ordering::Relaxed),
            failed_executions: self.counters.failed.load(Ordering::Relaxed),
            skipped_executions: self.counters.skipped.load(Ordering::Relaxed),
            executor: self.executor.get_active_stats().await,
        }
    }

    /// 单次尝试运行时间超过自身超时的任务，仅用于诊断，不会强制终止
    ///
    /// 只看执行器中正在进行的尝试，处于重试等待的任务不算卡住。
    pub async fn detect_stuck_tasks(&self) -> Vec<StuckTask> {
        let active = self.executor.get_active_stats().await.active;

        let mut stuck: Vec<StuckTask> = Vec::new();
        for attempt in active.into_iter().filter(|a| a.is_overdue()) {
            match stuck.iter_mut().find(|s| s.task_id == attempt.task_id) {
                Some(existing) => {
                    existing.running_for_ms = existing.running_for_ms.max(attempt.running_ms);
                }
                None => stuck.push(StuckTask {
                    task_id: attempt.task_id,
                    task_name: attempt.task_name,
                    running_for_ms: attempt.running_ms,
                    timeout_ms: attempt.timeout_ms,
                }),
            }
        }

        if !stuck.is_empty() {
            warn!(count = stuck.len(), "检测到卡住的任务");
            self.events
                .publish(SchedulerEvent::stuck_tasks_detected(stuck.clone()));
        }
        stuck
    }

    /// 删除超过保留期的历史记录
    pub async fn trim_history(&self) -> usize {
        let cutoff = Utc::now() - self.config.history_retention();
        let removed = self.history.write().await.prune_older_than(cutoff);
        if removed > 0 {
            info!(removed, "清理过期执行历史");
        } else {
            debug!("没有需要清理的执行历史");
        }
        removed
    }

    /// 启动后台监控（卡住任务检测、历史清理）
    pub async fn start(self: &Arc<Self>) -> SchedulerResult<()> {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Err(SchedulerError::Internal("调度器已关闭，无法重新启动".to_string()));
        }
        if self.is_running.swap(true, Ordering::SeqCst) {
            debug!("调度器已经在运行");
            return Ok(());
        }

        *self.started_at.write().await = Some(Utc::now());

        let mut monitors = self.monitors.lock().await;
        monitors.push(tokio::spawn(monitor::stuck_task_monitor(
            Arc::downgrade(self),
            self.config.monitor_interval(),
            self.shutdown_tx.subscribe(),
        )));
        monitors.push(tokio::spawn(monitor::history_maintenance(
            Arc::downgrade(self),
            self.config.history_cleanup_interval(),
            self.shutdown_tx.subscribe(),
        )));

        let task_count = self.tasks.read().await.len();
        info!(task_count, "任务调度服务已启动");
        Ok(())
    }

    /// 停止所有触发器和后台监控，新的执行请求将被跳过
    pub async fn shutdown(&self) {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("正在关闭任务调度服务");

        let _ = self.shutdown_tx.send(());

        let mut triggers = self.triggers.lock().await;
        for (_, handle) in triggers.drain() {
            handle.abort();
        }
        drop(triggers);

        for handle in self.monitors.lock().await.drain(..) {
            handle.abort();
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("任务调度服务已关闭");
    }

    /// 等待正在执行的任务结束，超时返回 false
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let running = self
                .tasks
                .read()
                .await
                .values()
                .filter(|t| t.is_busy())
                .count();
            if running == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(running, "等待任务结束超时");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// 单个任务的CRON触发循环：睡眠到下次触发时间，再派生执行
async fn cron_trigger_loop(service: Weak<SchedulerService>, task: Arc<Task>, cron: CronScheduler) {
    let mut last_fire: Option<DateTime<Utc>> = None;
    loop {
        let now = Utc::now();
        // 时钟精度可能让唤醒略早于触发点，以上次触发时间为下界避免重复触发
        let from = last_fire.map_or(now, |fired| fired.max(now));
        let Some(next) = cron.next_execution_time(from) else {
            warn!(task_id = task.id(), schedule = cron.expression(), "无法计算下一次执行时间，停止触发");
            task.set_next_run_at(None).await;
            return;
        };
        task.set_next_run_at(Some(next)).await;

        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        last_fire = Some(next);

        let Some(service) = service.upgrade() else {
            return;
        };
        // 注册与删除并发时触发器可能在任务移除后才创建
        if !service.is_registered(&task).await {
            debug!(task_id = task.id(), "任务已不在注册表中，停止触发");
            return;
        }
        debug!(task_id = task.id(), "CRON触发任务");
        let task_id = task.id().to_string();
        tokio::spawn(async move {
            service.execute_task(&task_id).await;
        });
    }
}
