//! 任务调度核心
//!
//! CRON触发、门控（启用/并发/依赖/任务组）、固定间隔重试、执行历史与后台监控。

pub mod cron_utils;
pub mod dependency_checker;
pub mod executor;
pub mod monitor;
pub mod retry;
pub mod scheduler;

pub use cron_utils::CronScheduler;
pub use dependency_checker::{BlockReason, DependencyCheckResult, DependencyChecker};
pub use executor::{ActiveTaskInfo, ExecutionOutcome, ExecutorStats, TaskExecutor};
pub use retry::{calculate_backoff, retry_with_backoff};
pub use scheduler::{DispatchResult, SchedulerService, SchedulerStats, SkipReason, TaskFilter};
