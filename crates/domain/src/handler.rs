use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use digest_scheduler_core::SchedulerResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单次执行尝试的上下文
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskContext {
    pub task_id: String,
    pub task_name: String,
    /// 当前尝试序号，从1开始
    pub attempt: u32,
    pub max_attempts: u32,
}

impl TaskContext {
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// 任务处理器
///
/// 每次尝试都会重新调用 `run`，实现需要保证可重入。
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> SchedulerResult<Value>;
}

/// 闭包适配器
pub struct FnHandler<F> {
    func: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = SchedulerResult<Value>> + Send + 'static,
{
    async fn run(&self, ctx: TaskContext) -> SchedulerResult<Value> {
        (self.func)(ctx).await
    }
}

/// 将异步闭包包装为 [`TaskHandler`]
pub fn handler_fn<F, Fut>(func: F) -> FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = SchedulerResult<Value>> + Send + 'static,
{
    FnHandler { func }
}
