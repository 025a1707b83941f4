use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error, Clone)]
pub enum SchedulerError {
    #[error("任务校验失败: {0}")]
    Validation(String),

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("任务已存在: {id}")]
    DuplicateTask { id: String },

    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("检测到循环依赖: {task_id}")]
    CircularDependency { task_id: String },

    #[error("task timeout: {name} ({timeout_ms}ms)")]
    TaskTimeout { name: String, timeout_ms: u64 },

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("熔断器已打开: {name}")]
    CircuitOpen { name: String },

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("外部服务调用失败: {0}")]
    Collaborator(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn task_not_found<S: Into<String>>(id: S) -> Self {
        Self::TaskNotFound { id: id.into() }
    }

    pub fn execution_error<S: Into<String>>(msg: S) -> Self {
        Self::TaskExecution(msg.into())
    }

    pub fn collaborator_error<S: Into<String>>(msg: S) -> Self {
        Self::Collaborator(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 注册阶段即被拒绝的错误
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SchedulerError::Validation(_)
                | SchedulerError::InvalidCron { .. }
                | SchedulerError::DuplicateTask { .. }
                | SchedulerError::CircularDependency { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SchedulerError::TaskTimeout { .. } | SchedulerError::Timeout(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Collaborator(_)
                | SchedulerError::Timeout(_)
                | SchedulerError::TaskTimeout { .. }
                | SchedulerError::TaskExecution(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Internal(_) | SchedulerError::Configuration(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = SchedulerError::InvalidCron {
            expr: "not-a-cron".to_string(),
            message: "bad field".to_string(),
        };
        assert!(err.is_validation());
        assert!(!err.is_retryable());

        let err = SchedulerError::TaskTimeout {
            name: "rss-monitor".to_string(),
            timeout_ms: 100,
        };
        assert!(err.is_timeout());
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("task timeout: rss-monitor"));

        assert!(SchedulerError::config_error("x").is_fatal());
        assert!(!SchedulerError::CircuitOpen { name: "ai".into() }.is_retryable());
    }

    #[test]
    fn test_from_serde_json_error() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SchedulerError = parse_err.into();
        assert!(matches!(err, SchedulerError::Serialization(_)));
    }
}
