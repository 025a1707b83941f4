use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// 每个任务保留的最终执行结果条数，依赖失败窗口不能超过它
pub const MAX_DEPENDENCY_FAILURE_WINDOW: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 仅用于执行器统计展示，不做全局限流
    pub max_concurrent_tasks: usize,
    pub enable_history: bool,
    pub max_history_size: usize,
    pub history_retention_days: i64,
    pub monitor_interval_seconds: u64,
    pub history_cleanup_interval_seconds: u64,
    /// 依赖任务最近多少次执行内出现失败即视为不健康
    pub dependency_failure_window: usize,
    pub event_channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent_tasks: 10,
            enable_history: true,
            max_history_size: 1000,
            history_retention_days: 7,
            monitor_interval_seconds: 60,
            history_cleanup_interval_seconds: 24 * 60 * 60,
            dependency_failure_window: 3,
            event_channel_capacity: 256,
        }
    }
}

impl SchedulerConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_seconds)
    }

    pub fn history_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.history_cleanup_interval_seconds)
    }

    pub fn history_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.history_retention_days)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(anyhow::anyhow!("最大并发任务数必须大于0"));
        }
        if self.enable_history && self.max_history_size == 0 {
            return Err(anyhow::anyhow!("启用历史记录时历史容量必须大于0"));
        }
        if self.history_retention_days <= 0 {
            return Err(anyhow::anyhow!("历史保留天数必须大于0"));
        }
        if self.monitor_interval_seconds == 0 {
            return Err(anyhow::anyhow!("监控间隔必须大于0"));
        }
        if self.history_cleanup_interval_seconds == 0 {
            return Err(anyhow::anyhow!("历史清理间隔必须大于0"));
        }
        if self.dependency_failure_window == 0 {
            return Err(anyhow::anyhow!("依赖失败窗口必须大于0"));
        }
        if self.dependency_failure_window > MAX_DEPENDENCY_FAILURE_WINDOW {
            return Err(anyhow::anyhow!(
                "依赖失败窗口不能超过 {}: {}",
                MAX_DEPENDENCY_FAILURE_WINDOW,
                self.dependency_failure_window
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(anyhow::anyhow!("事件通道容量必须大于0"));
        }
        Ok(())
    }
}

/// 任务组配置，成员关系由标签交集自动推导
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskGroupConfig {
    pub id: String,
    pub name: String,
    pub max_concurrency: usize,
    pub tags: Vec<String>,
}

impl TaskGroupConfig {
    pub fn new(id: &str, name: &str, max_concurrency: usize, tags: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            max_concurrency,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("news", "News", 2, &["rss", "news"]),
            Self::new("analysis", "Analysis", 1, &["ai", "analysis"]),
            Self::new("cleanup", "Cleanup", 1, &["cleanup", "maintenance"]),
            Self::new("notification", "Notification", 3, &["email", "notification"]),
        ]
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.trim().is_empty() {
            return Err(anyhow::anyhow!("任务组ID不能为空"));
        }
        if self.max_concurrency == 0 {
            return Err(anyhow::anyhow!("任务组 {} 的最大并发数必须大于0", self.id));
        }
        if self.tags.is_empty() {
            return Err(anyhow::anyhow!("任务组 {} 的标签不能为空", self.id));
        }
        Ok(())
    }

    pub fn validate_all(groups: &[Self]) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for group in groups {
            group.validate()?;
            if !seen.insert(group.id.as_str()) {
                return Err(anyhow::anyhow!("任务组ID重复: {}", group.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_history_size, 1000);
        assert_eq!(config.history_retention_days, 7);
        assert_eq!(config.monitor_interval(), Duration::from_secs(60));
        assert_eq!(config.history_cleanup_interval(), Duration::from_secs(86_400));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scheduler_config_validation() {
        let config = SchedulerConfig {
            dependency_failure_window: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dependency_failure_window_upper_bound() {
        let mut config = SchedulerConfig {
            dependency_failure_window: MAX_DEPENDENCY_FAILURE_WINDOW,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.dependency_failure_window = MAX_DEPENDENCY_FAILURE_WINDOW + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_group_validation() {
        assert!(TaskGroupConfig::validate_all(&TaskGroupConfig::defaults()).is_ok());

        let mut groups = TaskGroupConfig::defaults();
        groups.push(TaskGroupConfig::new("news", "Dup", 1, &["x"]));
        assert!(TaskGroupConfig::validate_all(&groups).is_err());

        let zero = TaskGroupConfig::new("z", "Zero", 0, &["x"]);
        assert!(zero.validate().is_err());
    }
}
