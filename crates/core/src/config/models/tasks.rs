use serde::{Deserialize, Serialize};

/// 单个内置任务的调度策略
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredefinedTaskConfig {
    pub enabled: bool,
    pub schedule: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl PredefinedTaskConfig {
    pub fn new(schedule: &str, timeout_ms: u64, max_retries: u32, retry_delay_ms: u64) -> Self {
        Self {
            enabled: true,
            schedule: schedule.to_string(),
            timeout_ms,
            max_retries,
            retry_delay_ms,
        }
    }

    fn validate(&self, name: &str) -> anyhow::Result<()> {
        if self.schedule.trim().is_empty() {
            return Err(anyhow::anyhow!("任务 {name} 的调度表达式不能为空"));
        }
        if self.timeout_ms == 0 {
            return Err(anyhow::anyhow!("任务 {name} 的超时时间必须大于0"));
        }
        if self.max_retries == 0 {
            return Err(anyhow::anyhow!("任务 {name} 的最大重试次数必须至少为1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    pub rss_monitor: PredefinedTaskConfig,
    pub ai_analysis: PredefinedTaskConfig,
    pub news_aggregation: PredefinedTaskConfig,
    pub daily_digest: PredefinedTaskConfig,
    pub realtime_notification: PredefinedTaskConfig,
    pub cleanup: PredefinedTaskConfig,
    pub health_check: PredefinedTaskConfig,
    /// 每次AI分析处理的文章上限
    pub analysis_batch_size: usize,
    /// 聚合与日报覆盖的时间窗口（小时）
    pub aggregation_window_hours: i64,
    /// 日报包含的文章上限
    pub digest_article_limit: usize,
    /// 实时推送的重要度阈值（0.0-1.0）
    pub realtime_importance_threshold: f64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            rss_monitor: PredefinedTaskConfig::new("*/15 * * * *", 300_000, 3, 30_000),
            ai_analysis: PredefinedTaskConfig::new("*/30 * * * *", 600_000, 2, 60_000),
            news_aggregation: PredefinedTaskConfig::new("0 */2 * * *", 300_000, 2, 30_000),
            daily_digest: PredefinedTaskConfig::new("0 8 * * *", 300_000, 3, 60_000),
            realtime_notification: PredefinedTaskConfig::new("*/5 * * * *", 120_000, 2, 10_000),
            cleanup: PredefinedTaskConfig::new("0 3 * * *", 600_000, 1, 0),
            health_check: PredefinedTaskConfig::new("*/10 * * * *", 30_000, 1, 0),
            analysis_batch_size: 20,
            aggregation_window_hours: 24,
            digest_article_limit: 20,
            realtime_importance_threshold: 0.8,
        }
    }
}

impl TasksConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.rss_monitor.validate("rss_monitor")?;
        self.ai_analysis.validate("ai_analysis")?;
        self.news_aggregation.validate("news_aggregation")?;
        self.daily_digest.validate("daily_digest")?;
        self.realtime_notification.validate("realtime_notification")?;
        self.cleanup.validate("cleanup")?;
        self.health_check.validate("health_check")?;

        if self.analysis_batch_size == 0 {
            return Err(anyhow::anyhow!("AI分析批量大小必须大于0"));
        }
        if self.aggregation_window_hours <= 0 {
            return Err(anyhow::anyhow!("聚合时间窗口必须大于0"));
        }
        if self.digest_article_limit == 0 {
            return Err(anyhow::anyhow!("日报文章上限必须大于0"));
        }
        if !(0.0..=1.0).contains(&self.realtime_importance_threshold) {
            return Err(anyhow::anyhow!("实时推送重要度阈值必须在0.0-1.0之间"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_config_defaults_are_valid() {
        let config = TasksConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.daily_digest.schedule, "0 8 * * *");
        assert!(config.health_check.enabled);
    }

    #[test]
    fn test_tasks_config_rejects_empty_schedule() {
        let mut config = TasksConfig::default();
        config.cleanup.schedule = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
