//! 外部协作者接口
//!
//! RSS抓取、AI分析、邮件发送、数据清理等实现不属于调度器，这里只定义内置任务调用它们的契约。
//! 协作者返回 `Err(SchedulerError::Collaborator)` 表示调用失败。

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use digest_scheduler_core::SchedulerResult;

/// 一轮RSS源检查的汇总
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceMonitorReport {
    pub source_count: usize,
    pub active_count: usize,
    pub error_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub summary: Option<String>,
    /// 0.0-1.0，未分析时为空
    pub importance: Option<f64>,
    pub analyzed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsFilter {
    pub since: Option<DateTime<Utc>>,
    pub analyzed: Option<bool>,
    pub min_importance: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateOptions {
    pub since: DateTime<Utc>,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyDigest {
    pub date: NaiveDate,
    pub articles: Vec<Article>,
    pub generated_at: DateTime<Utc>,
}

#[async_trait]
pub trait RssCollaborator: Send + Sync {
    async fn monitor_all_sources(&self) -> SchedulerResult<SourceMonitorReport>;
}

#[async_trait]
pub trait NewsCollaborator: Send + Sync {
    async fn get_recent_news(&self, filter: &NewsFilter) -> SchedulerResult<Vec<Article>>;
    async fn analyze_article(&self, article_id: &str) -> SchedulerResult<()>;
    /// 去重、聚类后的文章列表
    async fn smart_aggregate_news(&self, options: &AggregateOptions) -> SchedulerResult<Vec<Article>>;
}

#[async_trait]
pub trait EmailCollaborator: Send + Sync {
    async fn send_daily_digest(&self, digest: &DailyDigest) -> SchedulerResult<()>;
    async fn send_realtime_notification(&self, article: &Article) -> SchedulerResult<()>;
}

#[async_trait]
pub trait CleanupCollaborator: Send + Sync {
    fn name(&self) -> &str;
    /// 返回清理的记录数
    async fn cleanup(&self) -> SchedulerResult<u64>;
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;
    async fn is_healthy(&self) -> bool;
}
