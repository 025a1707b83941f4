use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use digest_scheduler_core::{CircuitBreaker, RetryConfig, SchedulerError, SchedulerResult};
use digest_scheduler_dispatcher::retry_with_backoff;
use digest_scheduler_domain::{TaskContext, TaskHandler};

use crate::collaborators::{AggregateOptions, NewsCollaborator, NewsFilter, RssCollaborator};

/// 检查所有RSS源
///
/// 经 `http` 熔断器调用，瞬时失败按传输层退避策略重试。
pub struct RssMonitorTask {
    rss: Arc<dyn RssCollaborator>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
}

impl RssMonitorTask {
    pub fn new(rss: Arc<dyn RssCollaborator>, breaker: Arc<CircuitBreaker>, retry: RetryConfig) -> Self {
        Self { rss, breaker, retry }
    }
}

#[async_trait]
impl TaskHandler for RssMonitorTask {
    async fn run(&self, ctx: TaskContext) -> SchedulerResult<Value> {
        debug!(task_id = %ctx.task_id, attempt = ctx.attempt, "开始检查RSS源");

        let report = retry_with_backoff(&self.retry, "monitor_all_sources", || {
            let rss = Arc::clone(&self.rss);
            let breaker = Arc::clone(&self.breaker);
            async move { breaker.execute(|| async move { rss.monitor_all_sources().await }).await }
        })
        .await?;

        if report.error_count > 0 {
            warn!(
                sources = report.source_count,
                errors = report.error_count,
                "部分RSS源检查失败"
            );
        }
        info!(
            sources = report.source_count,
            active = report.active_count,
            "RSS源检查完成"
        );

        Ok(serde_json::to_value(report)?)
    }
}

/// 对最近未分析的文章逐篇调用AI分析
///
/// 单篇失败不影响其余文章；`ai` 熔断器打开后立即结束本批次。
pub struct AiAnalysisTask {
    news: Arc<dyn NewsCollaborator>,
    breaker: Arc<CircuitBreaker>,
    batch_size: usize,
    window_hours: i64,
}

impl AiAnalysisTask {
    pub fn new(
        news: Arc<dyn NewsCollaborator>,
        breaker: Arc<CircuitBreaker>,
        batch_size: usize,
        window_hours: i64,
    ) -> Self {
        Self {
            news,
            breaker,
            batch_size,
            window_hours,
        }
    }
}

#[async_trait]
impl TaskHandler for AiAnalysisTask {
    async fn run(&self, ctx: TaskContext) -> SchedulerResult<Value> {
        let filter = NewsFilter {
            since: Some(Utc::now() - Duration::hours(self.window_hours)),
            analyzed: Some(false),
            min_importance: None,
            limit: Some(self.batch_size),
        };
        let pending = self.news.get_recent_news(&filter).await?;
        if pending.is_empty() {
            debug!(task_id = %ctx.task_id, "没有待分析的文章");
            return Ok(json!({ "analyzed": 0, "failed": 0, "circuitOpen": false }));
        }

        let mut analyzed = 0usize;
        let mut failed = 0usize;
        let mut circuit_open = false;

        for article in &pending {
            let news = Arc::clone(&self.news);
            let article_id = article.id.clone();
            match self
                .breaker
                .execute(|| async move { news.analyze_article(&article_id).await })
                .await
            {
                Ok(()) => analyzed += 1,
                Err(SchedulerError::CircuitOpen { name }) => {
                    warn!(breaker = %name, remaining = pending.len() - analyzed - failed, "AI熔断器已打开，停止本批次分析");
                    circuit_open = true;
                    break;
                }
                Err(error) => {
                    warn!(article_id = %article.id, error = %error, "文章分析失败");
                    failed += 1;
                }
            }
        }

        info!(analyzed, failed, total = pending.len(), "AI分析批次完成");

        if analyzed == 0 && failed > 0 {
            return Err(SchedulerError::execution_error(format!(
                "AI分析全部失败: {failed} 篇"
            )));
        }

        Ok(json!({
            "analyzed": analyzed,
            "failed": failed,
            "circuitOpen": circuit_open,
        }))
    }
}

pub struct NewsAggregationTask {
    news: Arc<dyn NewsCollaborator>,
    window_hours: i64,
    limit: usize,
}

impl NewsAggregationTask {
    pub fn new(news: Arc<dyn NewsCollaborator>, window_hours: i64, limit: usize) -> Self {
        Self {
            news,
            window_hours,
            limit,
        }
    }
}

#[async_trait]
impl TaskHandler for NewsAggregationTask {
    async fn run(&self, _ctx: TaskContext) -> SchedulerResult<Value> {
        let options = AggregateOptions {
            since: Utc::now() - Duration::hours(self.window_hours),
            limit: self.limit,
        };
        let articles = self.news.smart_aggregate_news(&options).await?;
        info!(count = articles.len(), window_hours = self.window_hours, "新闻聚合完成");

        Ok(json!({
            "aggregated": articles.len(),
            "windowHours": self.window_hours,
        }))
    }
}
