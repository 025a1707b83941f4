use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use digest_scheduler_core::{CircuitBreaker, SchedulerError, SchedulerResult};
use digest_scheduler_domain::{TaskContext, TaskHandler};

use crate::collaborators::{AggregateOptions, DailyDigest, EmailCollaborator, NewsCollaborator, NewsFilter};

/// 汇总最近24小时的新闻并发送日报
pub struct DailyDigestTask {
    news: Arc<dyn NewsCollaborator>,
    email: Arc<dyn EmailCollaborator>,
    breaker: Arc<CircuitBreaker>,
    article_limit: usize,
}

impl DailyDigestTask {
    pub fn new(
        news: Arc<dyn NewsCollaborator>,
        email: Arc<dyn EmailCollaborator>,
        breaker: Arc<CircuitBreaker>,
        article_limit: usize,
    ) -> Self {
        Self {
            news,
            email,
            breaker,
            article_limit,
        }
    }
}

#[async_trait]
impl TaskHandler for DailyDigestTask {
    async fn run(&self, ctx: TaskContext) -> SchedulerResult<Value> {
        let now = Utc::now();
        let options = AggregateOptions {
            since: now - Duration::hours(24),
            limit: self.article_limit,
        };
        let articles = self.news.smart_aggregate_news(&options).await?;

        if articles.is_empty() {
            info!(task_id = %ctx.task_id, "最近24小时没有新闻，跳过日报发送");
            return Ok(json!({ "sent": false, "articleCount": 0 }));
        }

        let digest = DailyDigest {
            date: now.date_naive(),
            articles,
            generated_at: now,
        };
        let article_count = digest.articles.len();

        let email = Arc::clone(&self.email);
        let payload = &digest;
        self.breaker
            .execute(|| async move { email.send_daily_digest(payload).await })
            .await?;

        info!(articles = article_count, date = %digest.date, "日报发送成功");
        Ok(json!({ "sent": true, "articleCount": article_count }))
    }
}

/// 推送上次检查以来的高重要度新闻
///
/// 无论本轮是否成功，检查时间点都会前移，避免同一批新闻被重复推送。
pub struct RealtimeNotificationTask {
    news: Arc<dyn NewsCollaborator>,
    email: Arc<dyn EmailCollaborator>,
    breaker: Arc<CircuitBreaker>,
    importance_threshold: f64,
    last_check: Mutex<DateTime<Utc>>,
}

impl RealtimeNotificationTask {
    pub fn new(
        news: Arc<dyn NewsCollaborator>,
        email: Arc<dyn EmailCollaborator>,
        breaker: Arc<CircuitBreaker>,
        importance_threshold: f64,
    ) -> Self {
        Self {
            news,
            email,
            breaker,
            importance_threshold,
            last_check: Mutex::new(Utc::now()),
        }
    }

    pub async fn last_check(&self) -> DateTime<Utc> {
        *self.last_check.lock().await
    }
}

#[async_trait]
impl TaskHandler for RealtimeNotificationTask {
    async fn run(&self, ctx: TaskContext) -> SchedulerResult<Value> {
        let since = {
            let mut last_check = self.last_check.lock().await;
            std::mem::replace(&mut *last_check, Utc::now())
        };

        let filter = NewsFilter {
            since: Some(since),
            analyzed: Some(true),
            min_importance: Some(self.importance_threshold),
            limit: None,
        };
        let articles = self.news.get_recent_news(&filter).await?;
        let important: Vec<_> = articles
            .into_iter()
            .filter(|a| a.importance.unwrap_or(0.0) >= self.importance_threshold)
            .collect();

        if important.is_empty() {
            debug!(task_id = %ctx.task_id, since = %since, "没有需要实时推送的新闻");
            return Ok(json!({ "sent": 0, "failed": 0 }));
        }

        let mut sent = 0usize;
        let mut failed = 0usize;
        for article in &important {
            let email = Arc::clone(&self.email);
            match self
                .breaker
                .execute(|| async move { email.send_realtime_notification(article).await })
                .await
            {
                Ok(()) => sent += 1,
                Err(SchedulerError::CircuitOpen { name }) => {
                    warn!(breaker = %name, "邮件熔断器已打开，停止实时推送");
                    failed = important.len() - sent;
                    break;
                }
                Err(error) => {
                    warn!(article_id = %article.id, error = %error, "实时推送失败");
                    failed += 1;
                }
            }
        }

        info!(sent, failed, "实时推送完成");

        if sent == 0 {
            return Err(SchedulerError::execution_error(format!(
                "实时推送全部失败: {failed} 条"
            )));
        }
        Ok(json!({ "sent": sent, "failed": failed }))
    }
}
