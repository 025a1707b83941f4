use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use digest_scheduler_core::{CircuitBreakerRegistry, PredefinedTaskConfig, RetryConfig, TasksConfig};
use digest_scheduler_domain::{EventBus, TaskDefinition, TaskHandler, TaskPriority};

use crate::collaborators::{
    CleanupCollaborator, EmailCollaborator, HealthProbe, NewsCollaborator, RssCollaborator,
};
use crate::maintenance::{CleanupTask, HealthCheckTask};
use crate::news::{AiAnalysisTask, NewsAggregationTask, RssMonitorTask};
use crate::notification::{DailyDigestTask, RealtimeNotificationTask};

pub const RSS_MONITOR_ID: &str = "rss-monitor";
pub const AI_ANALYSIS_ID: &str = "ai-analysis";
pub const NEWS_AGGREGATION_ID: &str = "news-aggregation";
pub const DAILY_DIGEST_ID: &str = "daily-digest";
pub const REALTIME_NOTIFICATION_ID: &str = "realtime-notification";
pub const CLEANUP_ID: &str = "cleanup";
pub const HEALTH_CHECK_ID: &str = "health-check";

pub const AI_BREAKER: &str = "ai";
pub const EMAIL_BREAKER: &str = "email";
pub const HTTP_BREAKER: &str = "http";

/// 可用的外部协作者，缺失的协作者对应的任务不会被创建
#[derive(Clone, Default)]
pub struct Collaborators {
    pub rss: Option<Arc<dyn RssCollaborator>>,
    pub news: Option<Arc<dyn NewsCollaborator>>,
    pub email: Option<Arc<dyn EmailCollaborator>>,
    pub cleaners: Vec<Arc<dyn CleanupCollaborator>>,
    pub probes: Vec<Arc<dyn HealthProbe>>,
}

/// 内置任务定义工厂
pub struct PredefinedTasks;

impl PredefinedTasks {
    /// 按配置与可用协作者构建内置任务
    ///
    /// 依赖只在被依赖任务同时存在时添加：聚合依赖RSS检查，日报依赖聚合。
    /// 健康检查总是存在。
    pub fn definitions(
        config: &TasksConfig,
        transport_retry: &RetryConfig,
        breakers: &mut CircuitBreakerRegistry,
        collaborators: &Collaborators,
        events: EventBus,
    ) -> Vec<TaskDefinition> {
        let mut definitions = Vec::new();

        if let Some(rss) = &collaborators.rss {
            let handler = RssMonitorTask::new(
                Arc::clone(rss),
                breakers.get_or_default(HTTP_BREAKER),
                transport_retry.clone(),
            );
            definitions.push(
                definition(RSS_MONITOR_ID, "RSS源监控", &config.rss_monitor, Arc::new(handler))
                    .with_description("检查所有RSS源并抓取新文章")
                    .with_tags(&["rss", "news"])
                    .with_priority(TaskPriority::High),
            );
        }

        if let Some(news) = &collaborators.news {
            let handler = AiAnalysisTask::new(
                Arc::clone(news),
                breakers.get_or_default(AI_BREAKER),
                config.analysis_batch_size,
                config.aggregation_window_hours,
            );
            definitions.push(
                definition(AI_ANALYSIS_ID, "AI新闻分析", &config.ai_analysis, Arc::new(handler))
                    .with_description("对未分析的文章进行AI分析与重要度评分")
                    .with_tags(&["ai", "analysis"]),
            );

            // 聚合结果上限与日报一致
            let handler = NewsAggregationTask::new(
                Arc::clone(news),
                config.aggregation_window_hours,
                config.digest_article_limit,
            );
            let mut aggregation = definition(
                NEWS_AGGREGATION_ID,
                "新闻聚合",
                &config.news_aggregation,
                Arc::new(handler),
            )
            .with_description("去重并聚类时间窗口内的新闻")
            .with_tags(&["news"]);
            if collaborators.rss.is_some() {
                aggregation = aggregation.with_dependencies(&[RSS_MONITOR_ID]);
            }
            definitions.push(aggregation);
        }

        if let (Some(news), Some(email)) = (&collaborators.news, &collaborators.email) {
            let email_breaker = breakers.get_or_default(EMAIL_BREAKER);

            let handler = DailyDigestTask::new(
                Arc::clone(news),
                Arc::clone(email),
                Arc::clone(&email_breaker),
                config.digest_article_limit,
            );
            definitions.push(
                definition(DAILY_DIGEST_ID, "每日新闻摘要", &config.daily_digest, Arc::new(handler))
                    .with_description("生成并发送最近24小时的新闻日报")
                    .with_tags(&["email", "notification"])
                    .with_dependencies(&[NEWS_AGGREGATION_ID])
                    .with_priority(TaskPriority::High),
            );

            let handler = RealtimeNotificationTask::new(
                Arc::clone(news),
                Arc::clone(email),
                email_breaker,
                config.realtime_importance_threshold,
            );
            definitions.push(
                definition(
                    REALTIME_NOTIFICATION_ID,
                    "实时新闻推送",
                    &config.realtime_notification,
                    Arc::new(handler),
                )
                .with_description("推送高重要度的新文章")
                .with_tags(&["email", "notification"]),
            );
        }

        if !collaborators.cleaners.is_empty() {
            let handler = CleanupTask::new(collaborators.cleaners.clone());
            definitions.push(
                definition(CLEANUP_ID, "数据清理", &config.cleanup, Arc::new(handler))
                    .with_description("清理过期的文章与日志")
                    .with_tags(&["cleanup", "maintenance"])
                    .with_priority(TaskPriority::Low),
            );
        }

        // 熔断器全部创建后再快照，健康检查才能看到它们
        let handler = HealthCheckTask::new(collaborators.probes.clone(), breakers.clone(), events);
        definitions.push(
            definition(HEALTH_CHECK_ID, "系统健康检查", &config.health_check, Arc::new(handler))
                .with_description("检查外部服务与熔断器状态")
                .with_tags(&["monitoring"]),
        );

        debug!(count = definitions.len(), "内置任务定义已生成");
        definitions
    }
}

fn definition(
    id: &str,
    name: &str,
    config: &PredefinedTaskConfig,
    handler: Arc<dyn TaskHandler>,
) -> TaskDefinition {
    TaskDefinition::with_shared_handler(name, &config.schedule, handler)
        .with_id(id)
        .enabled(config.enabled)
        .with_max_retries(config.max_retries)
        .with_retry_delay(Duration::from_millis(config.retry_delay_ms))
        .with_timeout(Duration::from_millis(config.timeout_ms))
}
