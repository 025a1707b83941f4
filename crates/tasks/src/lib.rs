//! 内置新闻任务
//!
//! RSS检查、AI分析、新闻聚合、日报、实时推送、数据清理与健康检查。
//! 外部服务通过 [`collaborators`] 中的 trait 注入。

pub mod collaborators;
pub mod maintenance;
pub mod news;
pub mod notification;
pub mod predefined;

pub use collaborators::*;
pub use maintenance::{CleanupTask, HealthCheckTask, HealthStatus};
pub use news::{AiAnalysisTask, NewsAggregationTask, RssMonitorTask};
pub use notification::{DailyDigestTask, RealtimeNotificationTask};
pub use predefined::{Collaborators, PredefinedTasks};
