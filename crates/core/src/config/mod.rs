//! 配置管理
//!
//! 配置按以下顺序加载，后者覆盖前者：
//!
//! 1. 内置默认值（各模型的 `Default` 实现）
//! 2. TOML 配置文件
//! 3. 环境变量（前缀 `DIGEST_SCHEDULER`，层级分隔符 `__`）
//!
//! ```toml
//! [scheduler]
//! max_history_size = 500
//!
//! [[groups]]
//! id = "news"
//! name = "News"
//! max_concurrency = 2
//! tags = ["rss", "news"]
//!
//! [tasks.daily_digest]
//! schedule = "0 8 * * *"
//! ```

pub mod models;

pub use models::{
    AppConfig, ObservabilityConfig, PredefinedTaskConfig, ResilienceConfig, RetryConfig,
    SchedulerConfig, TaskGroupConfig, TasksConfig, MAX_DEPENDENCY_FAILURE_WINDOW,
};
