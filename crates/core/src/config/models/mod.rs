pub mod app_config;
pub mod observability;
pub mod resilience;
pub mod scheduler;
pub mod tasks;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use observability::ObservabilityConfig;
pub use resilience::{ResilienceConfig, RetryConfig};
pub use scheduler::{SchedulerConfig, TaskGroupConfig, MAX_DEPENDENCY_FAILURE_WINDOW};
pub use tasks::{PredefinedTaskConfig, TasksConfig};
