use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    observability::ObservabilityConfig,
    resilience::{ResilienceConfig, RetryConfig},
    scheduler::{SchedulerConfig, TaskGroupConfig},
    tasks::TasksConfig,
};

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/digest-scheduler.toml",
    "digest-scheduler.toml",
    "/etc/digest-scheduler/config.toml",
];

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub groups: Vec<TaskGroupConfig>,
    pub tasks: TasksConfig,
    pub resilience: ResilienceConfig,
    pub transport_retry: RetryConfig,
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            groups: TaskGroupConfig::defaults(),
            tasks: TasksConfig::default(),
            resilience: ResilienceConfig::default(),
            transport_retry: RetryConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Built-in defaults
    /// 2. Config file (TOML format); an explicit path must exist, otherwise the
    ///    first default path found is used
    /// 3. Environment variable overrides (prefix: DIGEST_SCHEDULER, separator: __)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("DIGEST_SCHEDULER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate().context("调度器配置验证失败")?;
        TaskGroupConfig::validate_all(&self.groups).context("任务组配置验证失败")?;
        self.tasks.validate().context("内置任务配置验证失败")?;
        self.resilience.validate().context("熔断器配置验证失败")?;
        self.transport_retry
            .validate()
            .context("传输层重试配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;
        Ok(())
    }
}
