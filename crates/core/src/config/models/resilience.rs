use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;

/// 每个受保护的外部协作者一个熔断器
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub ai_circuit_breaker: CircuitBreakerConfig,
    pub email_circuit_breaker: CircuitBreakerConfig,
    pub http_circuit_breaker: CircuitBreakerConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            ai_circuit_breaker: CircuitBreakerConfig {
                name: "ai".to_string(),
                timeout_ms: 60_000,
                error_threshold_percentage: 50.0,
                reset_timeout_ms: 120_000,
                max_requests: 10,
            },
            email_circuit_breaker: CircuitBreakerConfig {
                name: "email".to_string(),
                timeout_ms: 30_000,
                error_threshold_percentage: 50.0,
                reset_timeout_ms: 60_000,
                max_requests: 5,
            },
            http_circuit_breaker: CircuitBreakerConfig {
                name: "http".to_string(),
                timeout_ms: 15_000,
                error_threshold_percentage: 60.0,
                reset_timeout_ms: 30_000,
                max_requests: 10,
            },
        }
    }
}

impl ResilienceConfig {
    pub fn breakers(&self) -> Vec<CircuitBreakerConfig> {
        vec![
            self.ai_circuit_breaker.clone(),
            self.email_circuit_breaker.clone(),
            self.http_circuit_breaker.clone(),
        ]
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for breaker in self.breakers() {
            breaker.validate()?;
        }
        Ok(())
    }
}

/// 传输层重试策略（指数退避 + 随机抖动），与任务级固定间隔重试相互独立
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 总尝试次数（含首次）
    pub max_attempts: u32,
    /// 基础重试间隔（毫秒）
    pub base_delay_ms: u64,
    /// 最大重试间隔（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 重试间隔的随机抖动范围（0.0-1.0）
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("重试次数必须至少为1"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(anyhow::anyhow!("退避倍数不能小于1.0"));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(anyhow::anyhow!("抖动系数必须在0.0-1.0之间"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(anyhow::anyhow!("最大重试间隔不能小于基础重试间隔"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resilience_config_default() {
        let config = ResilienceConfig::default();

        assert_eq!(config.ai_circuit_breaker.name, "ai");
        assert_eq!(config.email_circuit_breaker.max_requests, 5);
        assert_eq!(config.http_circuit_breaker.error_threshold_percentage, 60.0);
        assert_eq!(config.breakers().len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resilience_config_serialization() {
        let config = ResilienceConfig::default();

        let serialized = serde_json::to_string(&config).expect("Failed to serialize");
        let deserialized: ResilienceConfig =
            serde_json::from_str(&serialized).expect("Failed to deserialize");

        assert_eq!(
            config.ai_circuit_breaker.reset_timeout_ms,
            deserialized.ai_circuit_breaker.reset_timeout_ms
        );
    }

    #[test]
    fn test_retry_config_validation() {
        assert!(RetryConfig::default().validate().is_ok());

        let config = RetryConfig {
            jitter_factor: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RetryConfig {
            base_delay_ms: 10_000,
            max_delay_ms: 1_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
