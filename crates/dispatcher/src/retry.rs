//! 传输层重试
//!
//! 指数退避 + 随机抖动，供协作者包装单次外部调用使用。
//! 与调度器的任务级重试（固定间隔）相互独立，分别配置。

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use digest_scheduler_core::{RetryConfig, SchedulerResult};

/// 计算第 `retry_count` 次重试（从0开始）前的等待时间
pub fn calculate_backoff(config: &RetryConfig, retry_count: u32) -> Duration {
    let base_interval = config.base_delay_ms as f64;
    let max_interval = config.max_delay_ms as f64;

    // 计算指数退避间隔
    let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
    let exponential_interval = base_interval * config.backoff_multiplier.powi(exponent);

    // 限制最大间隔
    let capped_interval = exponential_interval.min(max_interval);

    // 添加随机抖动以避免雷群效应
    let jitter = capped_interval * config.jitter_factor * (rand::random::<f64>() - 0.5) * 2.0;
    let final_interval = (capped_interval + jitter).max(base_interval);

    Duration::from_millis(final_interval as u64)
}

/// 按退避策略重试操作，熔断器打开等不可重试的错误会立即返回
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    op_name: &str,
    mut operation: F,
) -> SchedulerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SchedulerResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = op_name, attempt, "重试后调用成功");
                }
                return Ok(value);
            }
            Err(error) if attempt < max_attempts && error.is_retryable() => {
                let delay = calculate_backoff(config, attempt - 1);
                warn!(
                    operation = op_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "调用失败，准备重试"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                if attempt > 1 {
                    warn!(operation = op_name, attempt, error = %error, "重试次数已用尽");
                }
                return Err(error);
            }
        }
    }
}
