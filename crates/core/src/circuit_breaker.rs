use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{SchedulerError, SchedulerResult};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed - normal operation
    Closed,
    /// Circuit is open - calls fail fast
    Open,
    /// Circuit is half-open - probing whether the service has recovered
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Breaker name used in logs and health reports
    pub name: String,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
    /// Failure percentage (0-100) at which the circuit trips
    pub error_threshold_percentage: f64,
    /// Cool-down before an open circuit lets a probe through, in milliseconds
    pub reset_timeout_ms: u64,
    /// Minimum number of requests before the failure rate is evaluated
    pub max_requests: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            timeout_ms: 30_000,
            error_threshold_percentage: 50.0,
            reset_timeout_ms: 60_000,
            max_requests: 10,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn named<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow::anyhow!("熔断器名称不能为空"));
        }
        if self.timeout_ms == 0 {
            return Err(anyhow::anyhow!("熔断器 {} 的调用超时必须大于0", self.name));
        }
        if !(0.0..=100.0).contains(&self.error_threshold_percentage) {
            return Err(anyhow::anyhow!(
                "熔断器 {} 的错误率阈值必须在0-100之间: {}",
                self.name,
                self.error_threshold_percentage
            ));
        }
        if self.max_requests == 0 {
            return Err(anyhow::anyhow!("熔断器 {} 的最小请求数必须大于0", self.name));
        }
        Ok(())
    }
}

/// Notifications emitted by a breaker
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    Success {
        name: String,
        elapsed: Duration,
    },
    Failure {
        name: String,
        error: String,
        tripped: bool,
    },
    StateChanged {
        name: String,
        from: CircuitState,
        to: CircuitState,
    },
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub request_count: u64,
    pub failure_count: u64,
    pub success_count: u64,
    /// Failure percentage over the current window
    pub error_rate: f64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
    pub uptime_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerHealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerHealth {
    pub name: String,
    pub status: BreakerHealthStatus,
    pub state: CircuitState,
}

impl CircuitBreakerHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == BreakerHealthStatus::Healthy
    }
}

#[derive(Debug)]
struct BreakerWindow {
    state: CircuitState,
    request_count: u64,
    failure_count: u64,
    success_count: u64,
    last_failure_time: Option<DateTime<Utc>>,
    next_attempt: Option<(Instant, DateTime<Utc>)>,
}

impl BreakerWindow {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            request_count: 0,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            next_attempt: None,
        }
    }

    fn error_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.failure_count as f64 / self.request_count as f64 * 100.0
        }
    }

    fn open_until(&mut self, reset_timeout: Duration) {
        self.state = CircuitState::Open;
        let wall = Utc::now()
            + chrono::Duration::from_std(reset_timeout).unwrap_or_else(|_| chrono::Duration::zero());
        self.next_attempt = Some((Instant::now() + reset_timeout, wall));
    }
}

/// Circuit breaker - fails fast once the rolling failure rate crosses the
/// configured threshold and probes for recovery after a cool-down.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    window: Mutex<BreakerWindow>,
    events: broadcast::Sender<CircuitBreakerEvent>,
    created_at: Instant,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    /// Create new circuit breaker with default configuration
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create new circuit breaker with custom configuration
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            window: Mutex::new(BreakerWindow::closed()),
            events,
            created_at: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CircuitBreakerEvent> {
        self.events.subscribe()
    }

    /// Execute operation with circuit breaker protection
    pub async fn execute<F, Fut, T>(&self, operation: F) -> SchedulerResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SchedulerResult<T>>,
    {
        self.admit()?;

        // 调用方在结果返回前丢弃 future 时，由守卫把这次请求记为失败
        let mut pending = PendingCall {
            breaker: self,
            settled: false,
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(self.config.timeout(), operation()).await {
            Ok(result) => result,
            Err(_) => Err(SchedulerError::Timeout(format!(
                "{} 调用超时 ({}ms)",
                self.config.name, self.config.timeout_ms
            ))),
        };

        pending.settled = true;
        match &result {
            Ok(_) => self.record_success(started.elapsed()),
            Err(error) => self.record_failure(&error.to_string()),
        }

        result
    }

    /// 状态更新都是同步的，锁不会跨越 await 持有
    fn lock_window(&self) -> MutexGuard<'_, BreakerWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject while open and cooling down, otherwise count the request
    fn admit(&self) -> SchedulerResult<()> {
        let mut window = self.lock_window();

        if window.state == CircuitState::Open {
            let cooling_down = window
                .next_attempt
                .map(|(at, _)| Instant::now() < at)
                .unwrap_or(false);
            if cooling_down {
                debug!(breaker = %self.config.name, "circuit open, rejecting call");
                return Err(SchedulerError::CircuitOpen {
                    name: self.config.name.clone(),
                });
            }
            window.state = CircuitState::HalfOpen;
            self.notify_state_change(CircuitState::Open, CircuitState::HalfOpen);
        }

        window.request_count += 1;
        Ok(())
    }

    fn record_success(&self, elapsed: Duration) {
        let mut window = self.lock_window();
        window.success_count += 1;

        if window.state == CircuitState::HalfOpen {
            *window = BreakerWindow::closed();
            info!(breaker = %self.config.name, "circuit closed after successful probe");
            self.notify_state_change(CircuitState::HalfOpen, CircuitState::Closed);
        }

        let _ = self.events.send(CircuitBreakerEvent::Success {
            name: self.config.name.clone(),
            elapsed,
        });
    }

    fn record_failure(&self, error: &str) {
        let mut window = self.lock_window();
        window.failure_count += 1;
        window.last_failure_time = Some(Utc::now());

        let previous = window.state;
        let tripped = previous != CircuitState::Open
            && window.request_count >= self.config.max_requests
            && window.error_rate() >= self.config.error_threshold_percentage;

        if tripped {
            window.open_until(self.config.reset_timeout());
            warn!(
                breaker = %self.config.name,
                requests = window.request_count,
                failures = window.failure_count,
                error_rate = window.error_rate(),
                "circuit tripped open"
            );
            self.notify_state_change(previous, CircuitState::Open);
        }

        let _ = self.events.send(CircuitBreakerEvent::Failure {
            name: self.config.name.clone(),
            error: error.to_string(),
            tripped,
        });
    }

    fn notify_state_change(&self, from: CircuitState, to: CircuitState) {
        let _ = self.events.send(CircuitBreakerEvent::StateChanged {
            name: self.config.name.clone(),
            from,
            to,
        });
    }

    /// Force open circuit with a fresh cool-down (operator intervention)
    pub async fn force_open(&self) {
        let mut window = self.lock_window();
        let previous = window.state;
        window.open_until(self.config.reset_timeout());
        warn!(breaker = %self.config.name, "circuit forced open");
        if previous != CircuitState::Open {
            self.notify_state_change(previous, CircuitState::Open);
        }
    }

    /// Force close circuit and zero all counters
    pub async fn force_close(&self) {
        let mut window = self.lock_window();
        let previous = window.state;
        *window = BreakerWindow::closed();
        info!(breaker = %self.config.name, "circuit forced closed");
        if previous != CircuitState::Closed {
            self.notify_state_change(previous, CircuitState::Closed);
        }
    }

    /// Get current circuit state
    pub async fn current_state(&self) -> CircuitState {
        self.lock_window().state
    }

    /// Get a snapshot of counters and timestamps
    pub async fn get_state(&self) -> CircuitBreakerSnapshot {
        let window = self.lock_window();
        CircuitBreakerSnapshot {
            name: self.config.name.clone(),
            state: window.state,
            request_count: window.request_count,
            failure_count: window.failure_count,
            success_count: window.success_count,
            error_rate: window.error_rate(),
            last_failure_time: window.last_failure_time,
            next_attempt_time: window.next_attempt.map(|(_, wall)| wall),
            uptime_ms: self.created_at.elapsed().as_millis() as u64,
        }
    }

    pub async fn get_health(&self) -> CircuitBreakerHealth {
        let state = self.current_state().await;
        CircuitBreakerHealth {
            name: self.config.name.clone(),
            status: if state == CircuitState::Closed {
                BreakerHealthStatus::Healthy
            } else {
                BreakerHealthStatus::Unhealthy
            },
            state,
        }
    }
}

/// Named set of breakers, one per guarded collaborator
/// 已计入请求数但尚未记录结果的调用
struct PendingCall<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(breaker = %self.breaker.config.name, "call cancelled before completion");
            self.breaker.record_failure("调用在完成前被取消");
        }
    }
}

#[derive(Clone, Default)]
pub struct CircuitBreakerRegistry {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs<I>(configs: I) -> Self
    where
        I: IntoIterator<Item = CircuitBreakerConfig>,
    {
        let mut registry = Self::new();
        for config in configs {
            registry.insert(Arc::new(CircuitBreaker::with_config(config)));
        }
        registry
    }

    pub fn insert(&mut self, breaker: Arc<CircuitBreaker>) {
        self.breakers.insert(breaker.name().to_string(), breaker);
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).cloned()
    }

    /// Returns the named breaker, creating one with defaults if absent
    pub fn get_or_default(&mut self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::with_config(CircuitBreakerConfig::named(name))))
            .clone()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn health(&self) -> Vec<CircuitBreakerHealth> {
        let mut report = Vec::with_capacity(self.breakers.len());
        for name in self.names() {
            if let Some(breaker) = self.breakers.get(&name) {
                report.push(breaker.get_health().await);
            }
        }
        report
    }
}
