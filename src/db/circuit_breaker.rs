// ============================================================================
// Circuit Breaker for database access
// ============================================================================
//
// Prevents cascading failures when MySQL is slow or unreachable: instead of
// every request waiting out its own acquire/query timeout, the breaker fails
// fast once the database has proven unhealthy and tests for recovery after
// a cooldown.
//
// States:
// - Closed: Normal operation, requests pass through
// - Open: Database is failing, requests are rejected immediately
// - Half-Open: Cooldown elapsed, a trial request checks for recovery
//
// ============================================================================

use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::CircuitBreakerConfig;
use crate::metrics;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

impl CircuitState {
    fn gauge_value(self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::HalfOpen => write!(f, "half_open"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Circuit breaker error
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError {
    #[error("Circuit breaker is open - database unavailable (retry in {retry_in:?})")]
    Open { retry_in: Duration },
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

/// Three-state circuit breaker guarding the connection pool
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Check if a request should be allowed
    ///
    /// An open circuit whose reset timeout has elapsed moves to half-open and
    /// lets the request through as a trial.
    pub async fn allow_request(&self) -> Result<(), CircuitBreakerError> {
        {
            let inner = self.inner.read().await;
            match inner.state {
                CircuitState::Closed | CircuitState::HalfOpen => return Ok(()),
                CircuitState::Open => {}
            }
        }

        let mut inner = self.inner.write().await;
        // Re-check: another task may have transitioned while we waited for the lock
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = inner
            .opened_at
            .map(|opened| opened.elapsed())
            .unwrap_or(self.config.reset_timeout);

        if elapsed >= self.config.reset_timeout {
            inner.state = CircuitState::HalfOpen;
            inner.half_open_successes = 0;
            metrics::CIRCUIT_BREAKER_STATE.set(CircuitState::HalfOpen.gauge_value());
            tracing::info!(
                elapsed_seconds = elapsed.as_secs(),
                "Circuit breaker transitioning to half-open"
            );
            Ok(())
        } else {
            Err(CircuitBreakerError::Open {
                retry_in: self.config.reset_timeout - elapsed,
            })
        }
    }

    /// Record a successful request
    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.half_open_successes = 0;
                    inner.opened_at = None;
                    metrics::CIRCUIT_BREAKER_STATE.set(CircuitState::Closed.gauge_value());
                    tracing::info!("Circuit breaker CLOSED - database recovered");
                } else {
                    tracing::info!(
                        successes = inner.half_open_successes,
                        needed = self.config.success_threshold,
                        "Circuit breaker half-open - success recorded"
                    );
                }
            }
            // A request admitted before the circuit opened finished late
            CircuitState::Open => {}
        }
    }

    /// Record a failed request
    pub async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    metrics::CIRCUIT_BREAKER_STATE.set(CircuitState::Open.gauge_value());
                    tracing::error!(
                        failures = inner.failure_count,
                        threshold = self.config.failure_threshold,
                        reset_timeout_seconds = self.config.reset_timeout.as_secs(),
                        "Circuit breaker OPENED - too many database failures"
                    );
                } else {
                    tracing::warn!(
                        failures = inner.failure_count,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker failure recorded"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Any failure while probing reopens immediately
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_successes = 0;
                metrics::CIRCUIT_BREAKER_STATE.set(CircuitState::Open.gauge_value());
                tracing::warn!("Circuit breaker reopened after failure in half-open state");
            }
            CircuitState::Open => {
                inner.failure_count += 1;
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    pub async fn failure_count(&self) -> u32 {
        self.inner.read().await.failure_count
    }

    /// Force circuit to open (manual intervention, tests)
    pub async fn force_open(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Open;
        inner.failure_count = self.config.failure_threshold;
        inner.opened_at = Some(Instant::now());
        metrics::CIRCUIT_BREAKER_STATE.set(CircuitState::Open.gauge_value());
        tracing::warn!("Circuit breaker manually OPENED");
    }

    /// Force circuit to close (manual recovery, tests)
    pub async fn force_close(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.half_open_successes = 0;
        inner.opened_at = None;
        metrics::CIRCUIT_BREAKER_STATE.set(CircuitState::Closed.gauge_value());
        tracing::info!("Circuit breaker manually CLOSED");
    }
}
