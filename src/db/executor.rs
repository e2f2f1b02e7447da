// ============================================================================
// Query Executor
// ============================================================================
//
// Every database call goes through `QueryExecutor::execute`:
// - circuit breaker gate (fail fast while the database is down)
// - per-attempt timeout
// - retry with exponential backoff for transient errors
// - query/slow-query/failure accounting
//
// ============================================================================

use rand::Rng;
use serde::Serialize;
use sqlx::mysql::MySqlDatabaseError;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use super::DbPool;
use crate::config::DbConfig;
use crate::metrics;

// MySQL server error numbers
const ER_ACCESS_DENIED_ERROR: u16 = 1045;
const ER_BAD_DB_ERROR: u16 = 1049;
const ER_DUP_ENTRY: u16 = 1062;
const ER_PARSE_ERROR: u16 = 1064;
const ER_NO_SUCH_TABLE: u16 = 1146;
const ER_WARN_DATA_OUT_OF_RANGE: u16 = 1264;
const ER_DATA_TOO_LONG: u16 = 1406;

/// How a failed query should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient (lost connection, pool timeout, deadlock): retry with backoff
    Retryable,
    /// Misconfiguration or broken SQL: retrying cannot help
    NonRetryable,
    /// The database answered; the request itself was wrong (duplicate key, no row)
    Client,
}

/// Classifies a MySQL server error number.
pub fn classify_mysql_code(number: u16) -> ErrorClass {
    match number {
        ER_BAD_DB_ERROR | ER_ACCESS_DENIED_ERROR | ER_PARSE_ERROR | ER_NO_SUCH_TABLE => {
            ErrorClass::NonRetryable
        }
        ER_DUP_ENTRY | ER_DATA_TOO_LONG | ER_WARN_DATA_OUT_OF_RANGE => ErrorClass::Client,
        _ => ErrorClass::Retryable,
    }
}

fn mysql_error_number(err: &sqlx::Error) -> Option<u16> {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(|e| e.number()),
        _ => None,
    }
}

pub fn classify_error(err: &sqlx::Error) -> ErrorClass {
    match err {
        sqlx::Error::Database(db_err) => match mysql_error_number(err) {
            Some(number) => classify_mysql_code(number),
            None if db_err.is_unique_violation() => ErrorClass::Client,
            None => ErrorClass::Retryable,
        },
        sqlx::Error::RowNotFound
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_) => ErrorClass::Client,
        sqlx::Error::Configuration(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::TypeNotFound { .. } => ErrorClass::NonRetryable,
        _ => ErrorClass::Retryable,
    }
}

/// Non-retryable errors that still mean the database is unusable from here.
fn counts_against_breaker(err: &sqlx::Error) -> bool {
    match classify_error(err) {
        ErrorClass::Retryable => true,
        ErrorClass::Client => false,
        ErrorClass::NonRetryable => matches!(
            mysql_error_number(err),
            Some(ER_BAD_DB_ERROR | ER_ACCESS_DENIED_ERROR)
        ) || matches!(err, sqlx::Error::Configuration(_)),
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || mysql_error_number(err) == Some(ER_DUP_ENTRY)
        }
        _ => false,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database circuit breaker open (retry in {retry_in:?})")]
    CircuitOpen { retry_in: Duration },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("{operation} failed: {source}")]
    Query {
        operation: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Exponential backoff schedule
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DbConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Pool construction at startup and on reconnect: fewer, slower attempts.
    pub fn startup(config: &DbConfig) -> Self {
        Self {
            max_retries: config.reconnect_max_attempts.saturating_sub(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms.max(500)),
            max_delay: Duration::from_millis(config.retry_max_delay_ms.max(1000)),
        }
    }

    /// `base * 2^(attempt-1)`, capped at `max_delay`. `attempt` starts at 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }

    /// `delay_for` plus up to 10% random jitter.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        let jitter_ms = (delay.as_millis() as u64) / 10;
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Retry an operation with exponential backoff while `should_retry` allows it.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    operation: &str,
    policy: &RetryPolicy,
    should_retry: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt <= policy.max_retries && should_retry(&e) => {
                let delay = policy.jittered_delay(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, will retry"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(operation, attempt, error = %e, "Operation failed, giving up");
                return Err(e);
            }
        }
    }
}

/// Usage counters shared with the pool manager
#[derive(Debug, Default)]
pub struct QueryStats {
    total_queries: AtomicU64,
    failed_queries: AtomicU64,
    slow_queries: AtomicU64,
    reconnects: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct QueryStatsSnapshot {
    pub total_queries: u64,
    pub failed_queries: u64,
    pub slow_queries: u64,
    pub reconnects: u64,
}

impl QueryStats {
    fn record_attempt(&self, operation: &str, elapsed: Duration, slow_threshold: Duration) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        metrics::DB_QUERIES_TOTAL.inc();
        metrics::DB_QUERY_DURATION.observe(elapsed.as_secs_f64());

        if elapsed > slow_threshold {
            self.slow_queries.fetch_add(1, Ordering::Relaxed);
            metrics::DB_SLOW_QUERIES_TOTAL.inc();
            tracing::warn!(
                operation,
                duration_ms = elapsed.as_millis() as u64,
                threshold_ms = slow_threshold.as_millis() as u64,
                "Slow query"
            );
        }
    }

    fn record_failure(&self) {
        self.failed_queries.fetch_add(1, Ordering::Relaxed);
        metrics::DB_QUERY_FAILURES_TOTAL.inc();
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        metrics::DB_RECONNECTS_TOTAL.inc();
    }

    pub fn snapshot(&self) -> QueryStatsSnapshot {
        QueryStatsSnapshot {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            slow_queries: self.slow_queries.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

enum AttemptFailure {
    Timeout,
    Query(sqlx::Error),
}

/// Whether an operation may be re-run after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// Reads and idempotent updates: any retryable failure is retried
    Idempotent,
    /// Inserts and deletes: only retried when no connection was acquired,
    /// since any later failure may follow a commit
    NonIdempotent,
}

impl RetryMode {
    fn allows(self, failure: &AttemptFailure) -> bool {
        match self {
            RetryMode::Idempotent => true,
            RetryMode::NonIdempotent => matches!(
                failure,
                AttemptFailure::Query(sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed)
            ),
        }
    }
}

pub struct QueryExecutor {
    breaker: CircuitBreaker,
    policy: RetryPolicy,
    query_timeout: Duration,
    slow_threshold: Duration,
    stats: QueryStats,
}

impl QueryExecutor {
    pub fn new(
        breaker: CircuitBreaker,
        policy: RetryPolicy,
        query_timeout: Duration,
        slow_threshold: Duration,
    ) -> Self {
        Self {
            breaker,
            policy,
            query_timeout,
            slow_threshold,
            stats: QueryStats::default(),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }

    /// Run `f` against the current pool with breaker, timeout and retry.
    ///
    /// The pool is re-read on every attempt so a reconnect performed by the
    /// health monitor is picked up by in-flight retries.
    pub async fn execute<T, F, Fut>(
        &self,
        pool: &RwLock<DbPool>,
        operation: &str,
        f: F,
    ) -> Result<T, DbError>
    where
        F: FnMut(DbPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        self.execute_with(pool, operation, RetryMode::Idempotent, f)
            .await
    }

    /// Like `execute`, but `f` is never re-run once it may have reached the
    /// server. `f` should only write; read the row back with `execute`.
    pub async fn execute_write<T, F, Fut>(
        &self,
        pool: &RwLock<DbPool>,
        operation: &str,
        f: F,
    ) -> Result<T, DbError>
    where
        F: FnMut(DbPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        self.execute_with(pool, operation, RetryMode::NonIdempotent, f)
            .await
    }

    pub async fn execute_with<T, F, Fut>(
        &self,
        pool: &RwLock<DbPool>,
        operation: &str,
        mode: RetryMode,
        mut f: F,
    ) -> Result<T, DbError>
    where
        F: FnMut(DbPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;

            if let Err(CircuitBreakerError::Open { retry_in }) = self.breaker.allow_request().await {
                tracing::debug!(operation, "Query rejected by open circuit breaker");
                return Err(DbError::CircuitOpen { retry_in });
            }

            let current_pool = pool.read().await.clone();
            let started = Instant::now();
            let outcome = tokio::time::timeout(self.query_timeout, f(current_pool)).await;
            self.stats
                .record_attempt(operation, started.elapsed(), self.slow_threshold);

            let failure = match outcome {
                Ok(Ok(value)) => {
                    self.breaker.record_success().await;
                    return Ok(value);
                }
                Ok(Err(err)) => match classify_error(&err) {
                    ErrorClass::Retryable => {
                        self.breaker.record_failure().await;
                        AttemptFailure::Query(err)
                    }
                    class => {
                        if counts_against_breaker(&err) {
                            self.breaker.record_failure().await;
                        } else {
                            self.breaker.record_success().await;
                        }
                        if class == ErrorClass::NonRetryable {
                            self.stats.record_failure();
                            tracing::error!(operation, error = %err, "Non-retryable database error");
                        }
                        return Err(DbError::Query {
                            operation: operation.to_string(),
                            source: err,
                        });
                    }
                },
                Err(_elapsed) => {
                    self.breaker.record_failure().await;
                    AttemptFailure::Timeout
                }
            };

            self.stats.record_failure();

            if attempt > self.policy.max_retries || !mode.allows(&failure) {
                tracing::error!(operation, attempts = attempt, "Query failed after retries");
                return Err(match failure {
                    AttemptFailure::Timeout => DbError::Timeout {
                        operation: operation.to_string(),
                        timeout: self.query_timeout,
                    },
                    AttemptFailure::Query(source) => DbError::Query {
                        operation: operation.to_string(),
                        source,
                    },
                });
            }

            let delay = self.policy.jittered_delay(attempt);
            match &failure {
                AttemptFailure::Timeout => tracing::warn!(
                    operation,
                    attempt,
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    delay_ms = delay.as_millis() as u64,
                    "Query timed out, will retry"
                ),
                AttemptFailure::Query(err) => tracing::warn!(
                    operation,
                    attempt,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Query failed, will retry"
                ),
            }
            tokio::time::sleep(delay).await;
        }
    }
}
