use chrono::{DateTime, Utc};

use super::DbPool;

/// Requests logged for one (ip, endpoint) pair inside the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUsage {
    pub count: i64,
    pub oldest: Option<DateTime<Utc>>,
}

pub async fn window_usage(
    pool: &DbPool,
    ip_address: &str,
    endpoint: &str,
    since: DateTime<Utc>,
) -> Result<WindowUsage, sqlx::Error> {
    let (count, oldest): (i64, Option<DateTime<Utc>>) = sqlx::query_as(
        r#"
        SELECT COUNT(*), MIN(created_at)
        FROM rate_limit_log
        WHERE ip_address = ? AND endpoint = ? AND created_at > ?
        "#,
    )
    .bind(ip_address)
    .bind(endpoint)
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(WindowUsage { count, oldest })
}

pub async fn record(
    pool: &DbPool,
    ip_address: &str,
    endpoint: &str,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO rate_limit_log (ip_address, endpoint, created_at) VALUES (?, ?, ?)")
        .bind(ip_address)
        .bind(endpoint)
        .bind(at)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn purge_older_than(pool: &DbPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM rate_limit_log WHERE created_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
