use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySql, QueryBuilder};
use std::str::FromStr;
use uuid::Uuid;

use super::DbPool;

const COLUMNS: &str =
    "id, email, name, status, unsubscribe_token, subscribed_at, unsubscribed_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    Active,
    Unsubscribed,
}

impl SubscriberStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Unsubscribed => "unsubscribed",
        }
    }
}

impl FromStr for SubscriberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "unsubscribed" => Ok(Self::Unsubscribed),
            other => Err(format!(
                "invalid status '{}', expected one of: active, unsubscribed",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Subscriber {
    pub id: u64,
    pub email: String,
    pub name: Option<String>,
    pub status: String,
    #[serde(skip_serializing)]
    pub unsubscribe_token: String,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

/// Result of a subscribe call, carrying the id of the row it wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Created(u64),
    AlreadyActive,
    Reactivated(u64),
}

impl SubscribeOutcome {
    /// Id of the row written by this call, `None` when nothing changed
    pub fn written_id(self) -> Option<u64> {
        match self {
            SubscribeOutcome::Created(id) | SubscribeOutcome::Reactivated(id) => Some(id),
            SubscribeOutcome::AlreadyActive => None,
        }
    }
}

fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub async fn get_by_id(pool: &DbPool, id: u64) -> Result<Option<Subscriber>, sqlx::Error> {
    sqlx::query_as::<_, Subscriber>(&format!(
        "SELECT {COLUMNS} FROM newsletter_subscribers WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Insert, reactivate or leave untouched, under a row lock on the e-mail.
pub async fn subscribe(
    pool: &DbPool,
    email: &str,
    name: Option<&str>,
) -> Result<SubscribeOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, Subscriber>(&format!(
        "SELECT {COLUMNS} FROM newsletter_subscribers WHERE email = ? FOR UPDATE"
    ))
    .bind(email)
    .fetch_optional(&mut *tx)
    .await?;

    let outcome = match existing {
        Some(subscriber) if subscriber.status == SubscriberStatus::Active.as_str() => {
            tx.rollback().await?;
            return Ok(SubscribeOutcome::AlreadyActive);
        }
        Some(subscriber) => {
            sqlx::query(
                r#"
                UPDATE newsletter_subscribers
                SET status = ?, name = COALESCE(?, name), unsubscribe_token = ?,
                    subscribed_at = ?, unsubscribed_at = NULL
                WHERE id = ?
                "#,
            )
            .bind(SubscriberStatus::Active.as_str())
            .bind(name)
            .bind(new_token())
            .bind(Utc::now())
            .bind(subscriber.id)
            .execute(&mut *tx)
            .await?;
            (subscriber.id, false)
        }
        None => {
            let result = sqlx::query(
                r#"
                INSERT INTO newsletter_subscribers (email, name, status, unsubscribe_token)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(email)
            .bind(name)
            .bind(SubscriberStatus::Active.as_str())
            .bind(new_token())
            .execute(&mut *tx)
            .await?;
            (result.last_insert_id(), true)
        }
    };

    tx.commit().await?;

    let (id, created) = outcome;
    Ok(if created {
        SubscribeOutcome::Created(id)
    } else {
        SubscribeOutcome::Reactivated(id)
    })
}

async fn unsubscribe_where(
    pool: &DbPool,
    column: &'static str,
    value: &str,
) -> Result<bool, sqlx::Error> {
    let id: Option<u64> = sqlx::query_scalar(&format!(
        "SELECT id FROM newsletter_subscribers WHERE {column} = ?"
    ))
    .bind(value)
    .fetch_optional(pool)
    .await?;

    let Some(id) = id else {
        return Ok(false);
    };

    // Already-unsubscribed rows keep their original timestamp
    sqlx::query(
        r#"
        UPDATE newsletter_subscribers
        SET status = ?, unsubscribed_at = COALESCE(unsubscribed_at, ?)
        WHERE id = ?
        "#,
    )
    .bind(SubscriberStatus::Unsubscribed.as_str())
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(true)
}

/// Returns false when no subscriber holds the token
pub async fn unsubscribe_by_token(pool: &DbPool, token: &str) -> Result<bool, sqlx::Error> {
    unsubscribe_where(pool, "unsubscribe_token", token).await
}

pub async fn unsubscribe_by_email(pool: &DbPool, email: &str) -> Result<bool, sqlx::Error> {
    unsubscribe_where(pool, "email", email).await
}

fn push_filters(qb: &mut QueryBuilder<'_, MySql>, status: Option<SubscriberStatus>) {
    if let Some(status) = status {
        qb.push(" WHERE status = ").push_bind(status.as_str());
    }
}

pub async fn list(
    pool: &DbPool,
    status: Option<SubscriberStatus>,
    limit: u32,
    offset: u64,
) -> Result<Vec<Subscriber>, sqlx::Error> {
    let mut qb =
        QueryBuilder::<MySql>::new(format!("SELECT {COLUMNS} FROM newsletter_subscribers"));
    push_filters(&mut qb, status);
    qb.push(" ORDER BY subscribed_at DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    qb.build_query_as::<Subscriber>().fetch_all(pool).await
}

pub async fn count(pool: &DbPool, status: Option<SubscriberStatus>) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM newsletter_subscribers");
    push_filters(&mut qb, status);
    qb.build_query_scalar::<i64>().fetch_one(pool).await
}

pub async fn delete(pool: &DbPool, id: u64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM newsletter_subscribers WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
