use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySql, QueryBuilder};
use std::fmt;
use std::str::FromStr;

use super::DbPool;

const COLUMNS: &str =
    "id, name, email, subject, message, status, ip_address, user_agent, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    New,
    Read,
    Replied,
    Archived,
}

impl ContactStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Read => "read",
            Self::Replied => "replied",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "read" => Ok(Self::Read),
            "replied" => Ok(Self::Replied),
            "archived" => Ok(Self::Archived),
            other => Err(format!(
                "invalid status '{}', expected one of: new, read, replied, archived",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ContactMessage {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub status: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewContactMessage {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

fn push_filters(qb: &mut QueryBuilder<'_, MySql>, status: Option<ContactStatus>) {
    if let Some(status) = status {
        qb.push(" WHERE status = ").push_bind(status.as_str());
    }
}

pub async fn create(pool: &DbPool, msg: &NewContactMessage) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO contact_messages (name, email, subject, message, status, ip_address, user_agent)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&msg.name)
    .bind(&msg.email)
    .bind(&msg.subject)
    .bind(&msg.message)
    .bind(ContactStatus::New.as_str())
    .bind(&msg.ip_address)
    .bind(&msg.user_agent)
    .execute(pool)
    .await?;

    Ok(result.last_insert_id())
}

pub async fn list(
    pool: &DbPool,
    status: Option<ContactStatus>,
    limit: u32,
    offset: u64,
) -> Result<Vec<ContactMessage>, sqlx::Error> {
    let mut qb = QueryBuilder::<MySql>::new(format!("SELECT {COLUMNS} FROM contact_messages"));
    push_filters(&mut qb, status);
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    qb.build_query_as::<ContactMessage>().fetch_all(pool).await
}

pub async fn count(pool: &DbPool, status: Option<ContactStatus>) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM contact_messages");
    push_filters(&mut qb, status);
    qb.build_query_scalar::<i64>().fetch_one(pool).await
}

pub async fn get(pool: &DbPool, id: u64) -> Result<Option<ContactMessage>, sqlx::Error> {
    sqlx::query_as::<_, ContactMessage>(&format!(
        "SELECT {COLUMNS} FROM contact_messages WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn update_status(
    pool: &DbPool,
    id: u64,
    status: ContactStatus,
) -> Result<Option<ContactMessage>, sqlx::Error> {
    sqlx::query(
        "UPDATE contact_messages SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(id)
    .execute(pool)
    .await?;

    get(pool, id).await
}

pub async fn delete(pool: &DbPool, id: u64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM contact_messages WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!("replied".parse::<ContactStatus>(), Ok(ContactStatus::Replied));
        assert!("spam".parse::<ContactStatus>().is_err());
        assert_eq!(ContactStatus::Archived.to_string(), "archived");
    }
}
