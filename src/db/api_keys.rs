use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;

use super::DbPool;

const COLUMNS: &str =
    "id, name, key_prefix, scopes, is_active, expires_at, last_used_at, created_at";

/// Stored API key metadata. The hash never leaves the database layer.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ApiKeyRecord {
    pub id: u64,
    pub name: String,
    pub key_prefix: String,
    pub scopes: Json<Vec<String>>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub name: String,
    pub key_prefix: String,
    pub key_hash: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Active, unexpired key with the given SHA-256 hex hash
pub async fn find_active_by_hash(
    pool: &DbPool,
    key_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<ApiKeyRecord>, sqlx::Error> {
    sqlx::query_as::<_, ApiKeyRecord>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM api_keys
        WHERE key_hash = ? AND is_active = TRUE AND (expires_at IS NULL OR expires_at > ?)
        "#
    ))
    .bind(key_hash)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub async fn touch_last_used(pool: &DbPool, id: u64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn create(pool: &DbPool, key: &NewApiKey) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO api_keys (name, key_prefix, key_hash, scopes, expires_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&key.name)
    .bind(&key.key_prefix)
    .bind(&key.key_hash)
    .bind(Json(&key.scopes))
    .bind(key.expires_at)
    .execute(pool)
    .await?;

    Ok(result.last_insert_id())
}

pub async fn get(pool: &DbPool, id: u64) -> Result<Option<ApiKeyRecord>, sqlx::Error> {
    sqlx::query_as::<_, ApiKeyRecord>(&format!("SELECT {COLUMNS} FROM api_keys WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list(pool: &DbPool) -> Result<Vec<ApiKeyRecord>, sqlx::Error> {
    sqlx::query_as::<_, ApiKeyRecord>(&format!(
        "SELECT {COLUMNS} FROM api_keys ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(pool)
    .await
}

/// Returns false when the key does not exist
pub async fn revoke(pool: &DbPool, id: u64) -> Result<bool, sqlx::Error> {
    let exists: Option<u64> = sqlx::query_scalar("SELECT id FROM api_keys WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Ok(false);
    }

    sqlx::query("UPDATE api_keys SET is_active = FALSE WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(true)
}
