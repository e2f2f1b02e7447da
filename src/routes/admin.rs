// ============================================================================
// API Key Management Routes
// ============================================================================
//
// Endpoints (scope `admin`):
// - POST /api/admin/keys - Create a key; the plaintext is returned once
// - GET /api/admin/keys - List keys (no hashes)
// - DELETE /api/admin/keys/:id - Revoke a key
//
// ============================================================================

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{generate_api_key, scopes};
use crate::context::AppContext;
use crate::db::api_keys::{self, ApiKeyRecord, NewApiKey};
use crate::error::{AppError, AppResult};
use crate::routes::extractors::{Authenticated, JsonBody};
use crate::utils::validate_length;

const MAX_KEY_LIFETIME_DAYS: i64 = 3650;

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    pub scopes: Vec<String>,
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreatedKey {
    /// Shown once; only the hash is stored
    pub key: String,
    #[serde(flatten)]
    pub record: ApiKeyRecord,
}

/// Validated name, deduplicated scopes and expiry
fn validate_create(
    request: &CreateKeyRequest,
    now: DateTime<Utc>,
) -> AppResult<(String, Vec<String>, Option<DateTime<Utc>>)> {
    validate_length("name", &request.name, 1, 100).map_err(AppError::Validation)?;

    if request.scopes.is_empty() {
        return Err(AppError::validation("scopes must not be empty"));
    }
    if let Some(bad) = request.scopes.iter().find(|s| !scopes::is_valid(s)) {
        return Err(AppError::validation(format!("unknown scope '{}'", bad)));
    }

    let expires_at = match request.expires_in_days {
        None => None,
        Some(days) if (1..=MAX_KEY_LIFETIME_DAYS).contains(&days) => {
            Some(now + Duration::days(days))
        }
        Some(_) => {
            return Err(AppError::validation(format!(
                "expires_in_days must be between 1 and {}",
                MAX_KEY_LIFETIME_DAYS
            )));
        }
    };

    let mut key_scopes = request.scopes.clone();
    key_scopes.sort();
    key_scopes.dedup();

    Ok((request.name.trim().to_string(), key_scopes, expires_at))
}

/// POST /api/admin/keys
pub async fn create_key(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    JsonBody(request): JsonBody<CreateKeyRequest>,
) -> AppResult<(StatusCode, Json<CreatedKey>)> {
    principal.require_scope(scopes::ADMIN)?;
    let (name, key_scopes, expires_at) = validate_create(&request, Utc::now())?;

    let generated = generate_api_key();
    let new_key = NewApiKey {
        name,
        key_prefix: generated.prefix,
        key_hash: generated.hash,
        scopes: key_scopes,
        expires_at,
    };

    let id = ctx
        .db
        .run_write("api_keys.create", |pool| {
            let new_key = &new_key;
            async move { api_keys::create(&pool, new_key).await }
        })
        .await?;
    let record = ctx
        .db
        .run("api_keys.get", |pool| async move { api_keys::get(&pool, id).await })
        .await?
        .ok_or_else(|| AppError::internal("API key missing after insert"))?;

    tracing::info!(
        key_id = record.id,
        key_prefix = %record.key_prefix,
        created_by = %principal.name,
        "API key created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreatedKey {
            key: generated.plaintext,
            record,
        }),
    ))
}

/// GET /api/admin/keys
pub async fn list_keys(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
) -> AppResult<Json<Vec<ApiKeyRecord>>> {
    principal.require_scope(scopes::ADMIN)?;
    let keys = ctx
        .db
        .run("api_keys.list", |pool| async move { api_keys::list(&pool).await })
        .await?;
    Ok(Json(keys))
}

/// DELETE /api/admin/keys/:id
pub async fn revoke_key(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<u64>,
) -> AppResult<StatusCode> {
    principal.require_scope(scopes::ADMIN)?;
    let revoked = ctx
        .db
        .run("api_keys.revoke", |pool| async move {
            api_keys::revoke(&pool, id).await
        })
        .await?;

    if !revoked {
        return Err(AppError::not_found(format!("API key {}", id)));
    }
    tracing::info!(key_id = id, revoked_by = %principal.name, "API key revoked");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(scopes: &[&str], expires_in_days: Option<i64>) -> CreateKeyRequest {
        CreateKeyRequest {
            name: " deploy hook ".into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            expires_in_days,
        }
    }

    #[test]
    fn test_valid_request_is_normalized() {
        let now = Utc::now();
        let (name, scopes, expires_at) =
            validate_create(&request(&["blog:write", "blog:write", "about:write"], Some(30)), now)
                .unwrap();
        assert_eq!(name, "deploy hook");
        assert_eq!(scopes, vec!["about:write", "blog:write"]);
        assert_eq!(expires_at, Some(now + Duration::days(30)));
    }

    #[test]
    fn test_rejects_unknown_scope_and_bad_expiry() {
        let now = Utc::now();
        assert!(validate_create(&request(&["blog:publish"], None), now).is_err());
        assert!(validate_create(&request(&[], None), now).is_err());
        assert!(validate_create(&request(&["*"], Some(0)), now).is_err());
    }
}
