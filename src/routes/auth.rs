// ============================================================================
// Admin Session Routes
// ============================================================================
//
// Endpoints:
// - POST /api/auth/login - Exchange admin username/password for a session JWT
//
// ============================================================================

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::routes::extractors::JsonBody;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// POST /api/auth/login
pub async fn login(
    State(ctx): State<Arc<AppContext>>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let auth = &ctx.auth_manager;
    if !auth.login_enabled() {
        return Err(AppError::not_found("admin login is not configured"));
    }

    if request.username.is_empty() || request.password.is_empty() {
        return Err(AppError::validation("username and password are required"));
    }

    if !auth
        .verify_admin_login(&request.username, &request.password)
        .await?
    {
        return Err(AppError::auth("invalid username or password"));
    }

    let (token, expires_at) = auth.create_session_token(&request.username)?;
    tracing::info!(expires_at = %expires_at, "Admin session issued");

    Ok(Json(LoginResponse { token, expires_at }))
}
