// ============================================================================
// Health and Metrics Routes
// ============================================================================
//
// Endpoints:
// - GET /health - Database round trip plus pool statistics
// - GET /health/live - Process liveness
// - GET /metrics - Prometheus metrics
//
// ============================================================================

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use std::sync::Arc;

use crate::context::AppContext;
use crate::error::AppError;
use crate::metrics;

/// GET /health
pub async fn health_check(State(app_context): State<Arc<AppContext>>) -> impl IntoResponse {
    let ping = app_context
        .db
        .run("health.ping", |pool| async move {
            sqlx::query("SELECT 1").execute(&pool).await.map(|_| ())
        })
        .await;
    let stats = app_context.db.stats().await;

    let (status, label) = match ping {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };

    (status, Json(json!({ "status": label, "database": stats })))
}

/// GET /health/live
pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// GET /metrics
/// Prometheus metrics endpoint
pub async fn metrics() -> Result<impl IntoResponse, AppError> {
    let metrics_data = metrics::gather_metrics()?;
    Ok((
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics_data,
    ))
}
