// ============================================================================
// Newsletter Routes
// ============================================================================
//
// Endpoints:
// - POST /api/newsletter - Subscribe (Newsletter rate limit class)
// - POST /api/newsletter/unsubscribe - Unsubscribe by token or e-mail
// - GET /api/newsletter - Subscribers (newsletter:read)
// - DELETE /api/newsletter/:id - Hard delete (newsletter:write)
//
// ============================================================================

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::scopes;
use crate::context::AppContext;
use crate::db::newsletter::{self, SubscribeOutcome, Subscriber, SubscriberStatus};
use crate::error::{AppError, AppResult};
use crate::pagination::{PageParams, Paginated};
use crate::routes::extractors::{Authenticated, JsonBody, QueryParams};
use crate::routes::{non_empty, parse_status};
use crate::utils::{is_valid_email, log_safe_id, validate_length};

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub token: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NewsletterResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<Subscriber>,
}

#[derive(Debug, Deserialize)]
pub struct ListSubscribersQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::validation("email is not a valid e-mail address"));
    }
    Ok(email)
}

enum UnsubscribeBy {
    Token(String),
    Email(String),
}

fn unsubscribe_target(request: UnsubscribeRequest) -> AppResult<UnsubscribeBy> {
    if let Some(token) = request.token.and_then(non_empty) {
        return Ok(UnsubscribeBy::Token(token));
    }
    match request.email.and_then(non_empty) {
        Some(email) => Ok(UnsubscribeBy::Email(normalize_email(&email)?)),
        None => Err(AppError::validation("token or email is required")),
    }
}

/// POST /api/newsletter
pub async fn subscribe(
    State(ctx): State<Arc<AppContext>>,
    JsonBody(request): JsonBody<SubscribeRequest>,
) -> AppResult<(StatusCode, Json<NewsletterResponse>)> {
    let email = normalize_email(&request.email)?;
    let name = request.name.and_then(non_empty);
    if let Some(name) = &name {
        validate_length("name", name, 1, 100).map_err(AppError::Validation)?;
    }

    let outcome = ctx
        .db
        .run_write("newsletter.subscribe", |pool| {
            let email = email.as_str();
            let name = name.as_deref();
            async move { newsletter::subscribe(&pool, email, name).await }
        })
        .await?;

    let email_hash = log_safe_id(&email, &ctx.config.logging.hash_salt);
    match outcome {
        SubscribeOutcome::Created(_) => {
            tracing::info!(email_hash = %email_hash, "Newsletter subscription created")
        }
        SubscribeOutcome::Reactivated(_) => {
            tracing::info!(email_hash = %email_hash, "Newsletter subscription reactivated")
        }
        SubscribeOutcome::AlreadyActive => {
            tracing::debug!(email_hash = %email_hash, "Newsletter subscription already active")
        }
    }

    // Only the caller's own write is echoed back; an existing record stays private
    let subscriber = match outcome.written_id() {
        Some(id) => Some(
            ctx.db
                .run("newsletter.get", |pool| async move {
                    newsletter::get_by_id(&pool, id).await
                })
                .await?
                .ok_or_else(|| AppError::internal("subscriber missing after write"))?,
        ),
        None => None,
    };

    let (status, message) = subscribe_reply(outcome);
    Ok((status, Json(NewsletterResponse { message, subscriber })))
}

fn subscribe_reply(outcome: SubscribeOutcome) -> (StatusCode, &'static str) {
    match outcome {
        SubscribeOutcome::Created(_) => (StatusCode::CREATED, "Subscribed successfully"),
        SubscribeOutcome::Reactivated(_) => (
            StatusCode::OK,
            "Welcome back, your subscription is active again",
        ),
        SubscribeOutcome::AlreadyActive => (StatusCode::OK, "Already subscribed"),
    }
}

/// POST /api/newsletter/unsubscribe
pub async fn unsubscribe(
    State(ctx): State<Arc<AppContext>>,
    JsonBody(request): JsonBody<UnsubscribeRequest>,
) -> AppResult<Json<NewsletterResponse>> {
    let found = match unsubscribe_target(request)? {
        UnsubscribeBy::Token(token) => {
            ctx.db
                .run("newsletter.unsubscribe_by_token", |pool| {
                    let token = token.as_str();
                    async move { newsletter::unsubscribe_by_token(&pool, token).await }
                })
                .await?
        }
        UnsubscribeBy::Email(email) => {
            ctx.db
                .run("newsletter.unsubscribe_by_email", |pool| {
                    let email = email.as_str();
                    async move { newsletter::unsubscribe_by_email(&pool, email).await }
                })
                .await?
        }
    };

    if !found {
        return Err(AppError::not_found("subscription"));
    }

    tracing::info!("Newsletter subscription cancelled");
    Ok(Json(NewsletterResponse {
        message: "Unsubscribed successfully",
        subscriber: None,
    }))
}

/// GET /api/newsletter
pub async fn list_subscribers(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    QueryParams(query): QueryParams<ListSubscribersQuery>,
) -> AppResult<Json<Paginated<Subscriber>>> {
    principal.require_scope(scopes::NEWSLETTER_READ)?;
    let status: Option<SubscriberStatus> = parse_status(query.status)?;
    let params = PageParams::new(query.page, query.limit);

    let (subscribers, total) = ctx
        .db
        .run("newsletter.list", |pool| async move {
            let subscribers =
                newsletter::list(&pool, status, params.limit, params.offset()).await?;
            let total = newsletter::count(&pool, status).await?;
            Ok((subscribers, total))
        })
        .await?;

    Ok(Json(Paginated::new(subscribers, params, total)))
}

/// DELETE /api/newsletter/:id
pub async fn delete_subscriber(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<u64>,
) -> AppResult<StatusCode> {
    principal.require_scope(scopes::NEWSLETTER_WRITE)?;
    let deleted = ctx
        .db
        .run_write("newsletter.delete", |pool| async move {
            newsletter::delete(&pool, id).await
        })
        .await?;
    if !deleted {
        return Err(AppError::not_found(format!("subscriber {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_is_normalized() {
        assert_eq!(
            normalize_email("  Reader@Example.COM ").unwrap(),
            "reader@example.com"
        );
        assert!(normalize_email("reader@").is_err());
    }

    #[test]
    fn test_token_wins_over_email() {
        let target = unsubscribe_target(UnsubscribeRequest {
            token: Some("abc123".into()),
            email: Some("reader@example.com".into()),
        })
        .unwrap();
        assert!(matches!(target, UnsubscribeBy::Token(t) if t == "abc123"));

        let target = unsubscribe_target(UnsubscribeRequest {
            token: Some("  ".into()),
            email: Some("Reader@Example.com".into()),
        })
        .unwrap();
        assert!(matches!(target, UnsubscribeBy::Email(e) if e == "reader@example.com"));
    }

    #[test]
    fn test_already_active_reveals_nothing() {
        let outcome = SubscribeOutcome::AlreadyActive;
        assert_eq!(outcome.written_id(), None);
        assert_eq!(subscribe_reply(outcome), (StatusCode::OK, "Already subscribed"));

        assert_eq!(SubscribeOutcome::Created(7).written_id(), Some(7));
        assert_eq!(subscribe_reply(SubscribeOutcome::Created(7)).0, StatusCode::CREATED);
        assert_eq!(SubscribeOutcome::Reactivated(9).written_id(), Some(9));
    }

    #[test]
    fn test_unsubscribe_needs_a_target() {
        let result = unsubscribe_target(UnsubscribeRequest {
            token: None,
            email: None,
        });
        assert!(result.is_err());
    }
}
