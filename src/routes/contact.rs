// ============================================================================
// Contact Routes
// ============================================================================
//
// Endpoints:
// - POST /api/contact - Public contact form (Contact rate limit class)
// - GET /api/contact - Inbox, newest first (contact:read)
// - GET /api/contact/:id - Single message (contact:read)
// - PUT /api/contact/:id - Change status (contact:write)
// - DELETE /api/contact/:id - Delete (contact:write)
//
// ============================================================================

use axum::{
    Json,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode, header},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::auth::scopes;
use crate::context::AppContext;
use crate::db::contact::{self, ContactMessage, ContactStatus, NewContactMessage};
use crate::error::{AppError, AppResult};
use crate::pagination::{PageParams, Paginated};
use crate::routes::extractors::{Authenticated, JsonBody, QueryParams};
use crate::routes::{non_empty, parse_status};
use crate::utils::{extract_client_ip, is_valid_email, log_safe_id, validate_length};

const MAX_USER_AGENT_LEN: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    /// Honeypot; real visitors never see this field
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContactAccepted {
    pub id: Option<u64>,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

const ACCEPTED_MESSAGE: &str = "Thank you for your message, I'll get back to you soon.";

fn is_spam(request: &ContactRequest) -> bool {
    request
        .website
        .as_deref()
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}

/// Validated, trimmed fields of the form
fn validate_contact(
    request: ContactRequest,
) -> AppResult<(String, String, Option<String>, String)> {
    let name = request.name.trim().to_string();
    validate_length("name", &name, 1, 100).map_err(AppError::Validation)?;

    let email = request.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::validation("email is not a valid e-mail address"));
    }

    let subject = request.subject.and_then(non_empty);
    if let Some(subject) = &subject {
        validate_length("subject", subject, 1, 200).map_err(AppError::Validation)?;
    }

    let message = request.message.trim().to_string();
    validate_length("message", &message, 10, 5000).map_err(AppError::Validation)?;

    Ok((name, email, subject, message))
}

/// POST /api/contact
pub async fn submit(
    State(ctx): State<Arc<AppContext>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<ContactRequest>,
) -> AppResult<(StatusCode, Json<ContactAccepted>)> {
    let client_ip = extract_client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr.ip()));

    if is_spam(&request) {
        tracing::info!(
            ip_hash = %log_safe_id(&client_ip, &ctx.config.logging.hash_salt),
            "Discarded contact form submission from honeypot"
        );
        return Ok((
            StatusCode::CREATED,
            Json(ContactAccepted {
                id: None,
                message: ACCEPTED_MESSAGE,
            }),
        ));
    }

    let (name, email, subject, message) = validate_contact(request)?;
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect::<String>());

    let new_message = NewContactMessage {
        name,
        email,
        subject,
        message,
        ip_address: Some(client_ip),
        user_agent,
    };

    let id = ctx
        .db
        .run_write("contact.create", |pool| {
            let new_message = &new_message;
            async move { contact::create(&pool, new_message).await }
        })
        .await?;

    tracing::info!(message_id = id, "Contact message received");
    Ok((
        StatusCode::CREATED,
        Json(ContactAccepted {
            id: Some(id),
            message: ACCEPTED_MESSAGE,
        }),
    ))
}

/// GET /api/contact
pub async fn list_messages(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    QueryParams(query): QueryParams<ListMessagesQuery>,
) -> AppResult<Json<Paginated<ContactMessage>>> {
    principal.require_scope(scopes::CONTACT_READ)?;
    let status: Option<ContactStatus> = parse_status(query.status)?;
    let params = PageParams::new(query.page, query.limit);

    let (messages, total) = ctx
        .db
        .run("contact.list", |pool| async move {
            let messages = contact::list(&pool, status, params.limit, params.offset()).await?;
            let total = contact::count(&pool, status).await?;
            Ok((messages, total))
        })
        .await?;

    Ok(Json(Paginated::new(messages, params, total)))
}

/// GET /api/contact/:id
pub async fn get_message(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<u64>,
) -> AppResult<Json<ContactMessage>> {
    principal.require_scope(scopes::CONTACT_READ)?;
    let message = ctx
        .db
        .run("contact.get", |pool| async move { contact::get(&pool, id).await })
        .await?
        .ok_or_else(|| AppError::not_found(format!("message {}", id)))?;
    Ok(Json(message))
}

/// PUT /api/contact/:id
pub async fn update_message(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<u64>,
    JsonBody(update): JsonBody<StatusUpdate>,
) -> AppResult<Json<ContactMessage>> {
    principal.require_scope(scopes::CONTACT_WRITE)?;
    let status: ContactStatus = update.status.trim().parse().map_err(AppError::Validation)?;

    let message = ctx
        .db
        .run("contact.update_status", |pool| async move {
            contact::update_status(&pool, id, status).await
        })
        .await?
        .ok_or_else(|| AppError::not_found(format!("message {}", id)))?;

    tracing::debug!(message_id = id, status = %status, "Contact message status changed");
    Ok(Json(message))
}

/// DELETE /api/contact/:id
pub async fn delete_message(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<u64>,
) -> AppResult<StatusCode> {
    principal.require_scope(scopes::CONTACT_WRITE)?;
    let deleted = ctx
        .db
        .run_write("contact.delete", |pool| async move {
            contact::delete(&pool, id).await
        })
        .await?;
    if !deleted {
        return Err(AppError::not_found(format!("message {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(message: &str) -> ContactRequest {
        ContactRequest {
            name: " Grace ".into(),
            email: " Grace@Example.com ".into(),
            subject: Some("   ".into()),
            message: message.into(),
            website: None,
        }
    }

    #[test]
    fn test_valid_form_is_normalized() {
        let (name, email, subject, message) =
            validate_contact(request("  I'd like to hire you.  ")).unwrap();
        assert_eq!(name, "Grace");
        assert_eq!(email, "grace@example.com");
        assert_eq!(subject, None);
        assert_eq!(message, "I'd like to hire you.");
    }

    #[test]
    fn test_short_message_is_rejected() {
        let err = validate_contact(request("hi")).unwrap_err();
        assert!(err.to_string().contains("message"));
    }

    #[test]
    fn test_honeypot() {
        let mut form = request("I'd like to hire you.");
        assert!(!is_spam(&form));
        form.website = Some(" ".into());
        assert!(!is_spam(&form));
        form.website = Some("http://spam.example".into());
        assert!(is_spam(&form));
    }
}
