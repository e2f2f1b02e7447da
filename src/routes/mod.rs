// ============================================================================
// Axum Routes Module
// ============================================================================
//
// Structure:
// - mod.rs: Router assembly, middleware stack, shared input helpers
// - health.rs: Health check and metrics endpoints
// - auth.rs: Admin login (session JWT)
// - admin.rs: API key management
// - blog.rs, projects.rs, about.rs: Portfolio content
// - contact.rs, newsletter.rs: Public forms and their admin views
// - appointments.rs: Availability, booking, slot management
// - extractors.rs: Authenticated / OptionalAuth, JSON and query extractors
// - middleware.rs: Request logging, security headers, rate limiting, caching
//
// ============================================================================

mod about;
mod admin;
mod appointments;
mod auth;
mod blog;
mod contact;
mod extractors;
mod health;
mod middleware;
mod newsletter;
mod projects;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::auth::API_KEY_HEADER;
use crate::config::Config;
use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::rate_limit::{HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET};
use crate::utils::{is_http_url, validate_length};

pub use middleware::REQUEST_ID_HEADER;

const MAX_TAGS: usize = 20;
const MAX_TAG_LEN: usize = 50;
/// Matches the VARCHAR(2048) URL columns
pub(crate) const MAX_URL_LEN: usize = 2048;

/// Create the main application router with all routes
pub fn create_router(app_context: Arc<AppContext>) -> Router {
    // Anonymous GETs here may be cached by the CDN
    let content = Router::new()
        .route("/api/blog", get(blog::list_posts).post(blog::create_post))
        .route(
            "/api/blog/:key",
            get(blog::get_post)
                .put(blog::update_post)
                .delete(blog::delete_post),
        )
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/:key",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/api/about", get(about::get_about).put(about::put_about))
        .route(
            "/api/appointments/availability",
            get(appointments::get_availability),
        )
        .layer(from_fn_with_state(
            app_context.clone(),
            middleware::public_cache,
        ));

    let api = Router::new()
        .route("/api/auth/login", post(auth::login))
        .route(
            "/api/admin/keys",
            get(admin::list_keys).post(admin::create_key),
        )
        .route("/api/admin/keys/:id", axum::routing::delete(admin::revoke_key))
        .route(
            "/api/contact",
            get(contact::list_messages).post(contact::submit),
        )
        .route(
            "/api/contact/:id",
            get(contact::get_message)
                .put(contact::update_message)
                .delete(contact::delete_message),
        )
        .route(
            "/api/newsletter",
            get(newsletter::list_subscribers).post(newsletter::subscribe),
        )
        .route("/api/newsletter/unsubscribe", post(newsletter::unsubscribe))
        .route(
            "/api/newsletter/:id",
            axum::routing::delete(newsletter::delete_subscriber),
        )
        .route(
            "/api/appointments",
            get(appointments::list_appointments).post(appointments::book),
        )
        .route(
            "/api/appointments/slots",
            get(appointments::list_slots).post(appointments::create_slot),
        )
        .route(
            "/api/appointments/slots/:id",
            put(appointments::update_slot).delete(appointments::delete_slot),
        )
        .route(
            "/api/appointments/:id",
            get(appointments::get_appointment)
                .put(appointments::update_appointment)
                .delete(appointments::delete_appointment),
        )
        .merge(content)
        .layer(from_fn_with_state(
            app_context.clone(),
            middleware::rate_limiting,
        ));

    Router::new()
        // Health and monitoring (not rate limited)
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness))
        .route("/metrics", get(health::metrics))
        .merge(api)
        .fallback(not_found)
        // Apply middleware (order matters - first added here runs first)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&app_context.config))
                .layer(from_fn(middleware::request_logging))
                .layer(from_fn(middleware::add_security_headers))
                .layer(RequestBodyLimitLayer::new(
                    app_context.config.max_request_body_bytes,
                ))
                .into_inner(),
        )
        .with_state(app_context)
}

async fn not_found() -> AppError {
    AppError::not_found("route")
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins = if config.cors_allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        let list: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring malformed CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(list)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static(HEADER_LIMIT),
            HeaderName::from_static(HEADER_REMAINING),
            HeaderName::from_static(HEADER_RESET),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .max_age(Duration::from_secs(3600))
}

// ============================================================================
// Input helpers shared by the handlers
// ============================================================================

/// Trimmed value, `None` when blank
pub(crate) fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Trims each tag, drops duplicates and enforces the count and length limits.
pub(crate) fn validate_tags(tags: Vec<String>) -> AppResult<Vec<String>> {
    let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        validate_length("tag", &tag, 1, MAX_TAG_LEN).map_err(AppError::Validation)?;
        if !cleaned.contains(&tag) {
            cleaned.push(tag);
        }
    }
    if cleaned.len() > MAX_TAGS {
        return Err(AppError::validation(format!(
            "at most {} tags are allowed",
            MAX_TAGS
        )));
    }
    Ok(cleaned)
}

pub(crate) fn validate_url(field: &str, value: Option<&str>) -> AppResult<()> {
    match value {
        Some(url) if !is_http_url(url) => Err(AppError::validation(format!(
            "{} must start with http:// or https://",
            field
        ))),
        Some(url) if url.chars().count() > MAX_URL_LEN => Err(AppError::validation(format!(
            "{} must not exceed {} characters",
            field, MAX_URL_LEN
        ))),
        _ => Ok(()),
    }
}

/// Optional `?status=` filter; blank means no filter.
pub(crate) fn parse_status<T>(value: Option<String>) -> AppResult<Option<T>>
where
    T: FromStr<Err = String>,
{
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(AppError::Validation))
        .transpose()
}
