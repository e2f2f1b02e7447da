// ============================================================================
// Axum Middleware
// ============================================================================
//
// Middleware for request processing:
// - request_logging: request id, access log line, request counter
// - add_security_headers: security headers on every response
// - rate_limiting: per (IP, endpoint) sliding window, fails open
// - public_cache: CDN cache headers for anonymous reads
//
// ============================================================================

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::auth::extract_credential;
use crate::context::AppContext;
use crate::error::AppError;
use crate::metrics;
use crate::rate_limit::EndpointClass;
use crate::utils::{add_security_headers as utils_add_security_headers, extract_client_ip, log_safe_id};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request logging middleware
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let request_id_value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = &request_id_value {
        req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }

    tracing::debug!(
        method = %method,
        path = %path,
        request_id = %request_id,
        "Incoming request"
    );

    let mut response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();

    metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), status.as_str()])
        .inc();

    if let Some(value) = request_id_value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    tracing::info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        request_id = %request_id,
        "Request completed"
    );

    response
}

/// Add security headers to responses
pub async fn add_security_headers(req: Request, next: Next) -> Response {
    let is_https = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("https"))
        .unwrap_or(false);

    let mut response = next.run(req).await;
    utils_add_security_headers(response.headers_mut(), is_https);
    response
}

/// Rate limiting middleware for `/api/*`
///
/// Allowed requests carry `X-RateLimit-*` headers; rejected ones get 429 with
/// `Retry-After`. When the limiter's database is unavailable the request is
/// let through.
pub async fn rate_limiting(
    State(ctx): State<Arc<AppContext>>,
    req: Request,
    next: Next,
) -> Response {
    if !ctx.rate_limiter.enabled() || req.method() == Method::OPTIONS {
        return next.run(req).await;
    }

    let Some(endpoint) = EndpointClass::endpoint_key(req.uri().path()).map(str::to_string) else {
        return next.run(req).await;
    };
    let class = EndpointClass::for_request(&endpoint, req.method());

    let direct_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client_ip = extract_client_ip(req.headers(), direct_ip);

    match ctx.rate_limiter.check(&client_ip, &endpoint, class).await {
        Ok(decision) if !decision.allowed => {
            metrics::RATE_LIMITED_TOTAL
                .with_label_values(&[endpoint.as_str()])
                .inc();
            tracing::warn!(
                ip_hash = %log_safe_id(&client_ip, &ctx.config.logging.hash_salt),
                endpoint = %endpoint,
                limit = decision.limit,
                reset_secs = decision.reset_secs,
                "Rate limit exceeded"
            );
            let mut response = AppError::TooManyRequests {
                message: format!(
                    "Too many requests, please try again in {} seconds",
                    decision.reset_secs
                ),
                retry_after_secs: decision.reset_secs,
            }
            .into_response();
            decision.apply_headers(response.headers_mut());
            response
        }
        Ok(decision) => {
            let mut response = next.run(req).await;
            decision.apply_headers(response.headers_mut());
            response
        }
        Err(e) => {
            // Fail open - continue but log error
            tracing::error!(
                error = %e,
                ip_hash = %log_safe_id(&client_ip, &ctx.config.logging.hash_salt),
                endpoint = %endpoint,
                "Failed to check rate limit"
            );
            next.run(req).await
        }
    }
}

/// Cache headers for public read routes
///
/// Successful anonymous GETs may be cached by the CDN and served stale while
/// it revalidates; everything else on these routes is `no-store`.
pub async fn public_cache(
    State(ctx): State<Arc<AppContext>>,
    req: Request,
    next: Next,
) -> Response {
    let cacheable_request =
        req.method() == Method::GET && extract_credential(req.headers()).is_none();

    let mut response = next.run(req).await;

    if response.headers().contains_key(header::CACHE_CONTROL) {
        return response;
    }

    let value = if cacheable_request && response.status().is_success() {
        HeaderValue::from_str(&ctx.config.cache.header_value()).ok()
    } else {
        None
    };
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        value.unwrap_or_else(|| HeaderValue::from_static("no-store")),
    );
    response
}
