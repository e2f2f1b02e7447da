// ============================================================================
// Rate Limiter
// ============================================================================
//
// Sliding-window limiter keyed by (client IP, endpoint). Each admitted
// request is a row in `rate_limit_log`; the window count is a COUNT over the
// rows newer than `now - window`. Rows outlive every window only until the
// cleanup task purges them.
//
// ============================================================================

use axum::http::{HeaderMap, HeaderValue, Method};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::{RateLimitConfig, RateLimitRule};
use crate::db::rate_limit_log::{self, WindowUsage};
use crate::db::{DatabaseManager, DbError};

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// Which budget a request draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    Default,
    Contact,
    Newsletter,
    Auth,
}

impl EndpointClass {
    /// Resource segment after `/api/`, e.g. `blog` for `/api/blog/hello`.
    pub fn endpoint_key(path: &str) -> Option<&str> {
        let rest = path.strip_prefix("/api/")?;
        let key = rest.split('/').next().unwrap_or("");
        (!key.is_empty()).then_some(key)
    }

    /// Contact and newsletter budgets cover public writes only; reads of
    /// those resources are admin traffic.
    pub fn for_request(endpoint: &str, method: &Method) -> Self {
        let is_write = !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS);
        match endpoint {
            "auth" => Self::Auth,
            "contact" if is_write => Self::Contact,
            "newsletter" if is_write => Self::Newsletter,
            _ => Self::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the oldest request in the window ages out
    pub reset_secs: u64,
}

impl RateLimitDecision {
    /// Decide from the usage observed before this request.
    pub fn from_usage(rule: RateLimitRule, usage: WindowUsage, now: DateTime<Utc>) -> Self {
        let window = rule.window_secs;
        let reset_secs = usage
            .oldest
            .map(|oldest| {
                let ages_out = oldest + ChronoDuration::seconds(window as i64);
                (ages_out - now).num_seconds().clamp(1, window as i64) as u64
            })
            .unwrap_or(window);

        let count = usage.count.max(0) as u64;
        if count >= u64::from(rule.max_requests) {
            Self {
                allowed: false,
                limit: rule.max_requests,
                remaining: 0,
                reset_secs,
            }
        } else {
            Self {
                allowed: true,
                limit: rule.max_requests,
                remaining: rule.max_requests - count as u32 - 1,
                reset_secs,
            }
        }
    }

    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(HEADER_LIMIT, HeaderValue::from(self.limit));
        headers.insert(HEADER_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(HEADER_RESET, HeaderValue::from(self.reset_secs));
    }
}

pub struct RateLimiter {
    db: Arc<DatabaseManager>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(db: Arc<DatabaseManager>, config: RateLimitConfig) -> Self {
        Self { db, config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn rule_for(&self, class: EndpointClass) -> RateLimitRule {
        match class {
            EndpointClass::Default => self.config.default,
            EndpointClass::Contact => self.config.contact,
            EndpointClass::Newsletter => self.config.newsletter,
            EndpointClass::Auth => self.config.auth,
        }
    }

    /// Count the window and, when under the limit, log this request.
    pub async fn check(
        &self,
        ip: &str,
        endpoint: &str,
        class: EndpointClass,
    ) -> Result<RateLimitDecision, DbError> {
        let rule = self.rule_for(class);
        let now = Utc::now();
        let since = now - ChronoDuration::seconds(rule.window_secs as i64);

        let usage = self
            .db
            .run("rate_limit.window_usage", |pool| async move {
                rate_limit_log::window_usage(&pool, ip, endpoint, since).await
            })
            .await?;

        let decision = RateLimitDecision::from_usage(rule, usage, now);
        if decision.allowed {
            self.db
                .run_write("rate_limit.record", |pool| async move {
                    rate_limit_log::record(&pool, ip, endpoint, now).await
                })
                .await?;
        }
        Ok(decision)
    }

    /// Delete rows older than the longest configured window.
    pub async fn cleanup(&self) -> Result<u64, DbError> {
        let cutoff =
            Utc::now() - ChronoDuration::seconds(self.config.longest_window_secs() as i64);
        self.db
            .run("rate_limit.cleanup", |pool| async move {
                rate_limit_log::purge_older_than(&pool, cutoff).await
            })
            .await
    }

    pub fn spawn_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let interval = Duration::from_secs(limiter.config.cleanup_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match limiter.cleanup().await {
                    Ok(0) => {}
                    Ok(deleted) => tracing::debug!(deleted, "Purged expired rate limit rows"),
                    Err(e) => tracing::warn!(error = %e, "Rate limit cleanup failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_900_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_endpoint_key() {
        assert_eq!(EndpointClass::endpoint_key("/api/blog"), Some("blog"));
        assert_eq!(EndpointClass::endpoint_key("/api/blog/hello-world"), Some("blog"));
        assert_eq!(
            EndpointClass::endpoint_key("/api/newsletter/unsubscribe"),
            Some("newsletter")
        );
        assert_eq!(EndpointClass::endpoint_key("/api/"), None);
        assert_eq!(EndpointClass::endpoint_key("/health"), None);
    }

    #[test]
    fn test_class_selection() {
        assert_eq!(
            EndpointClass::for_request("contact", &Method::POST),
            EndpointClass::Contact
        );
        assert_eq!(
            EndpointClass::for_request("contact", &Method::GET),
            EndpointClass::Default
        );
        assert_eq!(
            EndpointClass::for_request("newsletter", &Method::POST),
            EndpointClass::Newsletter
        );
        assert_eq!(
            EndpointClass::for_request("auth", &Method::POST),
            EndpointClass::Auth
        );
        assert_eq!(
            EndpointClass::for_request("blog", &Method::DELETE),
            EndpointClass::Default
        );
    }

    #[test]
    fn test_first_request_in_window() {
        let rule = RateLimitRule::new(5, 3600);
        let decision = RateLimitDecision::from_usage(
            rule,
            WindowUsage {
                count: 0,
                oldest: None,
            },
            at(0),
        );
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.reset_secs, 3600);
    }

    #[test]
    fn test_last_allowed_request_has_zero_remaining() {
        let rule = RateLimitRule::new(5, 3600);
        let decision = RateLimitDecision::from_usage(
            rule,
            WindowUsage {
                count: 4,
                oldest: Some(at(-600)),
            },
            at(0),
        );
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_secs, 3000);
    }

    #[test]
    fn test_denied_when_window_full() {
        let rule = RateLimitRule::new(3, 3600);
        let decision = RateLimitDecision::from_usage(
            rule,
            WindowUsage {
                count: 3,
                oldest: Some(at(-3500)),
            },
            at(0),
        );
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_secs, 100);
    }

    #[test]
    fn test_headers_are_written() {
        let decision = RateLimitDecision {
            allowed: true,
            limit: 100,
            remaining: 42,
            reset_secs: 900,
        };
        let mut headers = HeaderMap::new();
        decision.apply_headers(&mut headers);
        assert_eq!(headers.get(HEADER_LIMIT).unwrap(), "100");
        assert_eq!(headers.get(HEADER_REMAINING).unwrap(), "42");
        assert_eq!(headers.get(HEADER_RESET).unwrap(), "900");
    }
}
