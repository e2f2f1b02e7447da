use anyhow::{Context, Result};
use std::str::FromStr;

mod database;
mod logging;
mod rate_limit;
mod security;

pub use database::{CircuitBreakerConfig, DbConfig};
pub use logging::{LogFormat, LoggingConfig};
pub use rate_limit::{RateLimitConfig, RateLimitRule};
pub use security::{MAX_JWT_TTL_HOURS, SecurityConfig};

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_RUST_LOG: &str = "info";

/// 1 MB is plenty for blog posts and project write-ups; media goes to a CDN.
pub const DEFAULT_MAX_REQUEST_BODY_SIZE: usize = 1024 * 1024;

const DEFAULT_PUBLIC_CACHE_MAX_AGE_SECS: u64 = 60;
const DEFAULT_PUBLIC_CACHE_STALE_SECS: u64 = 600;

/// Reads an optional environment variable and parses it, falling back to
/// `default` when it is missing or malformed.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Reads an optional, non-empty environment variable.
pub(crate) fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Incremental-regeneration style caching for anonymous GETs.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// `s-maxage` handed to the CDN
    pub max_age_secs: u64,
    /// `stale-while-revalidate` window
    pub stale_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_secs: DEFAULT_PUBLIC_CACHE_MAX_AGE_SECS,
            stale_secs: DEFAULT_PUBLIC_CACHE_STALE_SECS,
        }
    }
}

impl CacheConfig {
    fn from_env() -> Self {
        Self {
            max_age_secs: env_or("PUBLIC_CACHE_MAX_AGE_SECS", DEFAULT_PUBLIC_CACHE_MAX_AGE_SECS),
            stale_secs: env_or("PUBLIC_CACHE_STALE_SECS", DEFAULT_PUBLIC_CACHE_STALE_SECS),
        }
    }

    pub fn header_value(&self) -> String {
        format!(
            "public, max-age=0, s-maxage={}, stale-while-revalidate={}",
            self.max_age_secs, self.stale_secs
        )
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    pub rust_log: String,
    /// Empty means any origin is accepted
    pub cors_allowed_origins: Vec<String>,
    pub max_request_body_bytes: usize,
    pub db: DbConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Builds a configuration with defaults everywhere except the database URL.
    pub fn with_database_url(database_url: impl Into<String>) -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            rust_log: DEFAULT_RUST_LOG.to_string(),
            cors_allowed_origins: Vec::new(),
            max_request_body_bytes: DEFAULT_MAX_REQUEST_BODY_SIZE,
            db: DbConfig::new(database_url),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.to_string()),
            cors_allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().trim_end_matches('/').to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            max_request_body_bytes: env_or("MAX_REQUEST_BODY_BYTES", DEFAULT_MAX_REQUEST_BODY_SIZE),
            db: DbConfig::from_env().context("invalid database configuration")?,
            circuit_breaker: CircuitBreakerConfig::from_env(),
            rate_limit: RateLimitConfig::from_env().context("invalid rate limit configuration")?,
            security: SecurityConfig::from_env().context("invalid security configuration")?,
            logging: LoggingConfig::from_env(),
            cache: CacheConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "DATABASE_URL",
            "BIND_ADDRESS",
            "CORS_ALLOWED_ORIGINS",
            "RATE_LIMIT_CONTACT",
            "API_MASTER_KEY",
            "ADMIN_USERNAME",
            "ADMIN_PASSWORD_HASH",
            "JWT_SECRET",
            "DB_MAX_RETRIES",
            "JWT_TTL_HOURS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_requires_database_url() {
        clear_env();
        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        clear_env();
        std::env::set_var("DATABASE_URL", "mysql://user:pw@localhost:3306/portfolio");
        std::env::set_var("CORS_ALLOWED_ORIGINS", "https://example.dev/, https://www.example.dev");
        std::env::set_var("RATE_LIMIT_CONTACT", "10/600");
        std::env::set_var("DB_MAX_RETRIES", "not-a-number");

        let config = Config::from_env().unwrap();
        assert_eq!(
            config.cors_allowed_origins,
            vec!["https://example.dev", "https://www.example.dev"]
        );
        assert_eq!(config.rate_limit.contact.max_requests, 10);
        assert_eq!(config.rate_limit.contact.window_secs, 600);
        // malformed numbers fall back to the default
        assert_eq!(config.db.max_retries, 3);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_jwt_ttl_is_clamped() {
        clear_env();
        std::env::set_var("DATABASE_URL", "mysql://localhost/portfolio");
        std::env::set_var("JWT_TTL_HOURS", "9223372036854775807");
        let config = Config::from_env().unwrap();
        assert_eq!(config.security.jwt_ttl_hours, MAX_JWT_TTL_HOURS);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_malformed_rate_limit_is_rejected() {
        clear_env();
        std::env::set_var("DATABASE_URL", "mysql://localhost/portfolio");
        std::env::set_var("RATE_LIMIT_CONTACT", "ten per hour");
        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    fn test_cache_header_value() {
        let cache = CacheConfig {
            max_age_secs: 30,
            stale_secs: 300,
        };
        assert_eq!(
            cache.header_value(),
            "public, max-age=0, s-maxage=30, stale-while-revalidate=300"
        );
    }
}
