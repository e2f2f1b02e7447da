// ============================================================================
// Security Configuration
// ============================================================================

use super::{env_opt, env_or};
use std::fmt;

const MIN_SECRET_LEN: usize = 32;
/// Admin sessions last at most 30 days
pub const MAX_JWT_TTL_HOURS: i64 = 24 * 30;

/// API key and admin session settings
#[derive(Clone)]
pub struct SecurityConfig {
    /// Full-access key for deployments and the admin dashboard
    pub master_key: Option<String>,
    /// HS256 secret for admin session tokens
    pub jwt_secret: Option<String>,
    pub jwt_ttl_hours: i64,
    pub jwt_issuer: String,
    pub admin_username: Option<String>,
    /// bcrypt hash of the admin password
    pub admin_password_hash: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            master_key: None,
            jwt_secret: None,
            jwt_ttl_hours: 12,
            jwt_issuer: "portfolio-api".to_string(),
            admin_username: None,
            admin_password_hash: None,
        }
    }
}

impl SecurityConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let master_key = env_opt("API_MASTER_KEY");
        if let Some(key) = &master_key {
            if key.len() < MIN_SECRET_LEN {
                anyhow::bail!(
                    "API_MASTER_KEY must be at least {} characters long",
                    MIN_SECRET_LEN
                );
            }
        }

        let admin_username = env_opt("ADMIN_USERNAME");
        let admin_password_hash = env_opt("ADMIN_PASSWORD_HASH");
        let jwt_secret = env_opt("JWT_SECRET");

        if admin_username.is_some() && admin_password_hash.is_some() {
            match &jwt_secret {
                Some(secret) if secret.len() >= MIN_SECRET_LEN => {}
                Some(_) => anyhow::bail!(
                    "JWT_SECRET must be at least {} characters long. Generate with: openssl rand -base64 32",
                    MIN_SECRET_LEN
                ),
                None => anyhow::bail!("JWT_SECRET is required when admin login is configured"),
            }
        }

        Ok(Self {
            master_key,
            jwt_secret,
            jwt_ttl_hours: env_or("JWT_TTL_HOURS", 12i64).clamp(1, MAX_JWT_TTL_HOURS),
            jwt_issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "portfolio-api".to_string()),
            admin_username,
            admin_password_hash,
        })
    }

    /// `jwt_ttl_hours` within `1..=MAX_JWT_TTL_HOURS`, however the config was built
    pub fn session_ttl_hours(&self) -> i64 {
        self.jwt_ttl_hours.clamp(1, MAX_JWT_TTL_HOURS)
    }
}

// Secrets stay out of logs.
impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("SecurityConfig")
            .field("master_key", &redact(&self.master_key))
            .field("jwt_secret", &redact(&self.jwt_secret))
            .field("jwt_ttl_hours", &self.jwt_ttl_hours)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("admin_username", &self.admin_username)
            .field("admin_password_hash", &redact(&self.admin_password_hash))
            .finish()
    }
}
