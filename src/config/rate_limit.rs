// ============================================================================
// Rate Limit Configuration
// ============================================================================

use super::env_or;
use anyhow::Context;
use std::fmt;
use std::str::FromStr;

/// A `max_requests` per `window_secs` budget, written `"<max>/<window_secs>"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitRule {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

impl fmt::Display for RateLimitRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.max_requests, self.window_secs)
    }
}

impl FromStr for RateLimitRule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (max, window) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("expected \"<max>/<window_secs>\", got {:?}", s))?;
        let max_requests: u32 = max.trim().parse().context("invalid max requests")?;
        let window_secs: u64 = window.trim().parse().context("invalid window seconds")?;
        if max_requests == 0 || window_secs == 0 {
            anyhow::bail!("rate limit values must be positive, got {:?}", s);
        }
        Ok(Self::new(max_requests, window_secs))
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub default: RateLimitRule,
    pub contact: RateLimitRule,
    pub newsletter: RateLimitRule,
    pub auth: RateLimitRule,
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default: RateLimitRule::new(100, 15 * 60),
            contact: RateLimitRule::new(5, 60 * 60),
            newsletter: RateLimitRule::new(3, 60 * 60),
            auth: RateLimitRule::new(5, 15 * 60),
            cleanup_interval_secs: 60 * 60,
        }
    }
}

impl RateLimitConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            enabled: env_or("RATE_LIMIT_ENABLED", defaults.enabled),
            default: rule_from_env("RATE_LIMIT_DEFAULT", defaults.default)?,
            contact: rule_from_env("RATE_LIMIT_CONTACT", defaults.contact)?,
            newsletter: rule_from_env("RATE_LIMIT_NEWSLETTER", defaults.newsletter)?,
            auth: rule_from_env("RATE_LIMIT_AUTH", defaults.auth)?,
            cleanup_interval_secs: env_or(
                "RATE_LIMIT_CLEANUP_INTERVAL_SECS",
                defaults.cleanup_interval_secs,
            ),
        })
    }

    /// Rows older than this can no longer affect any decision.
    pub fn longest_window_secs(&self) -> u64 {
        [self.default, self.contact, self.newsletter, self.auth]
            .iter()
            .map(|r| r.window_secs)
            .max()
            .unwrap_or(self.default.window_secs)
    }
}

fn rule_from_env(key: &str, default: RateLimitRule) -> anyhow::Result<RateLimitRule> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .parse()
            .with_context(|| format!("{} is malformed", key)),
        _ => Ok(default),
    }
}
