// ============================================================================
// Logging Configuration
// ============================================================================

use rand::Rng;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Salt for hashing client IPs and e-mail addresses before they hit the logs
    pub hash_salt: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            hash_salt: random_salt(),
        }
    }
}

impl LoggingConfig {
    pub(crate) fn from_env() -> Self {
        let format = match std::env::var("LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let hash_salt = match std::env::var("LOG_HASH_SALT") {
            Ok(salt) if !salt.is_empty() => salt,
            _ => {
                // Hashed identifiers will not correlate across restarts.
                tracing::warn!("LOG_HASH_SALT not set - using a random per-process salt");
                random_salt()
            }
        };

        Self { format, hash_salt }
    }
}

fn random_salt() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
        .collect()
}
