use crate::auth::AuthManager;
use crate::config::Config;
use crate::db::DatabaseManager;
use crate::rate_limit::RateLimiter;
use std::sync::Arc;

/// Application context containing shared dependencies
#[derive(Clone)]
pub struct AppContext {
    pub db: Arc<DatabaseManager>,
    pub auth_manager: Arc<AuthManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
}

impl AppContext {
    /// Wires the auth manager and rate limiter onto a shared database manager
    pub fn new(db: Arc<DatabaseManager>, config: Arc<Config>) -> Self {
        let auth_manager = Arc::new(AuthManager::new(&config.security, Arc::clone(&db)));
        let rate_limiter = Arc::new(RateLimiter::new(
            Arc::clone(&db),
            config.rate_limit.clone(),
        ));
        Self {
            db,
            auth_manager,
            rate_limiter,
            config,
        }
    }
}
