// ============================================================================
// Axum Extractors
// ============================================================================
//
// - Authenticated: resolves the API key / session token, rejects with 401
// - OptionalAuth: same, but `None` when no credential was sent
// - JsonBody / QueryParams: axum's extractors with AppError rejections
//
// ============================================================================

use axum::{
    Json, async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::auth::Principal;
use crate::context::AppContext;
use crate::error::AppError;

/// Extractor for an authenticated caller
///
/// Usage:
/// ```rust,ignore
/// async fn handler(Authenticated(principal): Authenticated, ...) -> AppResult<...> {
///     principal.require_scope(scopes::BLOG_WRITE)?;
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

#[async_trait]
impl FromRequestParts<Arc<AppContext>> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        match state.auth_manager.authenticate(&parts.headers).await {
            Ok(Some(principal)) => Ok(Self(principal)),
            Ok(None) => Err(AppError::auth("missing API key")),
            Err(e) => {
                tracing::warn!(error = %e, path = %parts.uri.path(), "Authentication failed");
                Err(e)
            }
        }
    }
}

/// Like [`Authenticated`] but anonymous requests yield `None`.
/// A credential that is present but invalid is still rejected.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<Principal>);

impl OptionalAuth {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.0.as_ref().is_some_and(|p| p.has_scope(scope))
    }

    /// Require a principal holding `scope`
    pub fn require_scope(&self, scope: &str) -> Result<&Principal, AppError> {
        let principal = self
            .0
            .as_ref()
            .ok_or_else(|| AppError::auth("missing API key"))?;
        principal.require_scope(scope)?;
        Ok(principal)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppContext>> for OptionalAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        state
            .auth_manager
            .authenticate(&parts.headers)
            .await
            .map(Self)
    }
}

/// JSON body whose rejection is a 400 `AppError`
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Query string whose rejection is a 400 `AppError`
#[derive(Debug)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}
