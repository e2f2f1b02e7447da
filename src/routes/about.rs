// ============================================================================
// About Routes
// ============================================================================
//
// Endpoints:
// - GET /api/about - The profile (404 until first written)
// - PUT /api/about - Replace the profile (about:write)
//
// ============================================================================

use axum::{Json, extract::State};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::scopes;
use crate::context::AppContext;
use crate::db::about::{self, AboutData, AboutProfile, ExperienceEntry};
use crate::error::{AppError, AppResult};
use crate::routes::extractors::{Authenticated, JsonBody};
use crate::routes::{non_empty, validate_tags, validate_url};
use crate::utils::{is_http_url, is_valid_email, validate_length};

const MAX_EXPERIENCE_ENTRIES: usize = 50;

#[derive(Debug, Deserialize)]
pub struct AboutInput {
    pub name: String,
    pub headline: String,
    pub bio: String,
    pub avatar_url: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default)]
    pub social_links: BTreeMap<String, String>,
}

fn validate_about(input: AboutInput) -> AppResult<AboutData> {
    let name = input.name.trim().to_string();
    let headline = input.headline.trim().to_string();
    let bio = input.bio.trim().to_string();
    validate_length("name", &name, 1, 100).map_err(AppError::Validation)?;
    validate_length("headline", &headline, 1, 200).map_err(AppError::Validation)?;
    validate_length("bio", &bio, 1, 10_000).map_err(AppError::Validation)?;

    let avatar_url = input.avatar_url.and_then(non_empty);
    validate_url("avatar_url", avatar_url.as_deref())?;

    let location = input.location.and_then(non_empty);
    if let Some(location) = &location {
        validate_length("location", location, 1, 200).map_err(AppError::Validation)?;
    }

    let email = input.email.and_then(non_empty).map(|e| e.to_lowercase());
    if let Some(email) = &email {
        if !is_valid_email(email) {
            return Err(AppError::validation("email is not a valid e-mail address"));
        }
    }

    if input.experience.len() > MAX_EXPERIENCE_ENTRIES {
        return Err(AppError::validation(format!(
            "experience must not exceed {} entries",
            MAX_EXPERIENCE_ENTRIES
        )));
    }
    for entry in &input.experience {
        validate_length("experience.company", &entry.company, 1, 200)
            .map_err(AppError::Validation)?;
        validate_length("experience.role", &entry.role, 1, 200).map_err(AppError::Validation)?;
    }

    for (network, url) in &input.social_links {
        if network.trim().is_empty() || !is_http_url(url) {
            return Err(AppError::validation(format!(
                "social_links.{} must be an http(s) URL",
                network
            )));
        }
    }

    Ok(AboutData {
        name,
        headline,
        bio,
        avatar_url,
        location,
        email,
        skills: validate_tags(input.skills)?,
        experience: input.experience,
        social_links: input.social_links,
    })
}

/// GET /api/about
pub async fn get_about(State(ctx): State<Arc<AppContext>>) -> AppResult<Json<AboutProfile>> {
    let profile = ctx
        .db
        .run("about.get", |pool| async move { about::get(&pool).await })
        .await?
        .ok_or_else(|| AppError::not_found("about profile has not been written yet"))?;
    Ok(Json(profile))
}

/// PUT /api/about
pub async fn put_about(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    JsonBody(input): JsonBody<AboutInput>,
) -> AppResult<Json<AboutProfile>> {
    principal.require_scope(scopes::ABOUT_WRITE)?;
    let data = validate_about(input)?;

    let profile = ctx
        .db
        .run("about.upsert", |pool| {
            let data = &data;
            async move { about::upsert(&pool, data).await }
        })
        .await?;

    tracing::info!("About profile updated");
    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> AboutInput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_minimal_profile() {
        let data = validate_about(parse(json!({
            "name": "Ada",
            "headline": "Engineer",
            "bio": "Builds things."
        })))
        .unwrap();
        assert!(data.skills.is_empty());
        assert!(data.social_links.is_empty());
    }

    #[test]
    fn test_social_links_must_be_urls() {
        let result = validate_about(parse(json!({
            "name": "Ada",
            "headline": "Engineer",
            "bio": "Builds things.",
            "social_links": { "github": "not a url" }
        })));
        assert!(result.is_err());
    }

    #[test]
    fn test_location_and_avatar_fit_their_columns() {
        let data = validate_about(parse(json!({
            "name": "Ada",
            "headline": "Engineer",
            "bio": "Builds things.",
            "location": "x".repeat(200)
        })))
        .unwrap();
        assert_eq!(data.location.map(|l| l.len()), Some(200));

        let err = validate_about(parse(json!({
            "name": "Ada",
            "headline": "Engineer",
            "bio": "Builds things.",
            "location": "x".repeat(201)
        })))
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("location"));

        let err = validate_about(parse(json!({
            "name": "Ada",
            "headline": "Engineer",
            "bio": "Builds things.",
            "avatar_url": format!("https://example.com/{}", "a".repeat(3000))
        })))
        .unwrap_err();
        assert!(err.to_string().contains("avatar_url"));
    }

    #[test]
    fn test_email_is_checked_and_lowercased() {
        let data = validate_about(parse(json!({
            "name": "Ada",
            "headline": "Engineer",
            "bio": "Builds things.",
            "email": "Ada@Example.com"
        })))
        .unwrap();
        assert_eq!(data.email.as_deref(), Some("ada@example.com"));

        let result = validate_about(parse(json!({
            "name": "Ada",
            "headline": "Engineer",
            "bio": "Builds things.",
            "email": "nope"
        })));
        assert!(result.is_err());
    }
}
