// ============================================================================
// Project Routes
// ============================================================================
//
// Endpoints:
// - GET /api/projects - Ordered by sort_order, then newest
// - GET /api/projects/:slug
// - POST /api/projects - Create (projects:write)
// - PUT /api/projects/:id - Partial update (projects:write)
// - DELETE /api/projects/:id - Delete (projects:write)
//
// ============================================================================

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::scopes;
use crate::context::AppContext;
use crate::db::projects::{self, Project, ProjectData};
use crate::error::{AppError, AppResult};
use crate::pagination::{PageParams, Paginated};
use crate::routes::extractors::{Authenticated, JsonBody, QueryParams};
use crate::routes::{non_empty, validate_tags, validate_url};
use crate::utils::{is_valid_slug, slugify, validate_length};

#[derive(Debug, Deserialize)]
pub struct ListProjectsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub featured: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub tech_stack: Option<Vec<String>>,
    pub github_url: Option<String>,
    pub live_url: Option<String>,
    pub image_url: Option<String>,
    pub featured: Option<bool>,
    pub sort_order: Option<i32>,
}

fn merge_optional(
    value: Option<String>,
    existing: Option<&Project>,
    current: impl Fn(&Project) -> Option<String>,
) -> Option<String> {
    match value {
        Some(v) => non_empty(v),
        None => existing.and_then(current),
    }
}

fn build_project(input: ProjectInput, existing: Option<&Project>) -> AppResult<ProjectData> {
    let title = input
        .title
        .or_else(|| existing.map(|p| p.title.clone()))
        .unwrap_or_default()
        .trim()
        .to_string();
    validate_length("title", &title, 1, 200).map_err(AppError::Validation)?;

    let slug = match input.slug.as_deref().map(str::trim) {
        Some(slug) if !slug.is_empty() => slug.to_string(),
        _ => match existing {
            Some(project) => project.slug.clone(),
            None => slugify(&title),
        },
    };
    if !is_valid_slug(&slug) {
        return Err(AppError::validation(
            "slug must contain only lowercase letters, digits and hyphens",
        ));
    }

    let description = input
        .description
        .or_else(|| existing.map(|p| p.description.clone()))
        .unwrap_or_default()
        .trim()
        .to_string();
    validate_length("description", &description, 1, 1000).map_err(AppError::Validation)?;

    let content = merge_optional(input.content, existing, |p| p.content.clone());
    let github_url = merge_optional(input.github_url, existing, |p| p.github_url.clone());
    let live_url = merge_optional(input.live_url, existing, |p| p.live_url.clone());
    let image_url = merge_optional(input.image_url, existing, |p| p.image_url.clone());
    validate_url("github_url", github_url.as_deref())?;
    validate_url("live_url", live_url.as_deref())?;
    validate_url("image_url", image_url.as_deref())?;

    let tech_stack = match input.tech_stack {
        Some(stack) => validate_tags(stack)?,
        None => existing.map(|p| p.tech_stack.0.clone()).unwrap_or_default(),
    };

    Ok(ProjectData {
        title,
        slug,
        description,
        content,
        tech_stack,
        github_url,
        live_url,
        image_url,
        featured: input
            .featured
            .or_else(|| existing.map(|p| p.featured))
            .unwrap_or(false),
        sort_order: input
            .sort_order
            .or_else(|| existing.map(|p| p.sort_order))
            .unwrap_or(0),
    })
}

/// GET /api/projects
pub async fn list_projects(
    State(ctx): State<Arc<AppContext>>,
    QueryParams(query): QueryParams<ListProjectsQuery>,
) -> AppResult<Json<Paginated<Project>>> {
    let params = PageParams::new(query.page, query.limit);
    let featured = query.featured;

    let (items, total) = ctx
        .db
        .run("projects.list", |pool| async move {
            let items = projects::list(&pool, featured, params.limit, params.offset()).await?;
            let total = projects::count(&pool, featured).await?;
            Ok((items, total))
        })
        .await?;

    Ok(Json(Paginated::new(items, params, total)))
}

/// GET /api/projects/:slug
pub async fn get_project(
    State(ctx): State<Arc<AppContext>>,
    Path(slug): Path<String>,
) -> AppResult<Json<Project>> {
    let project = ctx
        .db
        .run("projects.get_by_slug", |pool| {
            let slug = slug.as_str();
            async move { projects::get_by_slug(&pool, slug).await }
        })
        .await?
        .ok_or_else(|| AppError::not_found(format!("project '{}'", slug)))?;

    Ok(Json(project))
}

/// POST /api/projects
pub async fn create_project(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    JsonBody(input): JsonBody<ProjectInput>,
) -> AppResult<(StatusCode, Json<Project>)> {
    principal.require_scope(scopes::PROJECTS_WRITE)?;
    let data = build_project(input, None)?;

    let id = ctx
        .db
        .run_write("projects.create", |pool| {
            let data = &data;
            async move { projects::create(&pool, data).await }
        })
        .await?;
    let project = ctx
        .db
        .run("projects.get_by_id", |pool| async move {
            projects::get_by_id(&pool, id).await
        })
        .await?
        .ok_or_else(|| AppError::internal("project missing after insert"))?;

    tracing::info!(project_id = project.id, slug = %project.slug, "Project created");
    Ok((StatusCode::CREATED, Json(project)))
}

/// PUT /api/projects/:id
pub async fn update_project(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<u64>,
    JsonBody(input): JsonBody<ProjectInput>,
) -> AppResult<Json<Project>> {
    principal.require_scope(scopes::PROJECTS_WRITE)?;

    let existing = ctx
        .db
        .run("projects.get_by_id", |pool| async move {
            projects::get_by_id(&pool, id).await
        })
        .await?
        .ok_or_else(|| AppError::not_found(format!("project {}", id)))?;

    let data = build_project(input, Some(&existing))?;

    let project = ctx
        .db
        .run("projects.update", |pool| {
            let data = &data;
            async move { projects::update(&pool, id, data).await }
        })
        .await?
        .ok_or_else(|| AppError::not_found(format!("project {}", id)))?;

    Ok(Json(project))
}

/// DELETE /api/projects/:id
pub async fn delete_project(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<u64>,
) -> AppResult<StatusCode> {
    principal.require_scope(scopes::PROJECTS_WRITE)?;

    let deleted = ctx
        .db
        .run_write("projects.delete", |pool| async move {
            projects::delete(&pool, id).await
        })
        .await?;
    if !deleted {
        return Err(AppError::not_found(format!("project {}", id)));
    }

    tracing::info!(project_id = id, "Project deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ProjectInput {
        ProjectInput {
            title: Some("Portfolio API".into()),
            description: Some("Backend for my site".into()),
            ..ProjectInput::default()
        }
    }

    #[test]
    fn test_defaults() {
        let data = build_project(input(), None).unwrap();
        assert_eq!(data.slug, "portfolio-api");
        assert!(!data.featured);
        assert_eq!(data.sort_order, 0);
    }

    #[test]
    fn test_urls_must_be_http() {
        let mut project = input();
        project.github_url = Some("git@github.com:me/repo.git".into());
        assert!(build_project(project, None).is_err());

        let mut project = input();
        project.live_url = Some("https://example.com".into());
        project.github_url = Some(String::new());
        let data = build_project(project, None).unwrap();
        assert_eq!(data.live_url.as_deref(), Some("https://example.com"));
        assert_eq!(data.github_url, None);
    }

    #[test]
    fn test_description_required() {
        let mut project = input();
        project.description = None;
        assert!(build_project(project, None).is_err());
    }
}
