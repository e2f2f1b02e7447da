// ============================================================================
// Blog Routes
// ============================================================================
//
// Endpoints:
// - GET /api/blog - Published posts, newest first (drafts with blog:write)
// - GET /api/blog/:slug - Single post
// - POST /api/blog - Create (blog:write)
// - PUT /api/blog/:id - Partial update (blog:write)
// - DELETE /api/blog/:id - Delete (blog:write)
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
use crate::db::blog::{self, BlogFilter, BlogPost, BlogPostData};
use crate::error::{AppError, AppResult};
use crate::pagination::{PageParams, Paginated};
use crate::routes::extractors::{Authenticated, JsonBody, OptionalAuth, QueryParams};
use crate::routes::{non_empty, validate_tags, validate_url};
use crate::utils::{is_valid_slug, slugify, validate_length};

const MAX_CONTENT_LEN: usize = 100_000;

#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub tag: Option<String>,
    pub include_drafts: Option<bool>,
}

/// Create and update body. Absent fields keep their current value on update.
#[derive(Debug, Default, Deserialize)]
pub struct BlogPostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub cover_image: Option<String>,
    pub tags: Option<Vec<String>>,
    pub published: Option<bool>,
}

/// Merge the input over `existing` and validate the result.
fn build_post(input: BlogPostInput, existing: Option<&BlogPost>) -> AppResult<BlogPostData> {
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
            Some(post) => post.slug.clone(),
            None => slugify(&title),
        },
    };
    if !is_valid_slug(&slug) {
        return Err(AppError::validation(
            "slug must contain only lowercase letters, digits and hyphens",
        ));
    }

    let content = input
        .content
        .or_else(|| existing.map(|p| p.content.clone()))
        .unwrap_or_default();
    validate_length("content", &content, 1, MAX_CONTENT_LEN).map_err(AppError::Validation)?;

    let excerpt = match input.excerpt {
        Some(excerpt) => non_empty(excerpt),
        None => existing.and_then(|p| p.excerpt.clone()),
    };
    if let Some(excerpt) = &excerpt {
        validate_length("excerpt", excerpt, 1, 500).map_err(AppError::Validation)?;
    }

    let cover_image = match input.cover_image {
        Some(url) => non_empty(url),
        None => existing.and_then(|p| p.cover_image.clone()),
    };
    validate_url("cover_image", cover_image.as_deref())?;

    let tags = match input.tags {
        Some(tags) => validate_tags(tags)?,
        None => existing.map(|p| p.tags.0.clone()).unwrap_or_default(),
    };

    let published = input
        .published
        .or_else(|| existing.map(|p| p.published))
        .unwrap_or(false);

    Ok(BlogPostData {
        title,
        slug,
        excerpt,
        content,
        cover_image,
        tags,
        published,
    })
}

/// GET /api/blog
pub async fn list_posts(
    State(ctx): State<Arc<AppContext>>,
    auth: OptionalAuth,
    QueryParams(query): QueryParams<ListPostsQuery>,
) -> AppResult<Json<Paginated<BlogPost>>> {
    let include_drafts = query.include_drafts.unwrap_or(false);
    if include_drafts {
        auth.require_scope(scopes::BLOG_WRITE)?;
    }

    let params = PageParams::new(query.page, query.limit);
    let filter = BlogFilter {
        tag: query.tag.and_then(non_empty),
        include_drafts,
    };

    let (posts, total) = ctx
        .db
        .run("blog.list", |pool| {
            let filter = &filter;
            async move {
                let posts = blog::list(&pool, filter, params.limit, params.offset()).await?;
                let total = blog::count(&pool, filter).await?;
                Ok((posts, total))
            }
        })
        .await?;

    Ok(Json(Paginated::new(posts, params, total)))
}

/// GET /api/blog/:slug
pub async fn get_post(
    State(ctx): State<Arc<AppContext>>,
    auth: OptionalAuth,
    Path(slug): Path<String>,
) -> AppResult<Json<BlogPost>> {
    let post = ctx
        .db
        .run("blog.get_by_slug", |pool| {
            let slug = slug.as_str();
            async move { blog::get_by_slug(&pool, slug).await }
        })
        .await?
        .filter(|post| post.published || auth.has_scope(scopes::BLOG_WRITE))
        .ok_or_else(|| AppError::not_found(format!("post '{}'", slug)))?;

    Ok(Json(post))
}

/// POST /api/blog
pub async fn create_post(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    JsonBody(input): JsonBody<BlogPostInput>,
) -> AppResult<(StatusCode, Json<BlogPost>)> {
    principal.require_scope(scopes::BLOG_WRITE)?;
    let data = build_post(input, None)?;

    let id = ctx
        .db
        .run_write("blog.create", |pool| {
            let data = &data;
            async move { blog::create(&pool, data).await }
        })
        .await?;
    let post = ctx
        .db
        .run("blog.get_by_id", |pool| async move {
            blog::get_by_id(&pool, id).await
        })
        .await?
        .ok_or_else(|| AppError::internal("blog post missing after insert"))?;

    tracing::info!(post_id = post.id, slug = %post.slug, "Blog post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// PUT /api/blog/:id
pub async fn update_post(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<u64>,
    JsonBody(input): JsonBody<BlogPostInput>,
) -> AppResult<Json<BlogPost>> {
    principal.require_scope(scopes::BLOG_WRITE)?;

    let existing = ctx
        .db
        .run("blog.get_by_id", |pool| async move {
            blog::get_by_id(&pool, id).await
        })
        .await?
        .ok_or_else(|| AppError::not_found(format!("post {}", id)))?;

    let data = build_post(input, Some(&existing))?;

    let post = ctx
        .db
        .run("blog.update", |pool| {
            let data = &data;
            async move { blog::update(&pool, id, data).await }
        })
        .await?
        .ok_or_else(|| AppError::not_found(format!("post {}", id)))?;

    tracing::info!(post_id = post.id, "Blog post updated");
    Ok(Json(post))
}

/// DELETE /api/blog/:id
pub async fn delete_post(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<u64>,
) -> AppResult<StatusCode> {
    principal.require_scope(scopes::BLOG_WRITE)?;

    let deleted = ctx
        .db
        .run_write("blog.delete", |pool| async move { blog::delete(&pool, id).await })
        .await?;
    if !deleted {
        return Err(AppError::not_found(format!("post {}", id)));
    }

    tracing::info!(post_id = id, "Blog post deleted");
    Ok(StatusCode::NO_CONTENT)
}
