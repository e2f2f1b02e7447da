use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{MySql, QueryBuilder};

use super::DbPool;

const COLUMNS: &str = "id, title, slug, excerpt, content, cover_image, tags, published, \
                       published_at, created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BlogPost {
    pub id: u64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub cover_image: Option<String>,
    pub tags: Json<Vec<String>>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated, complete post content for insert or update
#[derive(Debug, Clone)]
pub struct BlogPostData {
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub cover_image: Option<String>,
    pub tags: Vec<String>,
    pub published: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BlogFilter {
    pub tag: Option<String>,
    pub include_drafts: bool,
}

fn push_filters(qb: &mut QueryBuilder<'_, MySql>, filter: &BlogFilter) {
    qb.push(" WHERE 1 = 1");
    if !filter.include_drafts {
        qb.push(" AND published = TRUE");
    }
    if let Some(tag) = &filter.tag {
        qb.push(" AND JSON_CONTAINS(tags, JSON_QUOTE(")
            .push_bind(tag.clone())
            .push("))");
    }
}

/// Newest first by publication date, drafts by creation date
pub async fn list(
    pool: &DbPool,
    filter: &BlogFilter,
    limit: u32,
    offset: u64,
) -> Result<Vec<BlogPost>, sqlx::Error> {
    let mut qb = QueryBuilder::<MySql>::new(format!("SELECT {COLUMNS} FROM blog_posts"));
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY COALESCE(published_at, created_at) DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    qb.build_query_as::<BlogPost>().fetch_all(pool).await
}

pub async fn count(pool: &DbPool, filter: &BlogFilter) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM blog_posts");
    push_filters(&mut qb, filter);
    qb.build_query_scalar::<i64>().fetch_one(pool).await
}

pub async fn get_by_slug(pool: &DbPool, slug: &str) -> Result<Option<BlogPost>, sqlx::Error> {
    sqlx::query_as::<_, BlogPost>(&format!("SELECT {COLUMNS} FROM blog_posts WHERE slug = ?"))
        .bind(slug)
        .fetch_optional(pool)
        .await
}

pub async fn get_by_id(pool: &DbPool, id: u64) -> Result<Option<BlogPost>, sqlx::Error> {
    sqlx::query_as::<_, BlogPost>(&format!("SELECT {COLUMNS} FROM blog_posts WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Inserts the post and returns its id
pub async fn create(pool: &DbPool, data: &BlogPostData) -> Result<u64, sqlx::Error> {
    let published_at = data.published.then(Utc::now);
    let result = sqlx::query(
        r#"
        INSERT INTO blog_posts
            (title, slug, excerpt, content, cover_image, tags, published, published_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&data.title)
    .bind(&data.slug)
    .bind(&data.excerpt)
    .bind(&data.content)
    .bind(&data.cover_image)
    .bind(Json(&data.tags))
    .bind(data.published)
    .bind(published_at)
    .execute(pool)
    .await?;

    Ok(result.last_insert_id())
}

/// Full replacement of the editable fields. `published_at` is only set the
/// first time the post is published.
pub async fn update(
    pool: &DbPool,
    id: u64,
    data: &BlogPostData,
) -> Result<Option<BlogPost>, sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE blog_posts
        SET title = ?, slug = ?, excerpt = ?, content = ?, cover_image = ?, tags = ?,
            published = ?,
            published_at = CASE WHEN ? AND published_at IS NULL THEN ? ELSE published_at END,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&data.title)
    .bind(&data.slug)
    .bind(&data.excerpt)
    .bind(&data.content)
    .bind(&data.cover_image)
    .bind(Json(&data.tags))
    .bind(data.published)
    .bind(data.published)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    get_by_id(pool, id).await
}

pub async fn delete(pool: &DbPool, id: u64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM blog_posts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
