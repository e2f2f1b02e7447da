use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{MySql, QueryBuilder};

use super::DbPool;

const COLUMNS: &str = "id, title, slug, description, content, tech_stack, github_url, live_url, \
                       image_url, featured, sort_order, created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Project {
    pub id: u64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub content: Option<String>,
    pub tech_stack: Json<Vec<String>>,
    pub github_url: Option<String>,
    pub live_url: Option<String>,
    pub image_url: Option<String>,
    pub featured: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProjectData {
    pub title: String,
    pub slug: String,
    pub description: String,
    pub content: Option<String>,
    pub tech_stack: Vec<String>,
    pub github_url: Option<String>,
    pub live_url: Option<String>,
    pub image_url: Option<String>,
    pub featured: bool,
    pub sort_order: i32,
}

fn push_filters(qb: &mut QueryBuilder<'_, MySql>, featured: Option<bool>) {
    if let Some(featured) = featured {
        qb.push(" WHERE featured = ").push_bind(featured);
    }
}

pub async fn list(
    pool: &DbPool,
    featured: Option<bool>,
    limit: u32,
    offset: u64,
) -> Result<Vec<Project>, sqlx::Error> {
    let mut qb = QueryBuilder::<MySql>::new(format!("SELECT {COLUMNS} FROM projects"));
    push_filters(&mut qb, featured);
    qb.push(" ORDER BY sort_order ASC, created_at DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    qb.build_query_as::<Project>().fetch_all(pool).await
}

pub async fn count(pool: &DbPool, featured: Option<bool>) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM projects");
    push_filters(&mut qb, featured);
    qb.build_query_scalar::<i64>().fetch_one(pool).await
}

pub async fn get_by_slug(pool: &DbPool, slug: &str) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(&format!("SELECT {COLUMNS} FROM projects WHERE slug = ?"))
        .bind(slug)
        .fetch_optional(pool)
        .await
}

pub async fn get_by_id(pool: &DbPool, id: u64) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(&format!("SELECT {COLUMNS} FROM projects WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Inserts the project and returns its id
pub async fn create(pool: &DbPool, data: &ProjectData) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO projects
            (title, slug, description, content, tech_stack, github_url, live_url,
             image_url, featured, sort_order)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&data.title)
    .bind(&data.slug)
    .bind(&data.description)
    .bind(&data.content)
    .bind(Json(&data.tech_stack))
    .bind(&data.github_url)
    .bind(&data.live_url)
    .bind(&data.image_url)
    .bind(data.featured)
    .bind(data.sort_order)
    .execute(pool)
    .await?;

    Ok(result.last_insert_id())
}

pub async fn update(
    pool: &DbPool,
    id: u64,
    data: &ProjectData,
) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE projects
        SET title = ?, slug = ?, description = ?, content = ?, tech_stack = ?,
            github_url = ?, live_url = ?, image_url = ?, featured = ?, sort_order = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&data.title)
    .bind(&data.slug)
    .bind(&data.description)
    .bind(&data.content)
    .bind(Json(&data.tech_stack))
    .bind(&data.github_url)
    .bind(&data.live_url)
    .bind(&data.image_url)
    .bind(data.featured)
    .bind(data.sort_order)
    .bind(id)
    .execute(pool)
    .await?;

    get_by_id(pool, id).await
}

pub async fn delete(pool: &DbPool, id: u64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
