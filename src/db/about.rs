use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::collections::BTreeMap;

use super::DbPool;

/// The profile is a single row
const PROFILE_ID: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperienceEntry {
    pub company: String,
    pub role: String,
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AboutProfile {
    pub name: String,
    pub headline: String,
    pub bio: String,
    pub avatar_url: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub skills: Json<Vec<String>>,
    pub experience: Json<Vec<ExperienceEntry>>,
    pub social_links: Json<BTreeMap<String, String>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AboutData {
    pub name: String,
    pub headline: String,
    pub bio: String,
    pub avatar_url: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub skills: Vec<String>,
    pub experience: Vec<ExperienceEntry>,
    pub social_links: BTreeMap<String, String>,
}

pub async fn get(pool: &DbPool) -> Result<Option<AboutProfile>, sqlx::Error> {
    sqlx::query_as::<_, AboutProfile>(
        r#"
        SELECT name, headline, bio, avatar_url, location, email, skills, experience,
               social_links, updated_at
        FROM about
        WHERE id = ?
        "#,
    )
    .bind(PROFILE_ID)
    .fetch_optional(pool)
    .await
}

pub async fn upsert(pool: &DbPool, data: &AboutData) -> Result<AboutProfile, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO about
            (id, name, headline, bio, avatar_url, location, email, skills, experience, social_links)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            name = VALUES(name),
            headline = VALUES(headline),
            bio = VALUES(bio),
            avatar_url = VALUES(avatar_url),
            location = VALUES(location),
            email = VALUES(email),
            skills = VALUES(skills),
            experience = VALUES(experience),
            social_links = VALUES(social_links),
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(PROFILE_ID)
    .bind(&data.name)
    .bind(&data.headline)
    .bind(&data.bio)
    .bind(&data.avatar_url)
    .bind(&data.location)
    .bind(&data.email)
    .bind(Json(&data.skills))
    .bind(Json(&data.experience))
    .bind(Json(&data.social_links))
    .execute(pool)
    .await?;

    get(pool).await?.ok_or(sqlx::Error::RowNotFound)
}
