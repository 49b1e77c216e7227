use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub neighborhood: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn create_user(
    pool: &DbPool,
    id: i64,
    username: &str,
    display_name: Option<&str>,
    avatar_url: Option<&str>,
    neighborhood: Option<&str>,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (id, username, display_name, avatar_url, neighborhood)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING id, username, display_name, avatar_url, neighborhood, created_at",
    )
    .bind(id)
    .bind(username.trim())
    .bind(display_name)
    .bind(avatar_url)
    .bind(neighborhood)
    .fetch_one(pool)
    .await
    .map_err(DbError::from_write)?;
    Ok(row)
}

pub async fn get_user_by_id(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, display_name, avatar_url, neighborhood, created_at
         FROM users WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
