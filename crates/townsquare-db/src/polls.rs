use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

const POLL_COLUMNS: &str = "p.id, p.author_id, p.question, p.neighborhood, p.expires_at, p.created_at,
     u.username AS author_username, u.display_name AS author_display_name,
     u.avatar_url AS author_avatar_url, u.neighborhood AS author_neighborhood";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PollRow {
    pub id: i64,
    pub author_id: i64,
    pub question: String,
    pub neighborhood: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub author_username: String,
    pub author_display_name: Option<String>,
    pub author_avatar_url: Option<String>,
    pub author_neighborhood: Option<String>,
}

/// One recorded vote joined with the voter's public profile.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VoteRow {
    pub id: i64,
    pub poll_id: i64,
    pub user_id: i64,
    pub option_label: String,
    pub created_at: DateTime<Utc>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Insert a poll and its ordered options in one transaction.
///
/// Returns [`DbError::Duplicate`] if two options share a label.
pub async fn create_poll(
    pool: &DbPool,
    id: i64,
    author_id: i64,
    question: &str,
    options: &[String],
    neighborhood: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<PollRow, DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO polls (id, author_id, question, neighborhood, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(id)
    .bind(author_id)
    .bind(question)
    .bind(neighborhood)
    .bind(expires_at)
    .execute(&mut *tx)
    .await
    .map_err(DbError::from_write)?;

    for (position, label) in options.iter().enumerate() {
        sqlx::query("INSERT INTO poll_options (poll_id, position, label) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(position as i64)
            .bind(label)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from_write)?;
    }

    tx.commit().await?;

    get_poll(pool, id).await?.ok_or(DbError::NotFound)
}

pub async fn get_poll(pool: &DbPool, id: i64) -> Result<Option<PollRow>, DbError> {
    let sql = format!(
        "SELECT {POLL_COLUMNS}
         FROM polls p
         INNER JOIN users u ON u.id = p.author_id
         WHERE p.id = ?1"
    );
    let row = sqlx::query_as::<_, PollRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Newest polls first, optionally restricted to one neighborhood tag.
pub async fn list_polls(
    pool: &DbPool,
    neighborhood: Option<&str>,
    limit: i64,
) -> Result<Vec<PollRow>, DbError> {
    let sql = format!(
        "SELECT {POLL_COLUMNS}
         FROM polls p
         INNER JOIN users u ON u.id = p.author_id
         WHERE (?1 IS NULL OR p.neighborhood = ?1)
         ORDER BY p.created_at DESC, p.id DESC
         LIMIT ?2"
    );
    let rows = sqlx::query_as::<_, PollRow>(&sql)
        .bind(neighborhood)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Option labels in declaration order.
pub async fn get_poll_options(pool: &DbPool, poll_id: i64) -> Result<Vec<String>, DbError> {
    let labels = sqlx::query_scalar::<_, String>(
        "SELECT label FROM poll_options WHERE poll_id = ?1 ORDER BY position ASC",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;
    Ok(labels)
}

/// Record a vote. The `(poll_id, user_id)` unique constraint decides races:
/// a second vote by the same user fails with [`DbError::Duplicate`] and
/// writes nothing.
pub async fn insert_vote(
    pool: &DbPool,
    poll_id: i64,
    user_id: i64,
    option_label: &str,
) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO poll_votes (poll_id, user_id, option_label)
         VALUES (?1, ?2, ?3)
         RETURNING id",
    )
    .bind(poll_id)
    .bind(user_id)
    .bind(option_label)
    .fetch_one(pool)
    .await
    .map_err(DbError::from_write)?;
    Ok(id)
}

/// All votes for a poll in arrival order.
pub async fn get_poll_votes(pool: &DbPool, poll_id: i64) -> Result<Vec<VoteRow>, DbError> {
    let rows = sqlx::query_as::<_, VoteRow>(
        "SELECT v.id, v.poll_id, v.user_id, v.option_label, v.created_at,
                u.display_name, u.avatar_url
         FROM poll_votes v
         INNER JOIN users u ON u.id = v.user_id
         WHERE v.poll_id = ?1
         ORDER BY v.id ASC",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_user_vote(
    pool: &DbPool,
    poll_id: i64,
    user_id: i64,
) -> Result<Option<String>, DbError> {
    let label = sqlx::query_scalar::<_, String>(
        "SELECT option_label FROM poll_votes WHERE poll_id = ?1 AND user_id = ?2",
    )
    .bind(poll_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(label)
}

pub async fn count_poll_votes(pool: &DbPool, poll_id: i64) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM poll_votes WHERE poll_id = ?1")
        .bind(poll_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
