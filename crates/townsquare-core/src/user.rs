use townsquare_db::users::UserRow;
use townsquare_db::{DbError, DbPool};
use townsquare_models::user::User;

use crate::error::CoreError;

pub const MAX_USERNAME_LEN: usize = 32;

pub fn user_to_model(row: &UserRow) -> User {
    User {
        id: row.id.to_string(),
        username: row.username.clone(),
        name: row.display_name.clone(),
        image: row.avatar_url.clone(),
        neighborhood: row.neighborhood.clone(),
        created_at: row.created_at,
    }
}

/// Register a user record so votes and polls can be attributed to it.
pub async fn provision_user(
    pool: &DbPool,
    id: i64,
    username: &str,
    display_name: Option<&str>,
    avatar_url: Option<&str>,
    neighborhood: Option<&str>,
) -> Result<User, CoreError> {
    let username = username.trim();
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(CoreError::BadRequest(format!(
            "Username must be between 1 and {MAX_USERNAME_LEN} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(CoreError::BadRequest(
            "Username may only contain letters, digits, '.', '_' and '-'".into(),
        ));
    }

    fn clean(v: Option<&str>) -> Option<&str> {
        v.map(str::trim).filter(|v| !v.is_empty())
    }
    let row = townsquare_db::users::create_user(
        pool,
        id,
        username,
        clean(display_name),
        clean(avatar_url),
        clean(neighborhood),
    )
    .await
    .map_err(|e| match e {
        DbError::Duplicate => CoreError::BadRequest(format!("Username '{username}' is taken")),
        other => other.into(),
    })?;

    tracing::info!(user_id = row.id, username = %row.username, "user provisioned");
    Ok(user_to_model(&row))
}
