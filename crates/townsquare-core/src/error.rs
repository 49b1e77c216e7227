use thiserror::Error;
use townsquare_db::DbError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("'{0}' is not an option of this poll")]
    InvalidOption(String),
    #[error("user already voted on this poll")]
    AlreadyVoted,
    #[error("poll has expired")]
    PollExpired,
    #[error("database error: {0}")]
    Database(DbError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DbError> for CoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => CoreError::NotFound,
            other => CoreError::Database(other),
        }
    }
}
