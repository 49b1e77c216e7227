pub mod auth;
pub mod error;
pub mod poll;
pub mod tally;
pub mod user;

use townsquare_db::DbPool;

/// Worker id stamped into every snowflake minted by this process.
pub const SNOWFLAKE_WORKER_ID: u16 = 1;

/// Mint a new row id for polls and users.
pub fn next_id() -> i64 {
    townsquare_util::snowflake::generate(SNOWFLAKE_WORKER_ID)
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
}
