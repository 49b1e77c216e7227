pub mod error;
pub mod middleware;
pub mod routes;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use townsquare_core::AppState;

/// Poll bodies are a question and a handful of labels.
const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/polls",
            get(routes::polls::list_polls).post(routes::polls::create_poll),
        )
        .route("/api/v1/polls/{poll_id}", get(routes::polls::get_poll))
        .route(
            "/api/v1/polls/{poll_id}/vote",
            post(routes::polls::cast_vote).get(routes::polls::get_poll),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
