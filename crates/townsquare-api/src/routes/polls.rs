use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use townsquare_core::AppState;
use townsquare_models::poll::{
    CastVoteRequest, CreatePollRequest, PollSummary, PollView, VoteReceipt,
};

use crate::error::ApiError;
use crate::middleware::{AuthUser, MaybeAuthUser};

/// Poll ids are snowflakes; anything that does not parse cannot exist.
fn parse_poll_id(raw: &str) -> Result<i64, ApiError> {
    raw.trim().parse::<i64>().map_err(|_| ApiError::NotFound)
}

#[derive(Debug, Default, Deserialize)]
pub struct ListPollsQuery {
    pub neighborhood: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_polls(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Query(query): Query<ListPollsQuery>,
) -> Result<Json<Vec<PollSummary>>, ApiError> {
    let polls = townsquare_core::poll::list_polls(
        &state.db,
        viewer,
        query.neighborhood.as_deref(),
        query.limit,
    )
    .await?;
    Ok(Json(polls))
}

pub async fn create_poll(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<CreatePollRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PollView>), ApiError> {
    let Json(body) = payload?;
    let poll = townsquare_core::poll::create_poll(
        &state.db,
        townsquare_core::next_id(),
        auth.user_id,
        &body,
        Utc::now(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(poll)))
}

pub async fn get_poll(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(poll_id): Path<String>,
) -> Result<Json<PollView>, ApiError> {
    let poll_id = parse_poll_id(&poll_id)?;
    let view = townsquare_core::poll::get_poll_state(&state.db, poll_id, viewer).await?;
    Ok(Json(view))
}

pub async fn cast_vote(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(poll_id): Path<String>,
    payload: Result<Json<CastVoteRequest>, JsonRejection>,
) -> Result<Json<VoteReceipt>, ApiError> {
    let Json(body) = payload?;
    let option = body
        .option
        .filter(|o| !o.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Option is required".into()))?;
    let poll_id = parse_poll_id(&poll_id)?;

    let receipt =
        townsquare_core::poll::cast_vote(&state.db, poll_id, auth.user_id, &option, Utc::now())
            .await?;
    Ok(Json(receipt))
}
