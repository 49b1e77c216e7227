use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use townsquare_core::AppState;

use crate::error::ApiError;

/// An authenticated caller. Rejects with 401 when no valid bearer token is
/// present.
pub struct AuthUser {
    pub user_id: i64,
}

/// A caller that may be anonymous. A missing `Authorization` header yields
/// `None`; a present but invalid token is still a 401.
pub struct MaybeAuthUser(pub Option<i64>);

fn bearer_token(parts: &Parts) -> Option<Result<&str, ApiError>> {
    let raw = parts.headers.get(header::AUTHORIZATION)?;
    let token = raw
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized);
    Some(token)
}

async fn validate_auth(token: &str, state: &AppState) -> Result<i64, ApiError> {
    let claims = townsquare_core::auth::validate_token(token, &state.config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized)?;

    // Tokens for users that no longer exist are not an identity.
    townsquare_db::users::get_user_by_id(&state.db, claims.sub)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok(claims.sub)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)??;
        let user_id = validate_auth(token, state).await?;
        Ok(AuthUser { user_id })
    }
}

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            None => Ok(MaybeAuthUser(None)),
            Some(token) => {
                let user_id = validate_auth(token?, state).await?;
                Ok(MaybeAuthUser(Some(user_id)))
            }
        }
    }
}
