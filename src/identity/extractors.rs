use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::jwt::JwtKeys;
use crate::directory::repo_types::Principal;
use crate::error::ApiError;
use crate::state::AppState;

/// Extracts the bearer session token, verifies it, and loads the live
/// principal. Inactive or deleted principals are rejected even if their
/// session has not yet expired.
pub struct AuthPrincipal(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for AuthPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".into()))?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::Unauthorized("invalid auth scheme".into()))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_session(token).map_err(|_| {
            warn!("invalid or expired session token");
            ApiError::Unauthorized("invalid or expired session token".into())
        })?;

        let principal = Principal::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("principal no longer exists".into()))?;

        if !principal.active {
            return Err(ApiError::Inactive);
        }

        Ok(AuthPrincipal(principal))
    }
}
