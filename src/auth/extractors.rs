use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use crate::auth::jwt::JwtKeys;
use crate::auth::repo::AuthToken;
use crate::error::{ops, ApiError};
use crate::state::AppState;

/// Validates the bearer token and resolves the acting user. Carries the
/// token id as well so logout can revoke the presented session.
pub struct AuthUser {
    pub user_id: Uuid,
    pub token_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(ApiError::Unauthenticated)?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(ApiError::Unauthenticated)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|_| {
            warn!("invalid or expired token");
            ApiError::Unauthenticated
        })?;

        // Revoked tokens still carry a valid signature; the session row is
        // the source of truth.
        let active = AuthToken::is_active(&state.db, claims.jti)
            .await
            .map_err(ApiError::internal(&ops::AUTH))?;
        if !active {
            warn!(user_id = %claims.sub, "token revoked");
            return Err(ApiError::Unauthenticated);
        }

        Ok(AuthUser {
            user_id: claims.sub,
            token_id: claims.jti,
        })
    }
}
