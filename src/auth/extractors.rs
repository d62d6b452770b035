use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::repo_types::{Role, SessionRecord};
use super::services::{load_session, JwtKeys};
use crate::error::AppError;
use crate::state::AppState;

/// Session context resolved from the bearer token.
pub struct CurrentSession(pub SessionRecord);

impl CurrentSession {
    pub fn require_role(&self, allowed: impl Fn(Role) -> bool) -> Result<(), AppError> {
        let role = self.0.user.role;
        if allowed(role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("not permitted for role {role}")))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AppError::NotAuthenticated)?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(AppError::NotAuthenticated)?;

        let claims = JwtKeys::from_ref(state)
            .verify(token, state.clock.now_utc())
            .map_err(|_| {
            warn!("invalid or expired token");
            AppError::NotAuthenticated
        })?;

        let record = load_session(state, claims.sid)
            .await?
            .filter(|r| r.user.id == claims.sub)
            .ok_or(AppError::NotAuthenticated)?;

        Ok(CurrentSession(record))
    }
}
