use axum::{extract::State, routing::get, Json, Router};
use tracing::instrument;

use super::services::DashboardView;
use crate::{auth::extractors::CurrentSession, error::AppError, state::AppState};

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard))
}

#[instrument(skip(state, session), fields(role = %session.0.user.role))]
pub async fn dashboard(
    State(state): State<AppState>,
    session: CurrentSession,
) -> Result<Json<DashboardView>, AppError> {
    let user = &session.0.user;
    Ok(Json(user.role.dashboard().render(&state, user).await?))
}
