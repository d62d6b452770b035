use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;

use super::repo_types::Alert;
use super::services;
use crate::{auth::extractors::CurrentSession, error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/alerts", get(list))
        .route("/alerts/:id/read", post(acknowledge))
}

#[instrument(skip(state, session))]
pub async fn list(State(state): State<AppState>, session: CurrentSession) -> Result<Json<Vec<Alert>>, AppError> {
    Ok(Json(services::alerts_for(&state, &session.0.user).await?))
}

#[instrument(skip(state, session))]
pub async fn acknowledge(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if id.trim().is_empty() || id.len() > 200 {
        return Err(AppError::Validation("invalid alert id".into()));
    }
    services::acknowledge(&state, session.0.user.id, &id).await?;
    Ok(Json(json!({ "success": true })))
}
