use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::dto::{CancelResponse, MarkRequest, MarkResponse};
use super::machine::MarkingState;
use super::repo_types::AttendanceRecord;
use super::services;
use crate::{auth::extractors::CurrentSession, error::AppError, state::AppState};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/attendance/status", get(status))
        .route("/attendance/today", get(today))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/attendance/mark", post(mark))
        .route("/attendance/cancel", post(cancel))
}

#[instrument(skip(state, session, req), fields(user_id = %session.0.user.id))]
pub async fn mark(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(req): Json<MarkRequest>,
) -> Result<Json<MarkResponse>, AppError> {
    let record = services::mark_attendance(&state, &session.0.user, req).await?;
    Ok(Json(MarkResponse {
        success: true,
        record,
    }))
}

#[instrument(skip(state, session))]
pub async fn status(State(state): State<AppState>, session: CurrentSession) -> Json<MarkingState> {
    Json(state.marker.status(session.0.user.id))
}

#[instrument(skip(state, session))]
pub async fn cancel(State(state): State<AppState>, session: CurrentSession) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.marker.cancel(session.0.user.id),
    })
}

#[instrument(skip(state, session))]
pub async fn today(
    State(state): State<AppState>,
    session: CurrentSession,
) -> Result<Json<Vec<AttendanceRecord>>, AppError> {
    Ok(Json(services::today_for(&state, session.0.user.id).await?))
}
