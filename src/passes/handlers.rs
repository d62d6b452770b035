use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{DecisionRequest, PassCatalog, PassList, SubmitPassRequest};
use super::repo_types::{MovementPass, DESTINATIONS, REASONS};
use super::services;
use crate::{
    attendance::repo_types::GeoPoint, auth::extractors::CurrentSession, error::AppError, state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/passes", get(list_mine))
        .route("/passes/pending", get(list_pending))
        .route("/passes/catalog", get(catalog))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/passes", post(submit))
        .route("/passes/:id/decision", post(decide))
        .route("/passes/:id/start", post(start))
        .route("/passes/:id/location", post(record_location))
}

#[instrument(skip(state, session, req), fields(user_id = %session.0.user.id))]
pub async fn submit(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(req): Json<SubmitPassRequest>,
) -> Result<(StatusCode, HeaderMap, Json<MovementPass>), AppError> {
    let pass = services::submit_request(&state, &session.0.user, req).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/passes/{}", pass.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(pass)))
}

#[instrument(skip(state, session))]
pub async fn list_mine(State(state): State<AppState>, session: CurrentSession) -> Result<Json<PassList>, AppError> {
    let history = services::list_for_student(&state, session.0.user.id).await?;
    let open = history.iter().find(|p| p.status.is_open()).cloned();
    Ok(Json(PassList { open, history }))
}

#[instrument(skip(state, session))]
pub async fn list_pending(
    State(state): State<AppState>,
    session: CurrentSession,
) -> Result<Json<Vec<MovementPass>>, AppError> {
    session.require_role(|r| r.can_approve_passes())?;
    Ok(Json(services::list_pending(&state).await?))
}

pub async fn catalog() -> Json<PassCatalog> {
    Json(PassCatalog {
        reasons: REASONS,
        destinations: DESTINATIONS,
    })
}

#[instrument(skip(state, session, req))]
pub async fn decide(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<MovementPass>, AppError> {
    Ok(Json(services::decide(&state, &session.0.user, id, req.action).await?))
}

#[instrument(skip(state, session))]
pub async fn start(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Json<MovementPass>, AppError> {
    Ok(Json(services::start(&state, &session.0.user, id).await?))
}

#[instrument(skip(state, session, point))]
pub async fn record_location(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(id): Path<Uuid>,
    Json(point): Json<GeoPoint>,
) -> Result<Json<MovementPass>, AppError> {
    Ok(Json(services::record_location(&state, &session.0.user, id, point).await?))
}
