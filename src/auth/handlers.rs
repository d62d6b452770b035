use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, SwitchRoleRequest},
        extractors::CurrentSession,
        services,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/role", post(switch_role))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (access_token, record) = services::login(&state, &payload.email, &payload.password).await?;
    Ok(Json(AuthResponse {
        access_token,
        user: PublicUser::from(&record.user),
    }))
}

#[instrument(skip(state, session))]
pub async fn logout(
    State(state): State<AppState>,
    session: CurrentSession,
) -> Result<Json<Value>, AppError> {
    services::logout(&state, &session.0).await?;
    Ok(Json(json!({ "success": true })))
}

#[instrument(skip(state, session, payload))]
pub async fn switch_role(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(payload): Json<SwitchRoleRequest>,
) -> Result<Json<PublicUser>, AppError> {
    let record = services::switch_role(&state, session.0, payload.role).await?;
    Ok(Json(PublicUser::from(&record.user)))
}

#[instrument(skip(session))]
pub async fn get_me(session: CurrentSession) -> Json<PublicUser> {
    Json(PublicUser::from(&session.0.user))
}
