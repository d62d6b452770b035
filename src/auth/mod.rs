use crate::state::AppState;
use axum::Router;

pub mod directory;
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
