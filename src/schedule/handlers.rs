use axum::{extract::State, routing::get, Json, Router};
use tracing::instrument;

use super::dto::TodaySchedule;
use super::services::{current_slot, next_slot};
use crate::{auth::extractors::CurrentSession, state::AppState};

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/schedule/today", get(today))
}

pub fn today_schedule(state: &AppState) -> TodaySchedule {
    let now = state.school_now();
    let clock = state.clock_time(now);
    let slots = state.timetable.for_date(now.date());
    TodaySchedule {
        date: now.date(),
        now: clock,
        slots: slots.to_vec(),
        current: current_slot(slots, clock).cloned(),
        next: next_slot(slots, clock).cloned(),
    }
}

#[instrument(skip(state, _session))]
pub async fn today(State(state): State<AppState>, _session: CurrentSession) -> Json<TodaySchedule> {
    Json(today_schedule(&state))
}
