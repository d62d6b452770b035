//! Movement-pass lifecycle.
//!
//! ```text
//! (none) --submit--> pending
//! pending --approve--> approved        pending --reject--> rejected
//! approved --start | valid_until--> active --valid_until--> completed
//! ```
//!
//! Expiry is applied lazily whenever a pass is read and by the periodic sweeper.

use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use super::dto::SubmitPassRequest;
use super::repo_types::{
    Decision, MovementPass, PassStatus, DESTINATIONS, DURATION_STEP_MINUTES, MAX_DURATION_MINUTES,
    MIN_DURATION_MINUTES, REASONS,
};
use crate::attendance::repo_types::GeoPoint;
use crate::auth::repo_types::{Role, User};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn validate_request(req: &SubmitPassRequest) -> AppResult<()> {
    if req.reason.trim().is_empty() || !REASONS.contains(&req.reason.as_str()) {
        return Err(AppError::Validation(format!("unknown reason {:?}", req.reason)));
    }
    if req.destination.trim().is_empty() || !DESTINATIONS.contains(&req.destination.as_str()) {
        return Err(AppError::Validation(format!("unknown destination {:?}", req.destination)));
    }
    let d = req.duration_minutes;
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&d) || d % DURATION_STEP_MINUTES != 0 {
        return Err(AppError::Validation(format!(
            "duration must be {MIN_DURATION_MINUTES}-{MAX_DURATION_MINUTES} minutes in steps of {DURATION_STEP_MINUTES}"
        )));
    }
    Ok(())
}

/// Applies time-driven transitions. Returns true when the pass changed.
pub fn advance(pass: &mut MovementPass, now: OffsetDateTime) -> bool {
    if now < pass.valid_until {
        return false;
    }
    match pass.status {
        PassStatus::Approved | PassStatus::Active => {
            if pass.status == PassStatus::Approved {
                debug!(pass_id = %pass.id, "approved pass reached valid_until before start; completing");
            }
            pass.status = PassStatus::Completed;
            pass.tracking = false;
            true
        }
        _ => false,
    }
}

pub async fn submit_request(st: &AppState, student: &User, req: SubmitPassRequest) -> AppResult<MovementPass> {
    if student.role != Role::Student {
        return Err(AppError::Forbidden("only students request movement passes".into()));
    }
    validate_request(&req)?;

    // expire anything stale first so an elapsed pass does not block a new request
    list_for_student(st, student.id).await?;

    let now = st.clock.now_utc();
    let pass = MovementPass {
        id: Uuid::new_v4(),
        student_id: student.id,
        reason: req.reason,
        destination: req.destination,
        request_time: now,
        valid_until: now + Duration::minutes(req.duration_minutes),
        status: PassStatus::Pending,
        approved_by: None,
        tracking: false,
        location: None,
    };
    st.passes.insert(&pass).await?;
    info!(pass_id = %pass.id, student_id = %student.id, destination = %pass.destination, "movement pass requested");
    Ok(pass)
}

/// Loads a pass with expiry applied and persisted.
pub async fn get_fresh(st: &AppState, id: Uuid) -> AppResult<MovementPass> {
    let mut pass = st.passes.get(id).await?.ok_or(AppError::NotFound("movement pass"))?;
    refresh(st, &mut pass).await?;
    Ok(pass)
}

async fn refresh(st: &AppState, pass: &mut MovementPass) -> AppResult<bool> {
    let before = pass.status;
    if !advance(pass, st.clock.now_utc()) {
        return Ok(false);
    }
    if st.passes.update_if(pass, before).await? {
        info!(pass_id = %pass.id, from = %before, to = %pass.status, "movement pass expired");
        Ok(true)
    } else {
        // someone else moved it; take theirs
        *pass = st.passes.get(pass.id).await?.ok_or(AppError::NotFound("movement pass"))?;
        Ok(false)
    }
}

async fn transition(st: &AppState, pass: &MovementPass, from: PassStatus, action: &'static str) -> AppResult<()> {
    if st.passes.update_if(pass, from).await? {
        return Ok(());
    }
    let current = st.passes.get(pass.id).await?.ok_or(AppError::NotFound("movement pass"))?;
    Err(AppError::invalid_transition(current.status, action))
}

pub async fn decide(st: &AppState, approver: &User, pass_id: Uuid, decision: Decision) -> AppResult<MovementPass> {
    if !approver.role.can_approve_passes() {
        return Err(AppError::Forbidden(format!("role {} cannot decide passes", approver.role)));
    }
    let mut pass = get_fresh(st, pass_id).await?;
    if pass.student_id == approver.id {
        return Err(AppError::Forbidden("cannot decide your own movement pass".into()));
    }
    if pass.status != PassStatus::Pending {
        return Err(AppError::invalid_transition(pass.status, "decide"));
    }

    match decision {
        Decision::Approve => {
            pass.status = PassStatus::Approved;
            pass.approved_by = Some(approver.id);
            pass.tracking = true;
        }
        Decision::Reject => {
            pass.status = PassStatus::Rejected;
            pass.approved_by = Some(approver.id);
        }
    }
    // approved after its window already closed: nothing left to track
    advance(&mut pass, st.clock.now_utc());
    transition(st, &pass, PassStatus::Pending, "decide").await?;
    info!(pass_id = %pass.id, approver_id = %approver.id, status = %pass.status, "movement pass decided");
    Ok(pass)
}

pub async fn start(st: &AppState, user: &User, pass_id: Uuid) -> AppResult<MovementPass> {
    let mut pass = get_fresh(st, pass_id).await?;
    if pass.student_id != user.id && !user.role.can_approve_passes() {
        return Err(AppError::Forbidden("not your movement pass".into()));
    }
    if pass.status != PassStatus::Approved {
        return Err(AppError::invalid_transition(pass.status, "start"));
    }
    pass.status = PassStatus::Active;
    transition(st, &pass, PassStatus::Approved, "start").await?;
    info!(pass_id = %pass.id, "movement pass started");
    Ok(pass)
}

pub async fn record_location(st: &AppState, user: &User, pass_id: Uuid, point: GeoPoint) -> AppResult<MovementPass> {
    let mut pass = get_fresh(st, pass_id).await?;
    if pass.student_id != user.id {
        return Err(AppError::Forbidden("not your movement pass".into()));
    }
    if pass.status != PassStatus::Active || !pass.tracking {
        return Err(AppError::invalid_transition(pass.status, "record location"));
    }
    pass.location = Some(point);
    transition(st, &pass, PassStatus::Active, "record location").await?;
    Ok(pass)
}

pub async fn list_for_student(st: &AppState, student_id: Uuid) -> AppResult<Vec<MovementPass>> {
    let mut passes = st.passes.list_for_student(student_id).await?;
    for pass in passes.iter_mut() {
        refresh(st, pass).await?;
    }
    Ok(passes)
}

pub async fn open_pass(st: &AppState, student_id: Uuid) -> AppResult<Option<MovementPass>> {
    Ok(list_for_student(st, student_id)
        .await?
        .into_iter()
        .find(|p| p.status.is_open()))
}

pub async fn list_pending(st: &AppState) -> AppResult<Vec<MovementPass>> {
    Ok(st.passes.list_by_status(&[PassStatus::Pending]).await?)
}

/// Completes every approved or active pass past its validity. Returns how many changed.
pub async fn sweep(st: &AppState) -> AppResult<usize> {
    let mut changed = 0;
    for mut pass in st
        .passes
        .list_by_status(&[PassStatus::Approved, PassStatus::Active])
        .await?
    {
        if refresh(st, &mut pass).await? {
            changed += 1;
        }
    }
    Ok(changed)
}
