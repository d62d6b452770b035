//! Per-student attendance marking state machine.
//!
//! `idle -> processing -> success | error`. A terminal state is replaced by the
//! next run; starting a run while one is processing is refused. Runs can be
//! cancelled, and a run whose future is dropped returns the student to idle.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::checks::{CheckOutcome, DeviceAttestor, GeofenceChecker, MarkContext, TimeWindowChecker};
use super::flow::DeviceGrants;
use super::repo::AttendanceRepo;
use super::repo_types::{AttendanceRecord, AttendanceStatus, Method};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum MarkingState {
    Idle,
    Processing {
        method: Method,
        class_id: String,
        #[serde(with = "time::serde::rfc3339")]
        started_at: OffsetDateTime,
    },
    Success {
        record: AttendanceRecord,
    },
    Error {
        code: &'static str,
        reason: String,
    },
}

struct Run {
    state: MarkingState,
    cancel: Option<CancellationToken>,
}

pub struct VerificationChecks {
    pub geofence: Arc<dyn GeofenceChecker>,
    pub window: Arc<dyn TimeWindowChecker>,
    pub device: Arc<dyn DeviceAttestor>,
}

pub struct AttendanceMarker {
    checks: VerificationChecks,
    repo: Arc<dyn AttendanceRepo>,
    timeout: std::time::Duration,
    late_after: time::Duration,
    runs: RwLock<HashMap<Uuid, Run>>,
}

/// Resets a student to idle if the run is abandoned before it finishes.
struct RunGuard<'a> {
    marker: &'a AttendanceMarker,
    student_id: Uuid,
    token: CancellationToken,
    finished: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.token.cancel();
            self.marker.set(self.student_id, MarkingState::Idle, None);
        }
    }
}

impl AttendanceMarker {
    pub fn new(
        checks: VerificationChecks,
        repo: Arc<dyn AttendanceRepo>,
        timeout: std::time::Duration,
        late_after: time::Duration,
    ) -> Self {
        Self {
            checks,
            repo,
            timeout,
            late_after,
            runs: RwLock::new(HashMap::new()),
        }
    }

    pub fn status(&self, student_id: Uuid) -> MarkingState {
        self.runs
            .read()
            .unwrap()
            .get(&student_id)
            .map(|r| r.state.clone())
            .unwrap_or(MarkingState::Idle)
    }

    /// Cancels the student's in-flight run. Returns false when nothing was processing.
    pub fn cancel(&self, student_id: Uuid) -> bool {
        let runs = self.runs.read().unwrap();
        match runs.get(&student_id).and_then(|r| r.cancel.as_ref()) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn set(&self, student_id: Uuid, state: MarkingState, cancel: Option<CancellationToken>) {
        self.runs
            .write()
            .unwrap()
            .insert(student_id, Run { state, cancel });
    }

    fn begin(&self, ctx: &MarkContext, method: Method) -> AppResult<CancellationToken> {
        let mut runs = self.runs.write().unwrap();
        if let Some(Run {
            state: MarkingState::Processing { .. },
            ..
        }) = runs.get(&ctx.student_id)
        {
            return Err(AppError::invalid_transition("processing", "mark"));
        }
        let token = CancellationToken::new();
        runs.insert(
            ctx.student_id,
            Run {
                state: MarkingState::Processing {
                    method,
                    class_id: ctx.class.id.clone(),
                    started_at: ctx.at,
                },
                cancel: Some(token.clone()),
            },
        );
        Ok(token)
    }

    pub async fn mark(&self, ctx: MarkContext, method: Method, grants: &DeviceGrants) -> AppResult<AttendanceRecord> {
        let token = self.begin(&ctx, method)?;
        let mut guard = RunGuard {
            marker: self,
            student_id: ctx.student_id,
            token: token.clone(),
            finished: false,
        };

        let result = self.run(&ctx, method, grants, &token).await;
        guard.finished = true;

        match &result {
            Err(AppError::Cancelled) => {
                info!(student_id = %ctx.student_id, class_id = %ctx.class.id, "marking cancelled");
                self.set(ctx.student_id, MarkingState::Idle, None);
            }
            Ok(record) => {
                info!(
                    student_id = %ctx.student_id,
                    class_id = %ctx.class.id,
                    status = record.status.as_str(),
                    method = method.as_str(),
                    "attendance marked"
                );
                self.set(
                    ctx.student_id,
                    MarkingState::Success {
                        record: record.clone(),
                    },
                    None,
                );
            }
            Err(e) => {
                warn!(student_id = %ctx.student_id, class_id = %ctx.class.id, error = %e, "marking failed");
                let reason = match e {
                    AppError::Internal(_) => "internal error".to_string(),
                    other => other.to_string(),
                };
                self.set(
                    ctx.student_id,
                    MarkingState::Error {
                        code: e.code(),
                        reason,
                    },
                    None,
                );
            }
        }
        result
    }

    async fn run(
        &self,
        ctx: &MarkContext,
        method: Method,
        grants: &DeviceGrants,
        token: &CancellationToken,
    ) -> AppResult<AttendanceRecord> {
        if self
            .repo
            .find(ctx.student_id, &ctx.class.id, ctx.date)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyMarked);
        }

        method.flow().prepare(grants)?;

        let checks = async {
            tokio::join!(
                self.checks.geofence.check(ctx),
                self.checks.window.check(ctx),
                self.checks.device.attest(ctx),
            )
        };

        let (geofence, window, device) = tokio::select! {
            _ = token.cancelled() => return Err(AppError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, checks) => match outcome {
                Ok(results) => results,
                Err(_) => {
                    return Err(AppError::VerificationFailure {
                        check: "timeout",
                        reason: format!("checks did not finish within {} ms", self.timeout.as_millis()),
                    })
                }
            },
        };

        for (check, outcome) in [("geofence", geofence?), ("time-window", window?), ("device", device?)] {
            if let CheckOutcome {
                passed: false,
                reason,
            } = outcome
            {
                return Err(AppError::VerificationFailure {
                    check,
                    reason: reason.unwrap_or_else(|| "rejected".into()),
                });
            }
        }

        if token.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let status = if ctx.now >= ctx.class.start.shifted(self.late_after) {
            AttendanceStatus::Late
        } else {
            AttendanceStatus::Present
        };
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: ctx.student_id,
            class_id: ctx.class.id.clone(),
            date: ctx.date,
            status,
            method,
            timestamp: ctx.at,
            location: ctx.location,
            device_id: ctx.device_id.clone(),
        };
        self.repo.insert(&record).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::checks::{ClassTimeWindow, RadiusGeofence, RegisteredDevices};
    use crate::attendance::flow::Grant;
    use crate::attendance::repo::InMemoryAttendanceRepo;
    use crate::attendance::repo_types::GeoPoint;
    use crate::auth::directory::ALEX_ID;
    use crate::error::Capability;
    use crate::schedule::repo_types::{SlotKind, TimeSlot};
    use async_trait::async_trait;
    use time::macros::{date, datetime};
    use tokio::sync::Notify;

    const CAMPUS: GeoPoint = GeoPoint { lat: 40.7128, lng: -74.0060 };

    fn ctx(now: &str) -> MarkContext {
        MarkContext {
            student_id: ALEX_ID,
            class: TimeSlot {
                id: "math".into(),
                subject: "Mathematics".into(),
                teacher: "Dr. Smith".into(),
                room: "Room 101".into(),
                start: "09:00".parse().unwrap(),
                end: "10:00".parse().unwrap(),
                kind: SlotKind::Class,
            },
            date: date!(2024 - 01 - 15),
            now: now.parse().unwrap(),
            at: datetime!(2024-01-15 09:05 UTC),
            location: Some(CAMPUS),
            device_id: "device-alex-01".into(),
        }
    }

    fn granted() -> DeviceGrants {
        DeviceGrants {
            camera: Grant::Granted,
            bluetooth: Grant::Granted,
            geolocation: Grant::Granted,
        }
    }

    fn real_marker() -> AttendanceMarker {
        let repo: Arc<dyn AttendanceRepo> = Arc::new(InMemoryAttendanceRepo::new());
        AttendanceMarker::new(
            VerificationChecks {
                geofence: Arc::new(RadiusGeofence {
                    campus: CAMPUS,
                    rooms: HashMap::new(),
                    radius_m: 150.0,
                }),
                window: Arc::new(ClassTimeWindow {
                    open_before: time::Duration::minutes(10),
                }),
                device: Arc::new(RegisteredDevices::seeded(repo.clone())),
            },
            repo,
            std::time::Duration::from_secs(5),
            time::Duration::minutes(10),
        )
    }

    /// Geofence that parks until released, to observe the processing state.
    struct GatedGeofence(Arc<Notify>);

    #[async_trait]
    impl GeofenceChecker for GatedGeofence {
        async fn check(&self, _ctx: &MarkContext) -> anyhow::Result<CheckOutcome> {
            self.0.notified().await;
            Ok(CheckOutcome::pass())
        }
    }

    fn gated_marker(gate: Arc<Notify>, timeout: std::time::Duration) -> AttendanceMarker {
        let repo: Arc<dyn AttendanceRepo> = Arc::new(InMemoryAttendanceRepo::new());
        AttendanceMarker::new(
            VerificationChecks {
                geofence: Arc::new(GatedGeofence(gate)),
                window: Arc::new(ClassTimeWindow {
                    open_before: time::Duration::minutes(10),
                }),
                device: Arc::new(RegisteredDevices::seeded(repo.clone())),
            },
            repo,
            timeout,
            time::Duration::minutes(10),
        )
    }

    #[tokio::test]
    async fn success_records_present() {
        let marker = real_marker();
        assert_eq!(marker.status(ALEX_ID), MarkingState::Idle);
        let record = marker.mark(ctx("09:05"), Method::CodeScan, &granted()).await.unwrap();
        assert_eq!(record.status, AttendanceStatus::Present);
        assert!(matches!(marker.status(ALEX_ID), MarkingState::Success { .. }));
    }

    #[tokio::test]
    async fn late_after_threshold() {
        let marker = real_marker();
        let record = marker.mark(ctx("09:10"), Method::Manual, &granted()).await.unwrap();
        assert_eq!(record.status, AttendanceStatus::Late);
    }

    #[tokio::test]
    async fn second_mark_same_class_is_rejected() {
        let marker = real_marker();
        marker.mark(ctx("09:05"), Method::Face, &granted()).await.unwrap();
        let err = marker.mark(ctx("09:06"), Method::Face, &granted()).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyMarked));
        assert_eq!(
            marker.status(ALEX_ID),
            MarkingState::Error {
                code: "already_marked",
                reason: AppError::AlreadyMarked.to_string()
            }
        );
    }

    #[tokio::test]
    async fn failing_check_is_error_state() {
        let marker = real_marker();
        let err = marker.mark(ctx("10:30"), Method::Proximity, &granted()).await.unwrap_err();
        match err {
            AppError::VerificationFailure { check, .. } => assert_eq!(check, "time-window"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(marker.status(ALEX_ID), MarkingState::Error { code: "verification_failure", .. }));

        // a terminal error does not block the next attempt
        marker.mark(ctx("09:30"), Method::Proximity, &granted()).await.unwrap();
    }

    #[tokio::test]
    async fn denied_device_access_surfaces() {
        let marker = real_marker();
        let grants = DeviceGrants {
            camera: Grant::Denied,
            ..granted()
        };
        let err = marker.mark(ctx("09:05"), Method::Face, &grants).await.unwrap_err();
        assert!(matches!(err, AppError::DeviceAccessDenied(Capability::Camera)));
        assert!(matches!(marker.status(ALEX_ID), MarkingState::Error { code: "device_access_denied", .. }));
    }

    #[tokio::test]
    async fn cancel_returns_to_idle() {
        let gate = Arc::new(Notify::new());
        let marker = Arc::new(gated_marker(gate.clone(), std::time::Duration::from_secs(30)));

        let m = marker.clone();
        let task = tokio::spawn(async move { m.mark(ctx("09:05"), Method::CodeScan, &granted()).await });

        while !matches!(marker.status(ALEX_ID), MarkingState::Processing { .. }) {
            tokio::task::yield_now().await;
        }
        let again = marker.mark(ctx("09:05"), Method::CodeScan, &granted()).await.unwrap_err();
        assert!(matches!(again, AppError::InvalidTransition { .. }));

        assert!(marker.cancel(ALEX_ID));
        let result = task.await.unwrap();
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert_eq!(marker.status(ALEX_ID), MarkingState::Idle);
        assert!(!marker.cancel(ALEX_ID));
    }

    #[tokio::test]
    async fn dropped_run_returns_to_idle() {
        let gate = Arc::new(Notify::new());
        let marker = Arc::new(gated_marker(gate, std::time::Duration::from_secs(30)));

        let m = marker.clone();
        let task = tokio::spawn(async move { m.mark(ctx("09:05"), Method::CodeScan, &granted()).await });
        while !matches!(marker.status(ALEX_ID), MarkingState::Processing { .. }) {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;
        assert_eq!(marker.status(ALEX_ID), MarkingState::Idle);
    }

    #[tokio::test]
    async fn slow_checks_time_out() {
        let gate = Arc::new(Notify::new());
        let marker = gated_marker(gate, std::time::Duration::from_millis(20));
        let err = marker.mark(ctx("09:05"), Method::Manual, &granted()).await.unwrap_err();
        assert!(matches!(err, AppError::VerificationFailure { check: "timeout", .. }));
    }
}
