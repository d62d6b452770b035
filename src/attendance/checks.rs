//! Verification capabilities consulted before a mark is accepted.
//!
//! Each check answers pass/fail with a reason. The marker runs all three and
//! only records attendance when every one passes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

use super::repo::AttendanceRepo;
use super::repo_types::GeoPoint;
use crate::auth::directory::{ALEX_ID, JORDAN_ID};
use crate::schedule::repo_types::{ClockTime, TimeSlot};

/// Everything a check may look at for one marking attempt.
#[derive(Debug, Clone)]
pub struct MarkContext {
    pub student_id: Uuid,
    pub class: TimeSlot,
    pub date: Date,
    pub now: ClockTime,
    pub at: OffsetDateTime,
    pub location: Option<GeoPoint>,
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub passed: bool,
    pub reason: Option<String>,
}

impl CheckOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait GeofenceChecker: Send + Sync {
    async fn check(&self, ctx: &MarkContext) -> anyhow::Result<CheckOutcome>;
}

#[async_trait]
pub trait TimeWindowChecker: Send + Sync {
    async fn check(&self, ctx: &MarkContext) -> anyhow::Result<CheckOutcome>;
}

#[async_trait]
pub trait DeviceAttestor: Send + Sync {
    async fn attest(&self, ctx: &MarkContext) -> anyhow::Result<CheckOutcome>;
}

/// Accepts fixes within `radius_m` of the room, or of the campus centre
/// for rooms without their own coordinates.
pub struct RadiusGeofence {
    pub campus: GeoPoint,
    pub rooms: HashMap<String, GeoPoint>,
    pub radius_m: f64,
}

#[async_trait]
impl GeofenceChecker for RadiusGeofence {
    async fn check(&self, ctx: &MarkContext) -> anyhow::Result<CheckOutcome> {
        let Some(fix) = ctx.location else {
            return Ok(CheckOutcome::fail("no location fix"));
        };
        let centre = self.rooms.get(&ctx.class.room).unwrap_or(&self.campus);
        let distance = fix.distance_m(centre);
        if distance <= self.radius_m {
            Ok(CheckOutcome::pass())
        } else {
            Ok(CheckOutcome::fail(format!(
                "{:.0} m from {}, limit {:.0} m",
                distance, ctx.class.room, self.radius_m
            )))
        }
    }
}

/// Marking opens `open_before` ahead of the class start and closes at its end.
pub struct ClassTimeWindow {
    pub open_before: Duration,
}

#[async_trait]
impl TimeWindowChecker for ClassTimeWindow {
    async fn check(&self, ctx: &MarkContext) -> anyhow::Result<CheckOutcome> {
        let opens = ctx.class.start.shifted(-self.open_before);
        if ctx.now >= opens && ctx.now < ctx.class.end {
            Ok(CheckOutcome::pass())
        } else {
            Ok(CheckOutcome::fail(format!(
                "marking for {} is open {} to {}, now {}",
                ctx.class.subject, opens, ctx.class.end, ctx.now
            )))
        }
    }
}

/// Device must be registered to the student and not have marked anyone else today.
pub struct RegisteredDevices {
    pub registry: HashMap<Uuid, Vec<String>>,
    pub repo: Arc<dyn AttendanceRepo>,
}

impl RegisteredDevices {
    pub fn seeded(repo: Arc<dyn AttendanceRepo>) -> Self {
        let registry = HashMap::from([
            (ALEX_ID, vec!["device-alex-01".to_string()]),
            (JORDAN_ID, vec!["device-jordan-01".to_string()]),
        ]);
        Self { registry, repo }
    }
}

#[async_trait]
impl DeviceAttestor for RegisteredDevices {
    async fn attest(&self, ctx: &MarkContext) -> anyhow::Result<CheckOutcome> {
        let registered = self
            .registry
            .get(&ctx.student_id)
            .is_some_and(|devices| devices.iter().any(|d| d == &ctx.device_id));
        if !registered {
            return Ok(CheckOutcome::fail(format!(
                "device {} is not registered to this student",
                ctx.device_id
            )));
        }
        if self
            .repo
            .device_used_by_other(&ctx.device_id, ctx.date, ctx.student_id)
            .await?
        {
            return Ok(CheckOutcome::fail("device already marked another student today"));
        }
        Ok(CheckOutcome::pass())
    }
}
