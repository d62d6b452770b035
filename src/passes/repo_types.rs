use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::attendance::repo_types::GeoPoint;

pub const REASONS: &[&str] = &[
    "Academic Research",
    "Medical Emergency",
    "Administrative Work",
    "Personal Emergency",
    "Library Visit",
    "Lab Work",
    "Other",
];

pub const DESTINATIONS: &[&str] = &[
    "Library",
    "Restroom",
    "Principal's Office",
    "Nurse's Office",
    "Computer Lab",
    "Canteen",
    "Other",
];

pub const MIN_DURATION_MINUTES: i64 = 15;
pub const MAX_DURATION_MINUTES: i64 = 120;
pub const DURATION_STEP_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PassStatus {
    Pending,
    Approved,
    Rejected,
    Active,
    Completed,
}

impl PassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassStatus::Pending => "pending",
            PassStatus::Approved => "approved",
            PassStatus::Rejected => "rejected",
            PassStatus::Active => "active",
            PassStatus::Completed => "completed",
        }
    }

    /// Pending, approved and active passes count against the one-open-pass limit.
    pub fn is_open(&self) -> bool {
        matches!(self, PassStatus::Pending | PassStatus::Approved | PassStatus::Active)
    }
}

impl std::fmt::Display for PassStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PassStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => anyhow::bail!("unknown pass status {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovementPass {
    pub id: Uuid,
    pub student_id: Uuid,
    pub reason: String,
    pub destination: String,
    #[serde(with = "time::serde::rfc3339")]
    pub request_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_until: OffsetDateTime,
    pub status: PassStatus,
    pub approved_by: Option<Uuid>,
    /// Location tracking requested while the pass is in use.
    pub tracking: bool,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, FromRow)]
pub struct PassRow {
    pub id: Uuid,
    pub student_id: Uuid,
    pub reason: String,
    pub destination: String,
    pub request_time: OffsetDateTime,
    pub valid_until: OffsetDateTime,
    pub status: String,
    pub approved_by: Option<Uuid>,
    pub tracking: bool,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl TryFrom<PassRow> for MovementPass {
    type Error = anyhow::Error;

    fn try_from(r: PassRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            student_id: r.student_id,
            reason: r.reason,
            destination: r.destination,
            request_time: r.request_time,
            valid_until: r.valid_until,
            status: r.status.parse()?,
            approved_by: r.approved_by,
            tracking: r.tracking,
            location: r.lat.zip(r.lng).map(|(lat, lng)| GeoPoint { lat, lng }),
        })
    }
}
