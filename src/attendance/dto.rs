use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::flow::DeviceGrants;
use super::repo_types::{AttendanceRecord, AttendanceStatus, GeoPoint, Method};
use crate::schedule::repo_types::TimeSlot;

#[derive(Debug, Deserialize)]
pub struct MarkRequest {
    pub class_id: String,
    pub method: Method,
    pub device_id: String,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub permissions: DeviceGrants,
}

#[derive(Debug, Serialize)]
pub struct MarkResponse {
    pub success: bool,
    pub record: AttendanceRecord,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// One student's line in a class roster. `status` is empty until the student
/// is marked or the class ends unmarked.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RosterEntry {
    pub student_id: Uuid,
    pub name: String,
    pub roll_number: Option<String>,
    pub status: Option<AttendanceStatus>,
    pub method: Option<Method>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub marked_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClassRoster {
    pub class: TimeSlot,
    pub students: usize,
    pub present: usize,
    pub rate_percent: u32,
    pub entries: Vec<RosterEntry>,
}
