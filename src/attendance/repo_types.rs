use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    /// Great-circle distance in metres (haversine).
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_M * a.sqrt().asin()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }
}

impl std::str::FromStr for AttendanceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "late" => Ok(Self::Late),
            other => anyhow::bail!("unknown attendance status {other}"),
        }
    }
}

/// How the student asked to be marked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    CodeScan,
    Proximity,
    Face,
    Manual,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::CodeScan => "code-scan",
            Method::Proximity => "proximity",
            Method::Face => "face",
            Method::Manual => "manual",
        }
    }
}

impl std::str::FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code-scan" => Ok(Self::CodeScan),
            "proximity" => Ok(Self::Proximity),
            "face" => Ok(Self::Face),
            "manual" => Ok(Self::Manual),
            other => anyhow::bail!("unknown marking method {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub class_id: String,
    pub date: Date,
    pub status: AttendanceStatus,
    pub method: Method,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub location: Option<GeoPoint>,
    pub device_id: String,
}

/// Flat row as stored in `attendance_records`.
#[derive(Debug, FromRow)]
pub struct AttendanceRow {
    pub id: Uuid,
    pub student_id: Uuid,
    pub class_id: String,
    pub date: Date,
    pub status: String,
    pub method: String,
    pub recorded_at: OffsetDateTime,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub device_id: String,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = anyhow::Error;

    fn try_from(r: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            student_id: r.student_id,
            class_id: r.class_id,
            date: r.date,
            status: r.status.parse()?,
            method: r.method.parse()?,
            timestamp: r.recorded_at,
            location: r.lat.zip(r.lng).map(|(lat, lng)| GeoPoint { lat, lng }),
            device_id: r.device_id,
        })
    }
}
