use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Warning,
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Alert {
    /// Deterministic per occurrence, so acknowledgement survives re-generation.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub read: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StudentRisk {
    pub student_id: Uuid,
    pub name: String,
    pub attended: usize,
    pub expected: usize,
    pub rate_percent: u32,
}
