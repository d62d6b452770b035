use serde::{Deserialize, Serialize};

use super::repo_types::{Decision, MovementPass};

#[derive(Debug, Deserialize)]
pub struct SubmitPassRequest {
    pub reason: String,
    pub destination: String,
    #[serde(default = "default_duration")]
    pub duration_minutes: i64,
}
fn default_duration() -> i64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub action: Decision,
}

#[derive(Debug, Serialize)]
pub struct PassCatalog {
    pub reasons: &'static [&'static str],
    pub destinations: &'static [&'static str],
}

#[derive(Debug, Serialize)]
pub struct PassList {
    pub open: Option<MovementPass>,
    pub history: Vec<MovementPass>,
}
