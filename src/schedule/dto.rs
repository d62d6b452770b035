use serde::Serialize;
use time::Date;

use super::repo_types::{ClockTime, TimeSlot};

#[derive(Debug, Serialize)]
pub struct TodaySchedule {
    pub date: Date,
    pub now: ClockTime,
    pub slots: Vec<TimeSlot>,
    pub current: Option<TimeSlot>,
    pub next: Option<TimeSlot>,
}
