use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{macros::format_description, Duration, Time};

/// Zero-padded 24-hour wall-clock time (`HH:MM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(Time);

impl ClockTime {
    pub fn hm(hour: u8, minute: u8) -> Option<Self> {
        Time::from_hms(hour, minute, 0).ok().map(Self)
    }

    /// Truncates seconds, matching how the school day is displayed.
    pub fn from_time(t: Time) -> Self {
        Self(Time::from_hms(t.hour(), t.minute(), 0).unwrap_or(Time::MIDNIGHT))
    }

    pub fn as_time(&self) -> Time {
        self.0
    }

    /// Saturating shift within the same day.
    pub fn shifted(&self, by: Duration) -> Self {
        let minutes = i64::from(self.0.hour()) * 60 + i64::from(self.0.minute());
        let shifted = (minutes + by.whole_minutes()).clamp(0, 23 * 60 + 59);
        Self::from_time(Time::from_hms((shifted / 60) as u8, (shifted % 60) as u8, 0).unwrap_or(Time::MIDNIGHT))
    }

    pub fn minutes_until(&self, later: ClockTime) -> i64 {
        (later.0 - self.0).whole_minutes()
    }
}

impl FromStr for ClockTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = format_description!("[hour]:[minute]");
        Time::parse(s, &format)
            .map(Self)
            .map_err(|e| format!("invalid time {s:?}: {e}"))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Class,
    Break,
    Free,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSlot {
    pub id: String,
    pub subject: String,
    pub teacher: String,
    pub room: String,
    pub start: ClockTime,
    pub end: ClockTime,
    pub kind: SlotKind,
}

impl TimeSlot {
    /// Half-open: a slot ending at 10:00 does not contain 10:00.
    pub fn contains(&self, t: ClockTime) -> bool {
        self.start <= t && t < self.end
    }
}
