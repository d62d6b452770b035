use std::collections::HashMap;

use time::{Date, Weekday};

use super::repo_types::{ClockTime, SlotKind, TimeSlot};

/// The slot whose `[start, end)` contains `now`.
pub fn current_slot(slots: &[TimeSlot], now: ClockTime) -> Option<&TimeSlot> {
    slots.iter().find(|s| s.contains(now))
}

/// The slot with the earliest start strictly after `now`, independent of input order.
pub fn next_slot(slots: &[TimeSlot], now: ClockTime) -> Option<&TimeSlot> {
    let mut upcoming: Vec<&TimeSlot> = slots.iter().filter(|s| s.start > now).collect();
    upcoming.sort_by_key(|s| s.start);
    upcoming.into_iter().next()
}

/// Weekly timetable; each day's slots are kept sorted by start.
#[derive(Debug, Clone, Default)]
pub struct Timetable {
    days: HashMap<Weekday, Vec<TimeSlot>>,
}

impl Timetable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_day(mut self, day: Weekday, mut slots: Vec<TimeSlot>) -> Self {
        slots.sort_by_key(|s| s.start);
        self.days.insert(day, slots);
        self
    }

    /// Same school day Monday through Friday, nothing at weekends.
    pub fn seeded() -> Self {
        let day = seeded_day();
        [
            Weekday::Monday,
            Weekday::Tuesday,
            Weekday::Wednesday,
            Weekday::Thursday,
            Weekday::Friday,
        ]
        .into_iter()
        .fold(Self::new(), |tt, wd| tt.with_day(wd, day.clone()))
    }

    pub fn for_date(&self, date: Date) -> &[TimeSlot] {
        self.days
            .get(&date.weekday())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find_class(&self, date: Date, class_id: &str) -> Option<&TimeSlot> {
        self.for_date(date)
            .iter()
            .find(|s| s.id == class_id && s.kind == SlotKind::Class)
    }

    pub fn classes_on(&self, date: Date) -> impl Iterator<Item = &TimeSlot> {
        self.for_date(date)
            .iter()
            .filter(|s| s.kind == SlotKind::Class)
    }
}

fn slot(id: &str, subject: &str, teacher: &str, room: &str, start: &str, end: &str, kind: SlotKind) -> TimeSlot {
    TimeSlot {
        id: id.into(),
        subject: subject.into(),
        teacher: teacher.into(),
        room: room.into(),
        start: start.parse().unwrap_or_else(|_| ClockTime::from_time(time::Time::MIDNIGHT)),
        end: end.parse().unwrap_or_else(|_| ClockTime::from_time(time::Time::MIDNIGHT)),
        kind,
    }
}

fn seeded_day() -> Vec<TimeSlot> {
    vec![
        slot("math", "Mathematics", "Dr. Smith", "Room 101", "09:00", "10:00", SlotKind::Class),
        slot("break-1", "Break", "", "", "10:00", "10:15", SlotKind::Break),
        slot("physics", "Physics", "Prof. Johnson", "Lab 201", "10:15", "11:15", SlotKind::Class),
        slot("free-1", "Free Period", "", "", "11:15", "12:15", SlotKind::Free),
        slot("cs", "Computer Science", "Mr. Wilson", "Lab 301", "12:15", "13:15", SlotKind::Class),
    ]
}
