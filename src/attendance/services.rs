use uuid::Uuid;

use super::checks::MarkContext;
use super::dto::{ClassRoster, MarkRequest, RosterEntry};
use super::repo_types::{AttendanceRecord, AttendanceStatus};
use crate::auth::repo_types::{Role, User};
use crate::error::{AppError, AppResult};
use crate::schedule::repo_types::{ClockTime, TimeSlot};
use crate::state::AppState;

pub async fn mark_attendance(st: &AppState, student: &User, req: MarkRequest) -> AppResult<AttendanceRecord> {
    if student.role != Role::Student {
        return Err(AppError::Forbidden("only students mark their own attendance".into()));
    }
    if req.device_id.trim().is_empty() {
        return Err(AppError::Validation("device_id is required".into()));
    }

    let at = st.school_now();
    let date = at.date();
    let class = st
        .timetable
        .find_class(date, &req.class_id)
        .cloned()
        .ok_or(AppError::NotFound("class"))?;

    let ctx = MarkContext {
        student_id: student.id,
        class,
        date,
        now: st.clock_time(at),
        at,
        location: req.location,
        device_id: req.device_id,
    };
    st.marker.mark(ctx, req.method, &req.permissions).await
}

pub async fn today_for(st: &AppState, student_id: Uuid) -> AppResult<Vec<AttendanceRecord>> {
    let date = st.school_now().date();
    Ok(st.attendance.list_for_student(student_id, date).await?)
}

/// Per-student status for one class. A student with no record once the class
/// has ended counts as absent.
pub fn class_roster(class: &TimeSlot, students: &[&User], records: &[AttendanceRecord], now: ClockTime) -> ClassRoster {
    let finished = class.end <= now;
    let entries: Vec<RosterEntry> = students
        .iter()
        .map(|s| {
            let record = records.iter().find(|r| r.student_id == s.id && r.class_id == class.id);
            RosterEntry {
                student_id: s.id,
                name: s.name.clone(),
                roll_number: s.profile.as_ref().and_then(|p| p.roll_number.clone()),
                status: match record {
                    Some(r) => Some(r.status),
                    None if finished => Some(AttendanceStatus::Absent),
                    None => None,
                },
                method: record.map(|r| r.method),
                marked_at: record.map(|r| r.timestamp),
            }
        })
        .collect();

    let present = entries
        .iter()
        .filter(|e| matches!(e.status, Some(AttendanceStatus::Present | AttendanceStatus::Late)))
        .count();
    let rate_percent = if entries.is_empty() {
        0
    } else {
        (present * 100 / entries.len()) as u32
    };
    ClassRoster {
        class: class.clone(),
        students: entries.len(),
        present,
        rate_percent,
        entries,
    }
}

/// Rosters for every class on today's timetable.
pub async fn rosters_today(st: &AppState) -> AppResult<Vec<ClassRoster>> {
    let at = st.school_now();
    let date = at.date();
    let now = st.clock_time(at);
    let students: Vec<&User> = st.directory.students().collect();
    let records = st.attendance.list_on(date).await?;
    Ok(st
        .timetable
        .classes_on(date)
        .map(|class| class_roster(class, &students, &records, now))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::flow::{DeviceGrants, Grant};
    use crate::attendance::repo_types::{GeoPoint, Method};
    use crate::auth::directory::{ALEX_ID, JORDAN_ID, SARAH_ID};

    fn request(class_id: &str) -> MarkRequest {
        MarkRequest {
            class_id: class_id.into(),
            method: Method::CodeScan,
            device_id: "device-alex-01".into(),
            location: Some(GeoPoint { lat: 40.7128, lng: -74.0060 }),
            permissions: DeviceGrants {
                camera: Grant::Granted,
                bluetooth: Grant::Unavailable,
                geolocation: Grant::Granted,
            },
        }
    }

    #[tokio::test]
    async fn marks_current_class() {
        let st = AppState::fake();
        let alex = st.directory.get(ALEX_ID).unwrap().clone();
        // 09:30 is 30 minutes into Mathematics
        let record = mark_attendance(&st, &alex, request("math")).await.unwrap();
        assert_eq!(record.class_id, "math");
        assert_eq!(today_for(&st, ALEX_ID).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_or_non_class_slot_is_not_found() {
        let st = AppState::fake();
        let alex = st.directory.get(ALEX_ID).unwrap().clone();
        assert!(matches!(
            mark_attendance(&st, &alex, request("break-1")).await,
            Err(AppError::NotFound("class"))
        ));
        assert!(matches!(
            mark_attendance(&st, &alex, request("history")).await,
            Err(AppError::NotFound("class"))
        ));
    }

    #[tokio::test]
    async fn teachers_cannot_mark() {
        let st = AppState::fake();
        let sarah = st.directory.get(SARAH_ID).unwrap().clone();
        assert!(matches!(
            mark_attendance(&st, &sarah, request("math")).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn roster_marks_unrecorded_students_absent_after_class() {
        let (st, clock) = AppState::fake_with_clock();
        let alex = st.directory.get(ALEX_ID).unwrap().clone();
        mark_attendance(&st, &alex, request("math")).await.unwrap();

        // during Mathematics nobody unmarked is absent yet
        let during = rosters_today(&st).await.unwrap();
        let math = during.iter().find(|r| r.class.id == "math").unwrap();
        let jordan = math.entries.iter().find(|e| e.student_id == JORDAN_ID).unwrap();
        assert_eq!(jordan.status, None);

        clock.set(time::macros::datetime!(2024-01-15 10:07 UTC));
        let after = rosters_today(&st).await.unwrap();
        assert_eq!(after.len(), 3);
        let math = after.iter().find(|r| r.class.id == "math").unwrap();
        assert_eq!((math.students, math.present, math.rate_percent), (2, 1, 50));

        let alex_row = math.entries.iter().find(|e| e.student_id == ALEX_ID).unwrap();
        assert_eq!(alex_row.status, Some(AttendanceStatus::Late));
        assert_eq!(alex_row.method, Some(Method::CodeScan));
        assert_eq!(alex_row.roll_number.as_deref(), Some("2024001"));
        let jordan = math.entries.iter().find(|e| e.student_id == JORDAN_ID).unwrap();
        assert_eq!(jordan.status, Some(AttendanceStatus::Absent));
        assert!(jordan.marked_at.is_none());

        let physics = after.iter().find(|r| r.class.id == "physics").unwrap();
        assert!(physics.entries.iter().all(|e| e.status.is_none()));
        assert_eq!(physics.rate_percent, 0);
    }
}
