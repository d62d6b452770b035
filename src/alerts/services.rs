use std::collections::BTreeSet;

use anyhow::Context;
use serde_json::json;
use time::{Date, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

use super::repo_types::{Alert, AlertKind, StudentRisk};
use crate::attendance::repo_types::AttendanceRecord;
use crate::auth::repo_types::{Role, User};
use crate::error::AppResult;
use crate::passes::services::{list_pending, open_pass};
use crate::schedule::repo_types::{ClockTime, SlotKind, TimeSlot};
use crate::state::AppState;

const UPCOMING_WITHIN_MINUTES: i64 = 10;

fn read_key(user_id: Uuid) -> String {
    format!("alertsRead:{}", user_id)
}

pub fn schedule_gap_alerts(date: Date, slots: &[TimeSlot], now: ClockTime, at: OffsetDateTime) -> Vec<Alert> {
    slots
        .iter()
        .filter(|s| s.kind == SlotKind::Free && now < s.end)
        .map(|s| Alert {
            id: format!("gap:{}:{}", date, s.id),
            kind: AlertKind::Info,
            title: "Free period".into(),
            message: format!("No class from {} to {}", s.start, s.end),
            timestamp: at,
            read: false,
        })
        .collect()
}

pub fn upcoming_class_alerts(date: Date, slots: &[TimeSlot], now: ClockTime, at: OffsetDateTime) -> Vec<Alert> {
    slots
        .iter()
        .filter(|s| s.kind == SlotKind::Class && s.start > now)
        .filter(|s| now.minutes_until(s.start) <= UPCOMING_WITHIN_MINUTES)
        .map(|s| Alert {
            id: format!("upcoming:{}:{}", date, s.id),
            kind: AlertKind::Info,
            title: format!("{} starts soon", s.subject),
            message: format!("{} in {} at {}", s.subject, s.room, s.start),
            timestamp: at,
            read: false,
        })
        .collect()
}

/// Share of today's finished classes each student has a record for.
pub fn attendance_risk(
    students: &[&User],
    classes: &[&TimeSlot],
    records: &[AttendanceRecord],
    now: ClockTime,
) -> Vec<StudentRisk> {
    let finished: Vec<&&TimeSlot> = classes.iter().filter(|c| c.end <= now).collect();
    if finished.is_empty() {
        return Vec::new();
    }
    students
        .iter()
        .map(|s| {
            let attended = finished
                .iter()
                .filter(|c| records.iter().any(|r| r.student_id == s.id && r.class_id == c.id))
                .count();
            StudentRisk {
                student_id: s.id,
                name: s.name.clone(),
                attended,
                expected: finished.len(),
                rate_percent: (attended * 100 / finished.len()) as u32,
            }
        })
        .collect()
}

pub fn risk_alerts(date: Date, risks: &[StudentRisk], threshold_percent: u32, at: OffsetDateTime) -> Vec<Alert> {
    risks
        .iter()
        .filter(|r| r.rate_percent < threshold_percent)
        .map(|r| Alert {
            id: format!("risk:{}:{}", date, r.student_id),
            kind: AlertKind::Warning,
            title: format!("Attendance risk: {}", r.name),
            message: format!(
                "{} of {} classes attended today ({}%), below {}%",
                r.attended, r.expected, r.rate_percent, threshold_percent
            ),
            timestamp: at,
            read: false,
        })
        .collect()
}

pub async fn risk_today(st: &AppState) -> AppResult<Vec<StudentRisk>> {
    let at = st.school_now();
    let date = at.date();
    let students: Vec<&User> = st.directory.students().collect();
    let classes: Vec<&TimeSlot> = st.timetable.classes_on(date).collect();
    let records = st.attendance.list_on(date).await?;
    Ok(attendance_risk(&students, &classes, &records, st.clock_time(at)))
}

async fn read_set(st: &AppState, user_id: Uuid) -> AppResult<BTreeSet<String>> {
    let raw = st.kv.get(&read_key(user_id)).await.context("load alert read set")?;
    Ok(raw
        .and_then(|v| serde_json::from_value::<BTreeSet<String>>(v).ok())
        .unwrap_or_default())
}

pub async fn acknowledge(st: &AppState, user_id: Uuid, alert_id: &str) -> AppResult<()> {
    let mut read = read_set(st, user_id).await?;
    if read.insert(alert_id.to_string()) {
        st.kv
            .put(&read_key(user_id), json!(read))
            .await
            .context("store alert read set")?;
        info!(%user_id, alert_id, "alert acknowledged");
    }
    Ok(())
}

/// Everything the user should currently see, with read flags applied.
pub async fn alerts_for(st: &AppState, user: &User) -> AppResult<Vec<Alert>> {
    let at = st.school_now();
    let date = at.date();
    let now = st.clock_time(at);
    let slots = st.timetable.for_date(date);
    let threshold = st.config.school.risk_threshold_percent;

    let mut alerts = Vec::new();
    match user.role {
        Role::Student => {
            alerts.extend(upcoming_class_alerts(date, slots, now, at));
            alerts.extend(schedule_gap_alerts(date, slots, now, at));
            let own: Vec<_> = risk_today(st).await?.into_iter().filter(|r| r.student_id == user.id).collect();
            alerts.extend(risk_alerts(date, &own, threshold, at));
        }
        Role::Teacher | Role::Admin | Role::Counselor => {
            let pending = list_pending(st).await?;
            if !pending.is_empty() {
                alerts.push(Alert {
                    id: format!("pending:{}:{}", date, pending.len()),
                    kind: AlertKind::Warning,
                    title: "Movement passes awaiting approval".into(),
                    message: format!("{} pending request(s)", pending.len()),
                    timestamp: at,
                    read: false,
                });
            }
            alerts.extend(risk_alerts(date, &risk_today(st).await?, threshold, at));
        }
        Role::Parent => {
            if let Some(child_id) = user.linked_student {
                let child: Vec<_> = risk_today(st).await?.into_iter().filter(|r| r.student_id == child_id).collect();
                alerts.extend(risk_alerts(date, &child, threshold, at));
                if let Some(pass) = open_pass(st, child_id).await? {
                    alerts.push(Alert {
                        id: format!("pass:{}:{}", pass.id, pass.status),
                        kind: AlertKind::Info,
                        title: "Movement pass".into(),
                        message: format!("{} to {} ({})", pass.reason, pass.destination, pass.status),
                        timestamp: pass.request_time,
                        read: false,
                    });
                }
            }
        }
    }

    let read = read_set(st, user.id).await?;
    for alert in alerts.iter_mut() {
        alert.read = read.contains(&alert.id);
    }
    Ok(alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::repo_types::{AttendanceStatus, Method};
    use crate::auth::directory::{ALEX_ID, EMILY_ID, JORDAN_ID, SARAH_ID};
    use crate::schedule::services::Timetable;
    use time::macros::{date, datetime};

    fn t(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    fn record(student_id: Uuid, class_id: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: Uuid::new_v4(),
            student_id,
            class_id: class_id.into(),
            date: date!(2024 - 01 - 15),
            status: AttendanceStatus::Present,
            method: Method::Manual,
            timestamp: datetime!(2024-01-15 09:05 UTC),
            location: None,
            device_id: "d".into(),
        }
    }

    #[test]
    fn gaps_and_upcoming() {
        let tt = Timetable::seeded();
        let day = date!(2024 - 01 - 15);
        let at = datetime!(2024-01-15 10:07 UTC);
        let slots = tt.for_date(day);

        let gaps = schedule_gap_alerts(day, slots, t("10:07"), at);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].id, "gap:2024-01-15:free-1");

        let soon = upcoming_class_alerts(day, slots, t("10:07"), at);
        assert_eq!(soon.len(), 1);
        assert_eq!(soon[0].title, "Physics starts soon");
        assert!(upcoming_class_alerts(day, slots, t("10:00"), at).is_empty());
    }

    #[test]
    fn risk_threshold() {
        let dir = crate::auth::directory::UserDirectory::seeded();
        let tt = Timetable::seeded();
        let day = date!(2024 - 01 - 15);
        let students: Vec<&User> = dir.students().collect();
        let classes: Vec<&TimeSlot> = tt.classes_on(day).collect();
        let records = vec![record(ALEX_ID, "math"), record(ALEX_ID, "physics"), record(JORDAN_ID, "math")];

        assert!(attendance_risk(&students, &classes, &records, t("09:30")).is_empty());

        let risks = attendance_risk(&students, &classes, &records, t("11:30"));
        let alex = risks.iter().find(|r| r.student_id == ALEX_ID).unwrap();
        let jordan = risks.iter().find(|r| r.student_id == JORDAN_ID).unwrap();
        assert_eq!(alex.rate_percent, 100);
        assert_eq!(jordan.rate_percent, 50);

        let alerts = risk_alerts(day, &risks, 75, datetime!(2024-01-15 11:30 UTC));
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].title.contains("Jordan"));
    }

    #[tokio::test]
    async fn acknowledgement_sticks() {
        let (st, clock) = AppState::fake_with_clock();
        clock.set(datetime!(2024-01-15 10:07 UTC));
        let alex = st.directory.get(ALEX_ID).unwrap().clone();

        let alerts = alerts_for(&st, &alex).await.unwrap();
        let gap = alerts.iter().find(|a| a.id.starts_with("gap:")).unwrap();
        assert!(!gap.read);

        acknowledge(&st, ALEX_ID, &gap.id).await.unwrap();
        acknowledge(&st, ALEX_ID, &gap.id).await.unwrap();
        let again = alerts_for(&st, &alex).await.unwrap();
        assert!(again.iter().find(|a| a.id == gap.id).unwrap().read);
        assert!(again.iter().filter(|a| a.id != gap.id).all(|a| !a.read));
    }

    #[tokio::test]
    async fn staff_see_risk_and_parents_see_child() {
        let (st, clock) = AppState::fake_with_clock();
        clock.set(datetime!(2024-01-15 10:05 UTC));
        let sarah = st.directory.get(SARAH_ID).unwrap().clone();
        let emily = st.directory.get(EMILY_ID).unwrap().clone();

        // nobody marked Mathematics
        let staff = alerts_for(&st, &sarah).await.unwrap();
        assert_eq!(staff.iter().filter(|a| a.id.starts_with("risk:")).count(), 2);

        let parent = alerts_for(&st, &emily).await.unwrap();
        assert_eq!(parent.len(), 1);
        assert!(parent[0].title.contains("Alex"));
    }
}
