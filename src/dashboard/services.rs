//! Role-specific dashboards. `Role::dashboard` picks the renderer.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::alerts::repo_types::{Alert, StudentRisk};
use crate::alerts::services::{alerts_for, risk_today};
use crate::attendance::dto::ClassRoster;
use crate::attendance::machine::MarkingState;
use crate::attendance::repo_types::AttendanceRecord;
use crate::attendance::services::{rosters_today, today_for};
use crate::auth::dto::PublicUser;
use crate::auth::repo_types::{Role, User};
use crate::error::AppResult;
use crate::passes::repo_types::{MovementPass, PassStatus};
use crate::passes::services::{list_pending, open_pass, sweep};
use crate::schedule::dto::TodaySchedule;
use crate::schedule::handlers::today_schedule;
use crate::schedule::repo_types::TimeSlot;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum DashboardView {
    Student {
        schedule: TodaySchedule,
        attendance: Vec<AttendanceRecord>,
        marking: MarkingState,
        open_pass: Option<MovementPass>,
        alerts: Vec<Alert>,
    },
    Teacher {
        classes: Vec<TimeSlot>,
        rosters: Vec<ClassRoster>,
        current: Option<TimeSlot>,
        next: Option<TimeSlot>,
        pending_passes: Vec<MovementPass>,
        alerts: Vec<Alert>,
    },
    Admin {
        pass_counts: BTreeMap<&'static str, usize>,
        marked_today: usize,
        at_risk: Vec<StudentRisk>,
        alerts: Vec<Alert>,
    },
    Parent {
        child: Option<PublicUser>,
        attendance: Vec<AttendanceRecord>,
        open_pass: Option<MovementPass>,
        alerts: Vec<Alert>,
    },
    Counselor {
        students: Vec<StudentRisk>,
        at_risk: Vec<StudentRisk>,
        alerts: Vec<Alert>,
    },
}

#[async_trait]
pub trait Dashboard: Send + Sync {
    async fn render(&self, st: &AppState, user: &User) -> AppResult<DashboardView>;
}

pub struct StudentDashboard;
pub struct TeacherDashboard;
pub struct AdminDashboard;
pub struct ParentDashboard;
pub struct CounselorDashboard;

impl Role {
    pub fn dashboard(&self) -> &'static dyn Dashboard {
        match self {
            Role::Student => &StudentDashboard,
            Role::Teacher => &TeacherDashboard,
            Role::Admin => &AdminDashboard,
            Role::Parent => &ParentDashboard,
            Role::Counselor => &CounselorDashboard,
        }
    }
}

fn below_threshold(st: &AppState, risks: &[StudentRisk]) -> Vec<StudentRisk> {
    let threshold = st.config.school.risk_threshold_percent;
    risks.iter().filter(|r| r.rate_percent < threshold).cloned().collect()
}

#[async_trait]
impl Dashboard for StudentDashboard {
    async fn render(&self, st: &AppState, user: &User) -> AppResult<DashboardView> {
        Ok(DashboardView::Student {
            schedule: today_schedule(st),
            attendance: today_for(st, user.id).await?,
            marking: st.marker.status(user.id),
            open_pass: open_pass(st, user.id).await?,
            alerts: alerts_for(st, user).await?,
        })
    }
}

#[async_trait]
impl Dashboard for TeacherDashboard {
    async fn render(&self, st: &AppState, user: &User) -> AppResult<DashboardView> {
        let schedule = today_schedule(st);
        let classes = st.timetable.classes_on(schedule.date).cloned().collect();
        Ok(DashboardView::Teacher {
            classes,
            rosters: rosters_today(st).await?,
            current: schedule.current,
            next: schedule.next,
            pending_passes: list_pending(st).await?,
            alerts: alerts_for(st, user).await?,
        })
    }
}

#[async_trait]
impl Dashboard for AdminDashboard {
    async fn render(&self, st: &AppState, user: &User) -> AppResult<DashboardView> {
        // counts must not include passes whose validity already elapsed
        sweep(st).await?;
        let mut pass_counts = BTreeMap::new();
        for status in [
            PassStatus::Pending,
            PassStatus::Approved,
            PassStatus::Rejected,
            PassStatus::Active,
            PassStatus::Completed,
        ] {
            let n = st.passes.list_by_status(&[status]).await?.len();
            pass_counts.insert(status.as_str(), n);
        }
        let today = st.school_now().date();
        let risks = risk_today(st).await?;
        Ok(DashboardView::Admin {
            pass_counts,
            marked_today: st.attendance.list_on(today).await?.len(),
            at_risk: below_threshold(st, &risks),
            alerts: alerts_for(st, user).await?,
        })
    }
}

#[async_trait]
impl Dashboard for ParentDashboard {
    async fn render(&self, st: &AppState, user: &User) -> AppResult<DashboardView> {
        let child = user.linked_student.and_then(|id| st.directory.get(id));
        let (attendance, open) = match child {
            Some(c) => (today_for(st, c.id).await?, open_pass(st, c.id).await?),
            None => (Vec::new(), None),
        };
        Ok(DashboardView::Parent {
            child: child.map(PublicUser::from),
            attendance,
            open_pass: open,
            alerts: alerts_for(st, user).await?,
        })
    }
}

#[async_trait]
impl Dashboard for CounselorDashboard {
    async fn render(&self, st: &AppState, user: &User) -> AppResult<DashboardView> {
        let students = risk_today(st).await?;
        Ok(DashboardView::Counselor {
            at_risk: below_threshold(st, &students),
            students,
            alerts: alerts_for(st, user).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::directory::{ALEX_ID, EMILY_ID, LISA_ID, MICHAEL_ID, SARAH_ID};
    use crate::passes::dto::SubmitPassRequest;
    use crate::passes::repo_types::Decision;
    use crate::passes::services::{decide, submit_request};

    async fn render_for(st: &AppState, id: uuid::Uuid) -> serde_json::Value {
        let user = st.directory.get(id).unwrap().clone();
        let view = user.role.dashboard().render(st, &user).await.unwrap();
        serde_json::to_value(view).unwrap()
    }

    #[tokio::test]
    async fn every_role_gets_its_own_view() {
        let st = AppState::fake();
        for (id, role) in [
            (ALEX_ID, "student"),
            (SARAH_ID, "teacher"),
            (MICHAEL_ID, "admin"),
            (EMILY_ID, "parent"),
            (LISA_ID, "counselor"),
        ] {
            assert_eq!(render_for(&st, id).await["role"], role);
        }
    }

    #[tokio::test]
    async fn student_view_shows_current_class_and_idle_marker() {
        let st = AppState::fake();
        let view = render_for(&st, ALEX_ID).await;
        assert_eq!(view["schedule"]["current"]["subject"], "Mathematics");
        assert_eq!(view["marking"]["state"], "idle");
        assert!(view["open_pass"].is_null());
    }

    #[tokio::test]
    async fn teacher_and_parent_see_the_pending_pass() {
        let st = AppState::fake();
        let alex = st.directory.get(ALEX_ID).unwrap().clone();
        submit_request(
            &st,
            &alex,
            SubmitPassRequest {
                reason: "Library Visit".into(),
                destination: "Library".into(),
                duration_minutes: 30,
            },
        )
        .await
        .unwrap();

        let teacher = render_for(&st, SARAH_ID).await;
        assert_eq!(teacher["pending_passes"].as_array().unwrap().len(), 1);
        assert_eq!(teacher["classes"].as_array().unwrap().len(), 3);

        let parent = render_for(&st, EMILY_ID).await;
        assert_eq!(parent["child"]["name"], "Alex Johnson");
        assert_eq!(parent["open_pass"]["status"], "pending");

        let admin = render_for(&st, MICHAEL_ID).await;
        assert_eq!(admin["pass_counts"]["pending"], 1);
        assert_eq!(admin["pass_counts"]["completed"], 0);
    }

    #[tokio::test]
    async fn admin_counts_apply_elapsed_validity() {
        let (st, clock) = AppState::fake_with_clock();
        let alex = st.directory.get(ALEX_ID).unwrap().clone();
        let sarah = st.directory.get(SARAH_ID).unwrap().clone();
        let pass = submit_request(
            &st,
            &alex,
            SubmitPassRequest {
                reason: "Lab Work".into(),
                destination: "Computer Lab".into(),
                duration_minutes: 15,
            },
        )
        .await
        .unwrap();
        decide(&st, &sarah, pass.id, Decision::Approve).await.unwrap();

        clock.advance(time::Duration::hours(2));
        let admin = render_for(&st, MICHAEL_ID).await;
        assert_eq!(admin["pass_counts"]["approved"], 0);
        assert_eq!(admin["pass_counts"]["completed"], 1);
    }

    #[tokio::test]
    async fn teacher_sees_rosters_with_absentees() {
        let (st, clock) = AppState::fake_with_clock();
        clock.set(time::macros::datetime!(2024-01-15 10:07 UTC));
        let teacher = render_for(&st, SARAH_ID).await;
        let rosters = teacher["rosters"].as_array().unwrap();
        assert_eq!(rosters.len(), 3);

        let math = rosters.iter().find(|r| r["class"]["id"] == "math").unwrap();
        assert_eq!(math["students"], 2);
        assert_eq!(math["present"], 0);
        assert!(math["entries"].as_array().unwrap().iter().all(|e| e["status"] == "absent"));

        let cs = rosters.iter().find(|r| r["class"]["id"] == "cs").unwrap();
        assert!(cs["entries"][0]["status"].is_null());
    }
}
