use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;
use tracing::info;

use crate::attendance::checks::{ClassTimeWindow, RadiusGeofence, RegisteredDevices};
use crate::attendance::machine::{AttendanceMarker, VerificationChecks};
use crate::attendance::repo::{AttendanceRepo, InMemoryAttendanceRepo, PgAttendanceRepo};
use crate::attendance::repo_types::GeoPoint;
use crate::auth::directory::UserDirectory;
use crate::clock::{school_offset, Clock, FixedClock, SystemClock};
use crate::config::{AppConfig, JwtConfig, SchoolConfig};
use crate::passes::repo::{InMemoryPassRepo, PassRepo, PgPassRepo};
use crate::schedule::repo_types::ClockTime;
use crate::schedule::services::Timetable;
use crate::storage::{InMemoryKv, KvStore, PgKv};

#[derive(Clone)]
pub struct AppState {
    pub db: Option<PgPool>,
    pub config: Arc<AppConfig>,
    pub clock: Arc<dyn Clock>,
    pub kv: Arc<dyn KvStore>,
    pub directory: Arc<UserDirectory>,
    pub timetable: Arc<Timetable>,
    pub passes: Arc<dyn PassRepo>,
    pub attendance: Arc<dyn AttendanceRepo>,
    pub marker: Arc<AttendanceMarker>,
}

struct Stores {
    kv: Arc<dyn KvStore>,
    passes: Arc<dyn PassRepo>,
    attendance: Arc<dyn AttendanceRepo>,
}

impl Stores {
    fn memory() -> Self {
        Self {
            kv: Arc::new(InMemoryKv::new()),
            passes: Arc::new(InMemoryPassRepo::new()),
            attendance: Arc::new(InMemoryAttendanceRepo::new()),
        }
    }

    fn postgres(db: &PgPool) -> Self {
        Self {
            kv: Arc::new(PgKv::new(db.clone())),
            passes: Arc::new(PgPassRepo::new(db.clone())),
            attendance: Arc::new(PgAttendanceRepo::new(db.clone())),
        }
    }
}

fn build_marker(school: &SchoolConfig, attendance: Arc<dyn AttendanceRepo>) -> AttendanceMarker {
    let checks = VerificationChecks {
        geofence: Arc::new(RadiusGeofence {
            campus: GeoPoint {
                lat: school.campus_lat,
                lng: school.campus_lng,
            },
            rooms: HashMap::new(),
            radius_m: school.geofence_radius_m,
        }),
        window: Arc::new(ClassTimeWindow {
            open_before: time::Duration::minutes(school.mark_open_before_minutes),
        }),
        device: Arc::new(RegisteredDevices::seeded(attendance.clone())),
    };
    AttendanceMarker::new(
        checks,
        attendance,
        std::time::Duration::from_millis(school.verification_timeout_ms),
        time::Duration::minutes(school.late_after_minutes),
    )
}

impl AppState {
    /// Postgres when `DATABASE_URL` is set, in-memory stores otherwise.
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = match &config.database_url {
            Some(url) => Some(
                PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?,
            ),
            None => {
                info!("DATABASE_URL not set, using in-memory stores");
                None
            }
        };
        let stores = db.as_ref().map(Stores::postgres).unwrap_or_else(Stores::memory);

        Ok(Self::from_parts(db, config, Arc::new(SystemClock), stores))
    }

    fn from_parts(db: Option<PgPool>, config: Arc<AppConfig>, clock: Arc<dyn Clock>, stores: Stores) -> Self {
        let marker = Arc::new(build_marker(&config.school, stores.attendance.clone()));
        Self {
            db,
            config,
            clock,
            kv: stores.kv,
            directory: Arc::new(UserDirectory::seeded()),
            timetable: Arc::new(Timetable::seeded()),
            passes: stores.passes,
            attendance: stores.attendance,
            marker,
        }
    }

    /// Current instant on the school's wall clock.
    pub fn school_now(&self) -> OffsetDateTime {
        self.clock
            .now_utc()
            .to_offset(school_offset(self.config.school.utc_offset_minutes))
    }

    pub fn clock_time(&self, at: OffsetDateTime) -> ClockTime {
        ClockTime::from_time(at.time())
    }

    pub fn fake() -> Self {
        Self::fake_with_clock().0
    }

    /// In-memory state pinned to Monday 2024-01-15 09:30 UTC.
    pub fn fake_with_clock() -> (Self, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(time::macros::datetime!(2024-01-15 09:30 UTC)));
        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
            },
            school: SchoolConfig::default(),
        });
        let state = Self::from_parts(None, config, clock.clone(), Stores::memory());
        (state, clock)
    }
}
