use std::sync::RwLock;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::Date;
use uuid::Uuid;

use super::repo_types::{AttendanceRecord, AttendanceRow};
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait AttendanceRepo: Send + Sync {
    /// Fails with `AlreadyMarked` when (student, class, date) already exists.
    async fn insert(&self, record: &AttendanceRecord) -> AppResult<()>;

    async fn find(&self, student_id: Uuid, class_id: &str, date: Date) -> anyhow::Result<Option<AttendanceRecord>>;

    async fn list_for_student(&self, student_id: Uuid, date: Date) -> anyhow::Result<Vec<AttendanceRecord>>;

    async fn list_on(&self, date: Date) -> anyhow::Result<Vec<AttendanceRecord>>;

    /// True when `device_id` marked someone other than `student_id` on `date`.
    async fn device_used_by_other(&self, device_id: &str, date: Date, student_id: Uuid) -> anyhow::Result<bool>;
}

#[derive(Default)]
pub struct InMemoryAttendanceRepo {
    records: RwLock<Vec<AttendanceRecord>>,
}

impl InMemoryAttendanceRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttendanceRepo for InMemoryAttendanceRepo {
    async fn insert(&self, record: &AttendanceRecord) -> AppResult<()> {
        let mut records = self.records.write().unwrap();
        let taken = records.iter().any(|r| {
            r.student_id == record.student_id && r.class_id == record.class_id && r.date == record.date
        });
        if taken {
            return Err(AppError::AlreadyMarked);
        }
        records.push(record.clone());
        Ok(())
    }

    async fn find(&self, student_id: Uuid, class_id: &str, date: Date) -> anyhow::Result<Option<AttendanceRecord>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .iter()
            .find(|r| r.student_id == student_id && r.class_id == class_id && r.date == date)
            .cloned())
    }

    async fn list_for_student(&self, student_id: Uuid, date: Date) -> anyhow::Result<Vec<AttendanceRecord>> {
        let mut out: Vec<_> = self
            .records
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.student_id == student_id && r.date == date)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.timestamp);
        Ok(out)
    }

    async fn list_on(&self, date: Date) -> anyhow::Result<Vec<AttendanceRecord>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.date == date)
            .cloned()
            .collect())
    }

    async fn device_used_by_other(&self, device_id: &str, date: Date, student_id: Uuid) -> anyhow::Result<bool> {
        Ok(self
            .records
            .read()
            .unwrap()
            .iter()
            .any(|r| r.device_id == device_id && r.date == date && r.student_id != student_id))
    }
}

#[derive(Clone)]
pub struct PgAttendanceRepo {
    db: PgPool,
}

impl PgAttendanceRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, student_id, class_id, date, status, method, recorded_at, lat, lng, device_id
      FROM attendance_records
"#;

fn rows_into(rows: Vec<AttendanceRow>) -> anyhow::Result<Vec<AttendanceRecord>> {
    rows.into_iter().map(AttendanceRecord::try_from).collect()
}

#[async_trait]
impl AttendanceRepo for PgAttendanceRepo {
    async fn insert(&self, record: &AttendanceRecord) -> AppResult<()> {
        let done = sqlx::query(
            r#"
            INSERT INTO attendance_records
                (id, student_id, class_id, date, status, method, recorded_at, lat, lng, device_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (student_id, class_id, date) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.student_id)
        .bind(&record.class_id)
        .bind(record.date)
        .bind(record.status.as_str())
        .bind(record.method.as_str())
        .bind(record.timestamp)
        .bind(record.location.map(|p| p.lat))
        .bind(record.location.map(|p| p.lng))
        .bind(&record.device_id)
        .execute(&self.db)
        .await
        .context("insert attendance record")?;

        if done.rows_affected() == 0 {
            return Err(AppError::AlreadyMarked);
        }
        Ok(())
    }

    async fn find(&self, student_id: Uuid, class_id: &str, date: Date) -> anyhow::Result<Option<AttendanceRecord>> {
        let row = sqlx::query_as::<_, AttendanceRow>(&format!(
            "{SELECT_COLUMNS} WHERE student_id = $1 AND class_id = $2 AND date = $3"
        ))
        .bind(student_id)
        .bind(class_id)
        .bind(date)
        .fetch_optional(&self.db)
        .await
        .context("find attendance record")?;
        row.map(AttendanceRecord::try_from).transpose()
    }

    async fn list_for_student(&self, student_id: Uuid, date: Date) -> anyhow::Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(&format!(
            "{SELECT_COLUMNS} WHERE student_id = $1 AND date = $2 ORDER BY recorded_at ASC"
        ))
        .bind(student_id)
        .bind(date)
        .fetch_all(&self.db)
        .await
        .context("list attendance by student")?;
        rows_into(rows)
    }

    async fn list_on(&self, date: Date) -> anyhow::Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(&format!("{SELECT_COLUMNS} WHERE date = $1"))
            .bind(date)
            .fetch_all(&self.db)
            .await
            .context("list attendance by date")?;
        rows_into(rows)
    }

    async fn device_used_by_other(&self, device_id: &str, date: Date, student_id: Uuid) -> anyhow::Result<bool> {
        let (used,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM attendance_records
                 WHERE device_id = $1 AND date = $2 AND student_id <> $3
            )
            "#,
        )
        .bind(device_id)
        .bind(date)
        .bind(student_id)
        .fetch_one(&self.db)
        .await
        .context("device reuse lookup")?;
        Ok(used)
    }
}
