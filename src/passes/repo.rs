use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{MovementPass, PassRow, PassStatus};
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait PassRepo: Send + Sync {
    /// Fails with `AlreadyActive` when the student already holds an open pass.
    async fn insert(&self, pass: &MovementPass) -> AppResult<()>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<MovementPass>>;

    /// Writes `pass` only if the stored status is still `expected`.
    async fn update_if(&self, pass: &MovementPass, expected: PassStatus) -> anyhow::Result<bool>;

    async fn list_for_student(&self, student_id: Uuid) -> anyhow::Result<Vec<MovementPass>>;

    async fn list_by_status(&self, statuses: &[PassStatus]) -> anyhow::Result<Vec<MovementPass>>;
}

#[derive(Default)]
pub struct InMemoryPassRepo {
    passes: RwLock<HashMap<Uuid, MovementPass>>,
}

impl InMemoryPassRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut passes: Vec<MovementPass>) -> Vec<MovementPass> {
    passes.sort_by(|a, b| b.request_time.cmp(&a.request_time));
    passes
}

#[async_trait]
impl PassRepo for InMemoryPassRepo {
    async fn insert(&self, pass: &MovementPass) -> AppResult<()> {
        let mut passes = self.passes.write().unwrap();
        if passes
            .values()
            .any(|p| p.student_id == pass.student_id && p.status.is_open())
        {
            return Err(AppError::AlreadyActive);
        }
        passes.insert(pass.id, pass.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<MovementPass>> {
        Ok(self.passes.read().unwrap().get(&id).cloned())
    }

    async fn update_if(&self, pass: &MovementPass, expected: PassStatus) -> anyhow::Result<bool> {
        let mut passes = self.passes.write().unwrap();
        match passes.get_mut(&pass.id) {
            Some(stored) if stored.status == expected => {
                *stored = pass.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_student(&self, student_id: Uuid) -> anyhow::Result<Vec<MovementPass>> {
        let found = self
            .passes
            .read()
            .unwrap()
            .values()
            .filter(|p| p.student_id == student_id)
            .cloned()
            .collect();
        Ok(newest_first(found))
    }

    async fn list_by_status(&self, statuses: &[PassStatus]) -> anyhow::Result<Vec<MovementPass>> {
        let found = self
            .passes
            .read()
            .unwrap()
            .values()
            .filter(|p| statuses.contains(&p.status))
            .cloned()
            .collect();
        Ok(newest_first(found))
    }
}

#[derive(Clone)]
pub struct PgPassRepo {
    db: PgPool,
}

impl PgPassRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, student_id, reason, destination, request_time, valid_until,
           status, approved_by, tracking, lat, lng
      FROM movement_passes
"#;

fn rows_into(rows: Vec<PassRow>) -> anyhow::Result<Vec<MovementPass>> {
    rows.into_iter().map(MovementPass::try_from).collect()
}

#[async_trait]
impl PassRepo for PgPassRepo {
    async fn insert(&self, pass: &MovementPass) -> AppResult<()> {
        // one_open_pass_per_student is a partial unique index over open statuses
        let res = sqlx::query(
            r#"
            INSERT INTO movement_passes
                (id, student_id, reason, destination, request_time, valid_until,
                 status, approved_by, tracking, lat, lng)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(pass.id)
        .bind(pass.student_id)
        .bind(&pass.reason)
        .bind(&pass.destination)
        .bind(pass.request_time)
        .bind(pass.valid_until)
        .bind(pass.status.as_str())
        .bind(pass.approved_by)
        .bind(pass.tracking)
        .bind(pass.location.map(|p| p.lat))
        .bind(pass.location.map(|p| p.lng))
        .execute(&self.db)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.constraint() == Some("one_open_pass_per_student") => {
                Err(AppError::AlreadyActive)
            }
            Err(e) => Err(anyhow::Error::new(e).context("insert movement pass").into()),
        }
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<MovementPass>> {
        let row = sqlx::query_as::<_, PassRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("get movement pass")?;
        row.map(MovementPass::try_from).transpose()
    }

    async fn update_if(&self, pass: &MovementPass, expected: PassStatus) -> anyhow::Result<bool> {
        let done = sqlx::query(
            r#"
            UPDATE movement_passes
               SET status = $2, approved_by = $3, tracking = $4, lat = $5, lng = $6
             WHERE id = $1 AND status = $7
            "#,
        )
        .bind(pass.id)
        .bind(pass.status.as_str())
        .bind(pass.approved_by)
        .bind(pass.tracking)
        .bind(pass.location.map(|p| p.lat))
        .bind(pass.location.map(|p| p.lng))
        .bind(expected.as_str())
        .execute(&self.db)
        .await
        .context("update movement pass")?;
        Ok(done.rows_affected() == 1)
    }

    async fn list_for_student(&self, student_id: Uuid) -> anyhow::Result<Vec<MovementPass>> {
        let rows = sqlx::query_as::<_, PassRow>(&format!(
            "{SELECT_COLUMNS} WHERE student_id = $1 ORDER BY request_time DESC"
        ))
        .bind(student_id)
        .fetch_all(&self.db)
        .await
        .context("list passes by student")?;
        rows_into(rows)
    }

    async fn list_by_status(&self, statuses: &[PassStatus]) -> anyhow::Result<Vec<MovementPass>> {
        let statuses: Vec<&str> = statuses.iter().map(PassStatus::as_str).collect();
        let rows = sqlx::query_as::<_, PassRow>(&format!(
            "{SELECT_COLUMNS} WHERE status = ANY($1) ORDER BY request_time DESC"
        ))
        .bind(&statuses)
        .fetch_all(&self.db)
        .await
        .context("list passes by status")?;
        rows_into(rows)
    }
}
