//! PostgreSQL job store
//!
//! Backs the scheduler's durability guarantee: a job inserted here
//! survives process restart and is picked up by whichever runner drains
//! the table next.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use fates_scheduler::{JobStore, ScheduledJob};
use fates_types::{FatesError, JobId, Result};

use crate::error::db_err;
use crate::models::DbScheduledJob;

const JOB_COLUMNS: &str = "id, job_type, payload, run_at, status, attempts, created_at";

/// Job store over PostgreSQL
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &ScheduledJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_jobs (id, job_type, payload, run_at, status, attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id.0)
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(job.run_at)
        .bind(job.status.as_str())
        .bind(job.attempts as i32)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<ScheduledJob>> {
        let row = sqlx::query_as::<_, DbScheduledJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbScheduledJob::into_domain).transpose()
    }

    async fn due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<ScheduledJob>> {
        let rows = sqlx::query_as::<_, DbScheduledJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM scheduled_jobs \
             WHERE status = 'PENDING' AND run_at <= $1 \
             ORDER BY created_at ASC, id ASC LIMIT $2"
        ))
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbScheduledJob::into_domain).collect()
    }

    async fn mark_completed(&self, id: JobId) -> Result<()> {
        self.set_status(id, "COMPLETED").await
    }

    async fn mark_failed(&self, id: JobId) -> Result<()> {
        self.set_status(id, "FAILED").await
    }

    async fn cancel(&self, id: JobId) -> Result<()> {
        sqlx::query("UPDATE scheduled_jobs SET status = 'CANCELLED' WHERE id = $1 AND status = 'PENDING'")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn requeue(&self, id: JobId, run_at: DateTime<Utc>) -> Result<()> {
        let rows = sqlx::query(
            "UPDATE scheduled_jobs SET run_at = $2, attempts = attempts + 1, status = 'PENDING' WHERE id = $1",
        )
        .bind(id.0)
        .bind(run_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        if rows == 0 {
            return Err(FatesError::internal(format!("job {id} not found")));
        }
        Ok(())
    }
}

impl PgJobStore {
    async fn set_status(&self, id: JobId, status: &str) -> Result<()> {
        let rows = sqlx::query("UPDATE scheduled_jobs SET status = $2 WHERE id = $1")
            .bind(id.0)
            .bind(status)
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();

        if rows == 0 {
            return Err(FatesError::internal(format!("job {id} not found")));
        }
        Ok(())
    }
}
