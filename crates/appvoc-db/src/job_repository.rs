use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use appvoc_core::error::AppError;
use appvoc_core::job::{ControllerKind, Job, JobStatus};
use appvoc_core::run::JobRunRecord;
use appvoc_core::traits::JobStore;

/// PostgreSQL-backed job and job-run storage.
#[derive(Clone)]
pub struct JobRepository {
    pool: Pool<Postgres>,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs recorded for a job, newest first.
    pub async fn list_runs(&self, job_id: Uuid) -> Result<Vec<JobRunRecord>, AppError> {
        let rows = sqlx::query_as::<_, JobRunRow>(
            r#"
            SELECT * FROM jobrun
            WHERE job_id = $1
            ORDER BY started DESC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Delete every job (and, by cascade, every run) for `controller`.
    pub async fn delete_jobs(&self, controller: ControllerKind) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM job WHERE controller = $1")
            .bind(controller.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    controller: String,
    category_id: i64,
    category: String,
    status: String,
    complete: bool,
    completed: Option<DateTime<Utc>>,
    runs: i32,
    started: Option<DateTime<Utc>>,
    updated: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = AppError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            controller: row.controller.parse().map_err(AppError::DatabaseError)?,
            category_id: row.category_id,
            category: row.category,
            status: row.status.parse().unwrap_or(JobStatus::NotStarted),
            complete: row.complete,
            completed: row.completed,
            runs: row.runs,
            started: row.started,
            updated: row.updated,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobRunRow {
    id: Uuid,
    job_id: Uuid,
    controller: String,
    category_id: i64,
    category: String,
    started: DateTime<Utc>,
    ended: Option<DateTime<Utc>>,
    elapsed_seconds: f64,
    requests: i64,
    client_errors: i64,
    server_errors: i64,
    data_errors: i64,
    errors: i64,
    size_bytes: i64,
    size_ave: f64,
    bytes_per_second: f64,
    items: i64,
    metrics: serde_json::Value,
    complete: bool,
}

impl TryFrom<JobRunRow> for JobRunRecord {
    type Error = AppError;

    fn try_from(row: JobRunRow) -> Result<Self, Self::Error> {
        Ok(JobRunRecord {
            id: row.id,
            job_id: row.job_id,
            controller: row.controller.parse().map_err(AppError::DatabaseError)?,
            category_id: row.category_id,
            category: row.category,
            started: row.started,
            ended: row.ended,
            elapsed_seconds: row.elapsed_seconds,
            requests: row.requests,
            client_errors: row.client_errors,
            server_errors: row.server_errors,
            data_errors: row.data_errors,
            errors: row.errors,
            size_bytes: row.size_bytes,
            size_ave: row.size_ave,
            bytes_per_second: row.bytes_per_second,
            items: row.items,
            metrics: row.metrics,
            complete: row.complete,
        })
    }
}

impl JobStore for JobRepository {
    async fn add_job(&self, job: &Job) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO job (id, controller, category_id, category, status, complete,
                             completed, runs, started, updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.id)
        .bind(job.controller.as_str())
        .bind(job.category_id)
        .bind(&job.category)
        .bind(job.status.as_str())
        .bind(job.complete)
        .bind(job.completed)
        .bind(job.runs)
        .bind(job.started)
        .bind(job.updated)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, AppError> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM job WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update_job(&self, job: &Job) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE job
            SET status = $2, complete = $3, completed = $4, runs = $5,
                started = $6, updated = $7
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.complete)
        .bind(job.completed)
        .bind(job.runs)
        .bind(job.started)
        .bind(job.updated)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::DatabaseError(format!("Job {} not found", job.id)));
        }
        Ok(())
    }

    async fn list_jobs(&self, controller: ControllerKind) -> Result<Vec<Job>, AppError> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM job
            WHERE controller = $1
            ORDER BY category_id ASC
            "#,
        )
        .bind(controller.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn pick(
        &self,
        controller: ControllerKind,
        status: JobStatus,
    ) -> Result<Option<Job>, AppError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM job
            WHERE controller = $1 AND status = $2
            ORDER BY random()
            LIMIT 1
            "#,
        )
        .bind(controller.as_str())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        row.map(TryInto::try_into).transpose()
    }

    async fn add_jobrun(&self, run: &JobRunRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO jobrun (id, job_id, controller, category_id, category, started, ended,
                                elapsed_seconds, requests, client_errors, server_errors,
                                data_errors, errors, size_bytes, size_ave, bytes_per_second,
                                items, metrics, complete)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19)
            "#,
        )
        .bind(run.id)
        .bind(run.job_id)
        .bind(run.controller.as_str())
        .bind(run.category_id)
        .bind(&run.category)
        .bind(run.started)
        .bind(run.ended)
        .bind(run.elapsed_seconds)
        .bind(run.requests)
        .bind(run.client_errors)
        .bind(run.server_errors)
        .bind(run.data_errors)
        .bind(run.errors)
        .bind(run.size_bytes)
        .bind(run.size_ave)
        .bind(run.bytes_per_second)
        .bind(run.items)
        .bind(&run.metrics)
        .bind(run.complete)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn update_jobrun(&self, run: &JobRunRecord) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE jobrun
            SET ended = $2, elapsed_seconds = $3, requests = $4, client_errors = $5,
                server_errors = $6, data_errors = $7, errors = $8, size_bytes = $9,
                size_ave = $10, bytes_per_second = $11, items = $12, metrics = $13,
                complete = $14
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(run.ended)
        .bind(run.elapsed_seconds)
        .bind(run.requests)
        .bind(run.client_errors)
        .bind(run.server_errors)
        .bind(run.data_errors)
        .bind(run.errors)
        .bind(run.size_bytes)
        .bind(run.size_ave)
        .bind(run.bytes_per_second)
        .bind(run.items)
        .bind(&run.metrics)
        .bind(run.complete)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::DatabaseError(format!(
                "Job run {} not found",
                run.id
            )));
        }
        Ok(())
    }
}
