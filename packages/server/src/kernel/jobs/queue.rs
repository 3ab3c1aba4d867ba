//! Durable job queue: trait plus the PostgreSQL implementation.
//!
//! The queue is the only place job state lives. Workers claim jobs under a
//! lease, extend it by heartbeat, and report the outcome; a crashed worker's
//! job becomes claimable again once its lease runs out.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::job::Job;

/// Trait for job queue operations.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Create backing tables if missing.
    async fn ensure_schema(&self) -> Result<()>;

    /// Store a waiting job. Returns immediately.
    async fn enqueue(&self, job: Job) -> Result<Uuid>;

    async fn find(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Claim up to `limit` runnable jobs for `worker_id`, incrementing their attempt count.
    ///
    /// Runnable: waiting with `run_at` due, or active with an expired lease and
    /// attempts remaining.
    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>>;

    // The writes below apply only while `worker_id` still owns the active job.
    // They return `false` when ownership was lost (lease reclaimed, job purged).

    /// Raise progress to `progress`. Never lowers it.
    async fn set_progress(&self, job_id: Uuid, worker_id: &str, progress: i32) -> Result<bool>;

    /// Extend the lease for a running job.
    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<bool>;

    async fn mark_completed(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result: serde_json::Value,
    ) -> Result<bool>;

    /// Record a failed attempt. `Some(retry_at)` puts the job back to waiting
    /// until then; `None` fails it permanently.
    async fn mark_failed(
        &self,
        job_id: Uuid,
        worker_id: &str,
        reason: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Delete jobs created before `cutoff`, whatever their state.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Fail active jobs whose lease expired after their last allowed attempt.
    async fn fail_stale(&self) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS ingest_jobs (
        id UUID PRIMARY KEY,
        job_type TEXT NOT NULL,
        source_id TEXT NOT NULL,
        options JSONB NOT NULL DEFAULT '{}',
        state TEXT NOT NULL DEFAULT 'waiting',
        progress INTEGER NOT NULL DEFAULT 0,
        attempts_made INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL DEFAULT 3,
        result JSONB,
        failure_reason TEXT,
        run_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        lease_expires_at TIMESTAMPTZ,
        worker_id TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        finished_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_ingest_jobs_runnable ON ingest_jobs (state, run_at)",
    "CREATE INDEX IF NOT EXISTS idx_ingest_jobs_created ON ingest_jobs (created_at)",
];

/// PostgreSQL-backed job queue implementation.
pub struct PostgresJobQueue {
    pool: PgPool,
    lease_ms: i64,
}

impl PostgresJobQueue {
    /// Create a new PostgreSQL job queue.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease_ms: 60_000, // 1 minute
        }
    }

    /// Create with a custom lease duration.
    pub fn with_lease_duration(pool: PgPool, lease: Duration) -> Self {
        Self {
            pool,
            lease_ms: lease.as_millis() as i64,
        }
    }

    pub fn lease_ms(&self) -> i64 {
        self.lease_ms
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn enqueue(&self, job: Job) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO ingest_jobs (
                id, job_type, source_id, options, state, progress, attempts_made,
                max_attempts, run_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(job.id)
        .bind(&job.job_type)
        .bind(&job.source_id)
        .bind(&job.options)
        .bind(&job.state)
        .bind(job.progress)
        .bind(job.attempts_made)
        .bind(job.max_attempts)
        .bind(job.run_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(job.id)
    }

    async fn find(&self, job_id: Uuid) -> Result<Option<Job>> {
        sqlx::query_as::<_, Job>("SELECT * FROM ingest_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            WITH next_jobs AS (
                SELECT id
                FROM ingest_jobs
                WHERE
                    (state = 'waiting' AND run_at <= NOW())
                    OR (state = 'active' AND lease_expires_at < NOW() AND attempts_made < max_attempts)
                ORDER BY run_at, created_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE ingest_jobs
            SET
                state = 'active',
                attempts_made = attempts_made + 1,
                lease_expires_at = NOW() + ($2 || ' milliseconds')::INTERVAL,
                worker_id = $3,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_jobs)
            RETURNING *
            "#,
        )
        .bind(limit)
        .bind(self.lease_ms.to_string())
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn set_progress(&self, job_id: Uuid, worker_id: &str, progress: i32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET progress = GREATEST(progress, $1),
                updated_at = NOW()
            WHERE id = $2 AND worker_id = $3 AND state = 'active'
            "#,
        )
        .bind(progress.clamp(0, 100))
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET lease_expires_at = NOW() + ($1 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE id = $2 AND worker_id = $3 AND state = 'active'
            "#,
        )
        .bind(self.lease_ms.to_string())
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result: serde_json::Value,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET state = 'completed',
                progress = 100,
                result = $1,
                failure_reason = NULL,
                lease_expires_at = NULL,
                finished_at = NOW(),
                updated_at = NOW()
            WHERE id = $2 AND worker_id = $3 AND state = 'active'
            "#,
        )
        .bind(Json(result))
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(updated.rows_affected() > 0)
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        worker_id: &str,
        reason: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = match retry_at {
            Some(run_at) => {
                sqlx::query(
                    r#"
                    UPDATE ingest_jobs
                    SET state = 'waiting',
                        failure_reason = $1,
                        run_at = $2,
                        lease_expires_at = NULL,
                        worker_id = NULL,
                        updated_at = NOW()
                    WHERE id = $3 AND worker_id = $4 AND state = 'active'
                    "#,
                )
                .bind(reason)
                .bind(run_at)
                .bind(job_id)
                .bind(worker_id)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE ingest_jobs
                    SET state = 'failed',
                        failure_reason = $1,
                        lease_expires_at = NULL,
                        finished_at = NOW(),
                        updated_at = NOW()
                    WHERE id = $2 AND worker_id = $3 AND state = 'active'
                    "#,
                )
                .bind(reason)
                .bind(job_id)
                .bind(worker_id)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM ingest_jobs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn fail_stale(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET state = 'failed',
                failure_reason = COALESCE(failure_reason, 'worker lease expired on final attempt'),
                lease_expires_at = NULL,
                finished_at = NOW(),
                updated_at = NOW()
            WHERE state = 'active'
              AND lease_expires_at < NOW()
              AND attempts_made >= max_attempts
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
