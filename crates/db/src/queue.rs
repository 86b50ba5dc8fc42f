//! Durable work queue
//!
//! At-least-once delivery: a claimed job that is never completed stays
//! `running` until re-driven; a failed job goes back to `pending`
//! behind a backoff gate until its attempts are exhausted, then parks
//! in the dead-letter state for inspection or manual re-drive.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use surrealdb::types::{RecordId, RecordIdKey, ToSql};
use tracing::{info, instrument, warn};

use sniprag_core::{JobStatus, Stage, MAX_ATTEMPTS};

use crate::{DbConnection, DbError, Result};

/// A queued unit of pipeline work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    #[serde(default)]
    pub id: Option<RecordId>,
    pub stage: Stage,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub not_before: i64,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueuedJob {
    pub fn key(&self) -> Option<String> {
        self.id.as_ref().map(|id| match &id.key {
            RecordIdKey::String(s) => s.clone(),
            other => other.to_sql(),
        })
    }
}

/// Repository for the job queue
#[derive(Clone)]
pub struct WorkQueue {
    db: DbConnection,
}

impl WorkQueue {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Enqueue a job for a stage
    #[instrument(skip(self, payload))]
    pub async fn enqueue(&self, stage: Stage, payload: impl Serialize) -> Result<QueuedJob> {
        let job = QueuedJob {
            id: None,
            stage,
            payload: serde_json::to_value(payload)?,
            status: JobStatus::Pending,
            attempts: 0,
            not_before: 0,
            last_error: None,
        };

        let created: Option<QueuedJob> = self.db.create("job").content(job).await?;
        created.ok_or_else(|| DbError::CreateFailed("job".into()))
    }

    /// Claim the oldest eligible pending job, marking it running.
    ///
    /// Compare-and-set on the status guards against another worker
    /// claiming the same record between the select and the update.
    #[instrument(skip(self))]
    pub async fn claim_next(&self) -> Result<Option<QueuedJob>> {
        let now = Utc::now().timestamp();

        let candidates: Vec<QueuedJob> = self
            .db
            .query(
                "SELECT * FROM job WHERE status = 'pending' AND not_before <= $now \
                 ORDER BY created_at ASC LIMIT 1",
            )
            .bind(("now", now))
            .await?
            .take(0)?;

        let Some(candidate) = candidates.into_iter().next() else {
            return Ok(None);
        };
        let Some(id) = candidate.id.clone() else {
            return Ok(None);
        };

        let claimed: Vec<QueuedJob> = self
            .db
            .query(
                "UPDATE $job SET status = 'running' \
                 WHERE status = 'pending' RETURN AFTER",
            )
            .bind(("job", id))
            .await?
            .take(0)?;

        Ok(claimed.into_iter().next())
    }

    /// Mark a job as succeeded
    #[instrument(skip(self, job))]
    pub async fn complete(&self, job: &QueuedJob) -> Result<()> {
        if let Some(id) = job.id.clone() {
            self.db
                .query("UPDATE $job SET status = 'succeeded'")
                .bind(("job", id))
                .await?;
        }
        Ok(())
    }

    /// Record a failed delivery: back to pending behind the stage's
    /// backoff delay, or dead-lettered once attempts are exhausted.
    /// Returns the status the job ended in.
    #[instrument(skip(self, job, error))]
    pub async fn retry_or_fail(&self, job: &QueuedJob, error: &str) -> Result<JobStatus> {
        let Some(id) = job.id.clone() else {
            return Ok(JobStatus::Failed);
        };
        let attempts = job.attempts + 1;

        if attempts >= MAX_ATTEMPTS {
            warn!(
                stage = %job.stage,
                attempts,
                "Job exhausted its retries, moving to the failed registry"
            );
            self.db
                .query(
                    "UPDATE $job SET status = 'failed', attempts = $attempts, \
                     last_error = $error",
                )
                .bind(("job", id))
                .bind(("attempts", attempts))
                .bind(("error", error.to_string()))
                .await?;
            return Ok(JobStatus::Failed);
        }

        let delay = Stage::backoff_secs(attempts);
        let not_before = Utc::now().timestamp() + delay as i64;
        info!(
            stage = %job.stage,
            attempts,
            delay_secs = delay,
            "Job failed, scheduling redelivery"
        );
        self.db
            .query(
                "UPDATE $job SET status = 'pending', attempts = $attempts, \
                 not_before = $not_before, last_error = $error",
            )
            .bind(("job", id))
            .bind(("attempts", attempts))
            .bind(("not_before", not_before))
            .bind(("error", error.to_string()))
            .await?;
        Ok(JobStatus::Pending)
    }

    /// List dead-lettered jobs
    #[instrument(skip(self))]
    pub async fn failed_jobs(&self) -> Result<Vec<QueuedJob>> {
        let jobs: Vec<QueuedJob> = self
            .db
            .query("SELECT * FROM job WHERE status = 'failed' ORDER BY created_at ASC")
            .await?
            .take(0)?;
        Ok(jobs)
    }

    /// Re-drive a dead-lettered job by its bare id. Returns false when
    /// no failed job has that id.
    #[instrument(skip(self))]
    pub async fn redrive(&self, job_id: &str) -> Result<bool> {
        let redriven: Vec<QueuedJob> = self
            .db
            .query(
                "UPDATE $job SET status = 'pending', attempts = 0, not_before = 0 \
                 WHERE status = 'failed' RETURN AFTER",
            )
            .bind(("job", RecordId::from(("job", job_id))))
            .await?
            .take(0)?;
        Ok(!redriven.is_empty())
    }

    /// Get queue statistics
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<QueueStats> {
        let stats: Vec<QueueStats> = self
            .db
            .query(
                r#"
                RETURN {
                    pending: (SELECT count() FROM job WHERE status = 'pending' GROUP ALL)[0].count ?? 0,
                    running: (SELECT count() FROM job WHERE status = 'running' GROUP ALL)[0].count ?? 0,
                    succeeded: (SELECT count() FROM job WHERE status = 'succeeded' GROUP ALL)[0].count ?? 0,
                    failed: (SELECT count() FROM job WHERE status = 'failed' GROUP ALL)[0].count ?? 0
                }
                "#,
            )
            .await?
            .take(0)?;

        stats
            .into_iter()
            .next()
            .ok_or_else(|| DbError::QueryFailed("queue stats".into()))
    }
}

/// Job counts by lifecycle state
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueueStats {
    #[serde(default)]
    pub pending: i64,
    #[serde(default)]
    pub running: i64,
    #[serde(default)]
    pub succeeded: i64,
    #[serde(default)]
    pub failed: i64,
}
