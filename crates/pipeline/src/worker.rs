//! Worker loop - claims queued jobs and drives the pipeline stages

use std::time::Duration;

use tracing::{info, instrument, warn};

use sniprag_core::{DocPayload, DocStatus, EmbedPayload, JobStatus, Stage, SubmittedItem};
use sniprag_db::{DbConnection, DocumentStore, GraphStore, QueuedJob, WorkQueue};

use crate::{
    AuditLog, CompletionClient, EmbedStage, EmbeddingClient, ExtractStage, LoadStage, Result,
    Settings,
};

/// Accept a submitted batch: enqueue one Embed job carrying the raw
/// items. Acceptance is immediate; processing is asynchronous and
/// status is polled, not returned.
pub async fn submit_batch(
    queue: &WorkQueue,
    items: Vec<SubmittedItem>,
    timestamp: String,
) -> Result<QueuedJob> {
    let job = queue
        .enqueue(Stage::Embed, EmbedPayload { items, timestamp })
        .await?;
    info!("Queued embed job {:?}", job.key());
    Ok(job)
}

/// A pipeline worker. Stateless between jobs: stores are constructed
/// from the shared connection per invocation and dropped on every exit
/// path when the invocation ends.
pub struct Worker {
    db: DbConnection,
    embeddings: EmbeddingClient,
    completions: CompletionClient,
    audit: AuditLog,
}

impl Worker {
    pub fn new(db: DbConnection, settings: &Settings) -> Self {
        Self {
            db,
            embeddings: EmbeddingClient::new(
                settings.embedding_url.clone(),
                settings.request_timeout_secs,
            ),
            completions: CompletionClient::new(
                settings.completion_url.clone(),
                settings.request_timeout_secs,
            ),
            audit: AuditLog::new(settings.audit_path.clone()),
        }
    }

    /// Claim and process at most one job. Returns whether a job was
    /// claimed, so callers can decide when to idle.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<bool> {
        let queue = WorkQueue::new(self.db.clone());
        let Some(job) = queue.claim_next().await? else {
            return Ok(false);
        };

        info!(stage = %job.stage, job = ?job.key(), "Processing job");

        match self.dispatch(&job).await {
            Ok(()) => {
                queue.complete(&job).await?;
            }
            Err(e) => {
                warn!(stage = %job.stage, error = %e, "Job execution failed");
                let outcome = queue.retry_or_fail(&job, &e.to_string()).await?;
                if outcome == JobStatus::Failed {
                    self.mark_document_failed(&job).await;
                }
            }
        }
        Ok(true)
    }

    /// Run until the process is stopped, idling between empty polls.
    /// Claim errors are logged and retried rather than killing the
    /// worker.
    pub async fn run(&self, poll_interval: Duration) {
        info!("Worker started");
        loop {
            match self.run_once().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(poll_interval).await,
                Err(e) => {
                    warn!("Worker iteration failed: {}", e);
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }

    async fn dispatch(&self, job: &QueuedJob) -> Result<()> {
        let docs = DocumentStore::new(self.db.clone());
        let queue = WorkQueue::new(self.db.clone());

        match job.stage {
            Stage::Embed => {
                let payload: EmbedPayload = serde_json::from_value(job.payload.clone())?;
                EmbedStage::new(docs, queue, self.embeddings.clone(), self.audit.clone())
                    .run(&payload.items, &payload.timestamp)
                    .await?;
            }
            Stage::Extract => {
                let payload: DocPayload = serde_json::from_value(job.payload.clone())?;
                ExtractStage::new(docs, queue, self.completions.clone())
                    .run(&payload.doc_id)
                    .await?;
            }
            Stage::Load => {
                let payload: DocPayload = serde_json::from_value(job.payload.clone())?;
                LoadStage::new(docs, GraphStore::new(self.db.clone()))
                    .run(&payload.doc_id)
                    .await?;
            }
        }
        Ok(())
    }

    /// Record retry exhaustion on the document itself so its pipeline
    /// state can be polled. Embed jobs have no document yet.
    async fn mark_document_failed(&self, job: &QueuedJob) {
        let Ok(payload) = serde_json::from_value::<DocPayload>(job.payload.clone()) else {
            return;
        };
        let docs = DocumentStore::new(self.db.clone());
        if let Err(e) = docs
            .set_status(&payload.doc_id, DocStatus::Failed(job.stage))
            .await
        {
            warn!(
                "Could not mark document {} as failed: {}",
                payload.doc_id, e
            );
        }
    }
}
