//! Embed stage - turns a submitted batch into stored documents

use tracing::{info, instrument, warn};

use sniprag_core::{document_id, DocPayload, Stage, SubmittedItem};
use sniprag_db::{DocumentStore, WorkQueue};

use crate::{AuditLog, EmbeddingClient, PipelineError, Result};

/// The Embed stage: filter the batch, embed every surviving snippet in
/// one request, persist the documents, and enqueue extraction.
pub struct EmbedStage {
    docs: DocumentStore,
    queue: WorkQueue,
    embeddings: EmbeddingClient,
    audit: AuditLog,
}

impl EmbedStage {
    pub fn new(
        docs: DocumentStore,
        queue: WorkQueue,
        embeddings: EmbeddingClient,
        audit: AuditLog,
    ) -> Self {
        Self {
            docs,
            queue,
            embeddings,
            audit,
        }
    }

    /// Process one batch. Returns the number of documents created.
    ///
    /// Failure semantics: an embedding-count mismatch or a service error
    /// aborts the whole batch with nothing persisted and nothing
    /// enqueued; each batch run is independent of every other.
    #[instrument(skip(self, items))]
    pub async fn run(&self, items: &[SubmittedItem], timestamp: &str) -> Result<usize> {
        self.audit.append(timestamp, items);

        let eligible: Vec<(&SubmittedItem, &str)> = items
            .iter()
            .filter_map(|item| item.eligible_snippet().map(|snippet| (item, snippet)))
            .collect();

        if eligible.is_empty() {
            info!("No valid snippets in batch {}, skipping", timestamp);
            return Ok(0);
        }

        let texts: Vec<String> = eligible
            .iter()
            .map(|(_, snippet)| snippet.to_string())
            .collect();

        let vectors = self.embeddings.embed_batch(&texts).await?;

        if vectors.len() != texts.len() {
            warn!(
                sent = texts.len(),
                received = vectors.len(),
                "Embedding count mismatch, aborting batch"
            );
            return Err(PipelineError::EmbeddingCountMismatch {
                sent: texts.len(),
                received: vectors.len(),
            });
        }

        for ((item, snippet), vector) in eligible.iter().zip(vectors.into_iter()) {
            let doc_id = document_id(snippet, timestamp);

            self.docs.upsert_metadata(&doc_id, item, snippet).await?;
            self.docs.put_embedding(&doc_id, &vector).await?;
            self.queue
                .enqueue(
                    Stage::Extract,
                    DocPayload {
                        doc_id: doc_id.clone(),
                    },
                )
                .await?;

            info!("Embedded document {}", doc_id);
        }

        info!(
            "Batch {} processed: {} documents created",
            timestamp,
            eligible.len()
        );
        Ok(eligible.len())
    }
}
