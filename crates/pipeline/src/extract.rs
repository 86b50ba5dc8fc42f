//! Extract stage - derives relations and named entities for a document

use std::collections::BTreeMap;

use tracing::{info, instrument, warn};

use sniprag_core::{DocPayload, Stage};
use sniprag_db::{DocumentStore, WorkQueue};

use crate::{CompletionClient, Result};

/// The Extract stage: call the extraction capability on the stored
/// snippet and upsert the derived fields onto the document.
pub struct ExtractStage {
    docs: DocumentStore,
    queue: WorkQueue,
    completions: CompletionClient,
}

impl ExtractStage {
    pub fn new(docs: DocumentStore, queue: WorkQueue, completions: CompletionClient) -> Self {
        Self {
            docs,
            queue,
            completions,
        }
    }

    /// Process one document. A missing document or blank snippet is a
    /// logged no-op, not an error - it may be a dangling retry after a
    /// deletion. Transient extraction failures propagate so the queue
    /// can redeliver with backoff.
    #[instrument(skip(self))]
    pub async fn run(&self, doc_id: &str) -> Result<()> {
        let Some(document) = self.docs.get(doc_id).await? else {
            info!("Document {} not found, skipping extraction", doc_id);
            return Ok(());
        };
        if document.snippet.trim().is_empty() {
            info!("Document {} has no snippet, skipping extraction", doc_id);
            return Ok(());
        }

        let extraction = self.completions.extract(&document.snippet).await?;

        let mut relations: BTreeMap<String, f32> = BTreeMap::new();
        for tuple in &extraction.relations {
            match tuple.encode_key() {
                Some(key) => {
                    relations.insert(key, tuple.confidence);
                }
                None => {
                    warn!(
                        "Dropping relation that cannot round-trip through its key: \
                         {:?} -[{:?}]-> {:?}",
                        tuple.subject, tuple.relation, tuple.object
                    );
                }
            }
        }

        self.docs
            .set_extraction(doc_id, &relations, &extraction.entities)
            .await?;

        self.queue
            .enqueue(
                Stage::Load,
                DocPayload {
                    doc_id: doc_id.to_string(),
                },
            )
            .await?;

        info!(
            "Extracted document {}: {} relations, {} entity groups",
            doc_id,
            relations.len(),
            extraction.entities.len()
        );
        Ok(())
    }
}
