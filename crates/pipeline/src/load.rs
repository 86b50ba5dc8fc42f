//! Load stage - upserts a document's extraction into the graph store

use std::collections::HashMap;

use surrealdb::types::RecordId;
use tracing::{info, instrument, warn};

use sniprag_core::{relation, DocStatus, NodeCategory};
use sniprag_db::{DocumentStore, GraphStore};

use crate::{PipelineError, Result};

/// The Load stage: merge the document node, its entities and mentions,
/// and its relation edges. Every operation is idempotent, so queue
/// redelivery after a partial run is safe.
pub struct LoadStage {
    docs: DocumentStore,
    graph: GraphStore,
}

impl LoadStage {
    pub fn new(docs: DocumentStore, graph: GraphStore) -> Self {
        Self { docs, graph }
    }

    /// Process one document. Missing extraction fields make this a
    /// logged no-op; graph store errors propagate so the queue can
    /// redeliver, and exhaustion dead-letters the job.
    #[instrument(skip(self))]
    pub async fn run(&self, doc_id: &str) -> Result<()> {
        let Some(document) = self.docs.get(doc_id).await? else {
            info!("Document {} not found, skipping load", doc_id);
            return Ok(());
        };
        let (Some(relations), Some(named_entities)) =
            (document.relations.as_ref(), document.named_entities.as_ref())
        else {
            info!(
                "Document {} is missing extraction fields, skipping load",
                doc_id
            );
            return Ok(());
        };

        let doc_node = self
            .graph
            .merge_doc_node(
                doc_id,
                document.title.clone(),
                document.url.clone(),
                document.date.clone(),
            )
            .await?;

        // Entity nodes collapse globally on (name, category); remember
        // this document's nodes so relation endpoints resolve locally.
        let mut nodes_by_name: HashMap<String, RecordId> = HashMap::new();
        for (tag, texts) in named_entities {
            let category = NodeCategory::from_tag(tag);
            for text in texts {
                let entity = self.graph.merge_entity(text, category).await?;
                let Some(entity_id) = entity.id else {
                    return Err(PipelineError::Processing(format!(
                        "entity node for {:?} came back without an id",
                        text
                    )));
                };
                self.graph.merge_mention(&doc_node, &entity_id).await?;
                nodes_by_name.entry(text.clone()).or_insert(entity_id);
            }
        }

        let mut loaded = 0usize;
        for (key, confidence) in relations {
            let Some((subject, rel_type, object)) = relation::split_key(key) else {
                warn!("Dropping malformed relation key: {:?}", key);
                continue;
            };
            let label = relation::normalize_label(rel_type);

            let subject_node = self.resolve_endpoint(&mut nodes_by_name, subject).await?;
            let object_node = self.resolve_endpoint(&mut nodes_by_name, object).await?;

            self.graph
                .merge_relation(&subject_node, &object_node, &label, *confidence, doc_id)
                .await?;
            loaded += 1;
        }

        self.docs.set_status(doc_id, DocStatus::Loaded).await?;

        info!(
            "Loaded document {}: {} entities, {} relations",
            doc_id,
            nodes_by_name.len(),
            loaded
        );
        Ok(())
    }

    /// A relation endpoint the extractor did not also report as a named
    /// entity still needs a node; it gets the generic category.
    async fn resolve_endpoint(
        &self,
        nodes_by_name: &mut HashMap<String, RecordId>,
        name: &str,
    ) -> Result<RecordId> {
        if let Some(id) = nodes_by_name.get(name) {
            return Ok(id.clone());
        }
        let entity = self.graph.merge_entity(name, NodeCategory::Entity).await?;
        let id = entity.id.ok_or_else(|| {
            PipelineError::Processing(format!("entity node for {:?} came back without an id", name))
        })?;
        nodes_by_name.insert(name.to_string(), id.clone());
        Ok(id)
    }
}
