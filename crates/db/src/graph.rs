//! Graph store adapter
//!
//! Merge-create primitives over document nodes, entity nodes, and
//! typed edges, plus the batched context reads the answer pipeline
//! uses. Every statement binds its parameters; extractor output never
//! reaches query text.

use serde::{Deserialize, Serialize};
use surrealdb::types::RecordId;
use tracing::instrument;

use sniprag_core::NodeCategory;

use crate::{DbConnection, DbError, Result};

/// An entity node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityNode {
    #[serde(default)]
    pub id: Option<RecordId>,
    pub name: String,
    pub category: String,
}

/// A relation edge, read back with its endpoint names resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationEdge {
    pub subject: String,
    pub label: String,
    pub object: String,
    pub confidence: f32,
    pub sources: Vec<String>,
}

/// Graph context for one document, as fetched for answer enrichment
#[derive(Debug, Clone, Default)]
pub struct GraphDocContext {
    pub doc_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub date: Option<String>,
    pub entities: Vec<EntityNode>,
    pub relations: Vec<RelationEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphStats {
    #[serde(default)]
    pub doc_node_count: i64,
    #[serde(default)]
    pub entity_count: i64,
    #[serde(default)]
    pub mention_count: i64,
    #[serde(default)]
    pub relation_count: i64,
}

#[derive(Debug, Deserialize)]
struct DocNodeRow {
    #[allow(dead_code)]
    id: RecordId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MentionedEntities {
    #[serde(default)]
    entities: Vec<EntityNode>,
}

#[derive(Debug, Deserialize)]
struct EdgeRow {
    id: RecordId,
    confidence: f32,
    #[serde(default)]
    sources: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    #[allow(dead_code)]
    id: RecordId,
}

/// Repository for the graph store
#[derive(Clone)]
pub struct GraphStore {
    db: DbConnection,
}

impl GraphStore {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Merge-create the node for a document and refresh its metadata.
    /// Keyed by document id, so repeating is safe.
    #[instrument(skip(self, title, url, date))]
    pub async fn merge_doc_node(
        &self,
        doc_id: &str,
        title: Option<String>,
        url: Option<String>,
        date: Option<String>,
    ) -> Result<RecordId> {
        let node = RecordId::from(("doc_node", doc_id));
        self.db
            .query("UPSERT $node SET title = $title, url = $url, date = $date")
            .bind(("node", node.clone()))
            .bind(("title", title))
            .bind(("url", url))
            .bind(("date", date))
            .await?;
        Ok(node)
    }

    /// Merge-create an entity node keyed by (name, category).
    ///
    /// The unique index on the pair makes the same entity observed in
    /// different documents collapse to one node.
    #[instrument(skip(self))]
    pub async fn merge_entity(&self, name: &str, category: NodeCategory) -> Result<EntityNode> {
        let node: Option<EntityNode> = self
            .db
            .query(
                "INSERT INTO entity (name, category) VALUES ($name, $category) \
                 ON DUPLICATE KEY UPDATE name = $name",
            )
            .bind(("name", name.to_string()))
            .bind(("category", category.to_string()))
            .await?
            .take(0)?;

        node.ok_or_else(|| DbError::CreateFailed("entity".into()))
    }

    /// Merge-create a mentions edge from a document node to an entity
    /// node. Idempotent: an existing edge is left alone.
    #[instrument(skip(self))]
    pub async fn merge_mention(&self, doc: &RecordId, entity: &RecordId) -> Result<()> {
        let existing: Vec<IdRow> = self
            .db
            .query("SELECT id FROM mentions WHERE in = $doc AND out = $entity")
            .bind(("doc", doc.clone()))
            .bind(("entity", entity.clone()))
            .await?
            .take(0)?;

        if existing.is_empty() {
            self.db
                .query("RELATE $doc->mentions->$entity")
                .bind(("doc", doc.clone()))
                .bind(("entity", entity.clone()))
                .await?;
        }
        Ok(())
    }

    /// Merge a relation edge identified by (subject, label, object).
    ///
    /// First assertion stores the confidence and a single-element
    /// contributing-document list. A repeat from a new document
    /// reconciles confidence as a mean weighted by the number of
    /// contributors so far and appends the document id; a repeat from a
    /// known document is a no-op, so redelivery cannot drift the score.
    #[instrument(skip(self))]
    pub async fn merge_relation(
        &self,
        subject: &RecordId,
        object: &RecordId,
        label: &str,
        confidence: f32,
        doc_id: &str,
    ) -> Result<()> {
        let existing: Vec<EdgeRow> = self
            .db
            .query(
                "SELECT id, confidence, sources FROM relates \
                 WHERE in = $subject AND out = $object AND label = $label",
            )
            .bind(("subject", subject.clone()))
            .bind(("object", object.clone()))
            .bind(("label", label.to_string()))
            .await?
            .take(0)?;

        match existing.into_iter().next() {
            None => {
                self.db
                    .query(
                        "RELATE $subject->relates->$object \
                         SET label = $label, confidence = $confidence, sources = $sources",
                    )
                    .bind(("subject", subject.clone()))
                    .bind(("object", object.clone()))
                    .bind(("label", label.to_string()))
                    .bind(("confidence", confidence))
                    .bind(("sources", vec![doc_id.to_string()]))
                    .await?;
            }
            Some(edge) if edge.sources.iter().any(|s| s == doc_id) => {}
            Some(edge) => {
                let weight = edge.sources.len() as f32;
                let reconciled = (edge.confidence * weight + confidence) / (weight + 1.0);
                let mut sources = edge.sources;
                sources.push(doc_id.to_string());

                self.db
                    .query(
                        "UPDATE $edge SET confidence = $confidence, sources = $sources, \
                         updated_at = time::now()",
                    )
                    .bind(("edge", edge.id))
                    .bind(("confidence", reconciled))
                    .bind(("sources", sources))
                    .await?;
            }
        }
        Ok(())
    }

    /// Batched context read for a set of document ids: node metadata,
    /// mentioned entities, and the relations each document contributed
    /// to. Ids without a loaded node are silently absent.
    #[instrument(skip(self))]
    pub async fn fetch_context(&self, doc_ids: &[String]) -> Result<Vec<GraphDocContext>> {
        let mut contexts = Vec::with_capacity(doc_ids.len());

        for doc_id in doc_ids {
            let node: Option<DocNodeRow> = self.db.select(("doc_node", doc_id.as_str())).await?;
            let Some(node) = node else { continue };

            let mentioned: Vec<MentionedEntities> = self
                .db
                .query(
                    "SELECT (SELECT name, category FROM ->mentions->entity) AS entities \
                     FROM doc_node WHERE id = $node",
                )
                .bind(("node", RecordId::from(("doc_node", doc_id.as_str()))))
                .await?
                .take(0)?;

            let relations: Vec<RelationEdge> = self
                .db
                .query(
                    "SELECT in.name AS subject, label, out.name AS object, \
                     confidence, sources FROM relates WHERE sources CONTAINS $doc_id",
                )
                .bind(("doc_id", doc_id.clone()))
                .await?
                .take(0)?;

            contexts.push(GraphDocContext {
                doc_id: doc_id.clone(),
                title: node.title,
                url: node.url,
                date: node.date,
                entities: mentioned
                    .into_iter()
                    .next()
                    .map(|m| m.entities)
                    .unwrap_or_default(),
                relations,
            });
        }

        Ok(contexts)
    }

    /// Get graph statistics
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<GraphStats> {
        let stats: Vec<GraphStats> = self
            .db
            .query(
                r#"
                RETURN {
                    doc_node_count: (SELECT count() FROM doc_node GROUP ALL)[0].count ?? 0,
                    entity_count: (SELECT count() FROM entity GROUP ALL)[0].count ?? 0,
                    mention_count: (SELECT count() FROM mentions GROUP ALL)[0].count ?? 0,
                    relation_count: (SELECT count() FROM relates GROUP ALL)[0].count ?? 0
                }
                "#,
            )
            .await?
            .take(0)?;

        stats
            .into_iter()
            .next()
            .ok_or_else(|| DbError::QueryFailed("stats".into()))
    }
}
