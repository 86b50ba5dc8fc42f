//! Document store adapter
//!
//! Field-level upserts of snippet records, the binary embedding field,
//! and k-NN search over the decoded vectors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use surrealdb::types::RecordId;
use tracing::{instrument, warn};

use sniprag_core::{embedding, DocStatus, Document, SubmittedItem};

use crate::{DbConnection, Result};

/// A nearest-neighbour hit from the vector search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    /// Bare document id, without the `document:` prefix
    pub id: String,
    /// Cosine similarity against the query; larger is nearer
    pub similarity: f32,
    pub title: Option<String>,
    pub url: Option<String>,
    pub date: Option<String>,
    pub snippet: String,
    #[serde(default)]
    pub relations: Option<BTreeMap<String, f32>>,
    #[serde(default)]
    pub named_entities: Option<BTreeMap<String, Vec<String>>>,
}

/// Repository for the document store
#[derive(Clone)]
pub struct DocumentStore {
    db: DbConnection,
}

impl DocumentStore {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    fn record(&self, doc_id: &str) -> RecordId {
        RecordId::from(("document", doc_id))
    }

    /// Create or refresh the textual fields of a document record.
    #[instrument(skip(self, item, snippet))]
    pub async fn upsert_metadata(
        &self,
        doc_id: &str,
        item: &SubmittedItem,
        snippet: &str,
    ) -> Result<()> {
        self.db
            .query(
                "UPSERT $doc SET title = $title, url = $url, date = $date, \
                 snippet = $snippet, status = $status, updated_at = time::now()",
            )
            .bind(("doc", self.record(doc_id)))
            .bind(("title", item.title.clone()))
            .bind(("url", item.url.clone()))
            .bind(("date", item.date.clone()))
            .bind(("snippet", snippet.to_string()))
            .bind(("status", DocStatus::Embedded.to_string()))
            .await?;
        Ok(())
    }

    /// Write the embedding bytes (f32 little-endian, hex-armored) into
    /// their own field, leaving the textual fields untouched.
    #[instrument(skip(self, vector))]
    pub async fn put_embedding(&self, doc_id: &str, vector: &[f32]) -> Result<()> {
        let armored = hex::encode(embedding::encode(vector));
        self.db
            .query("UPSERT $doc SET embedding = $embedding, updated_at = time::now()")
            .bind(("doc", self.record(doc_id)))
            .bind(("embedding", armored))
            .await?;
        Ok(())
    }

    /// Attach extraction output. Additive: embedding and metadata fields
    /// are not touched.
    #[instrument(skip(self, relations, named_entities))]
    pub async fn set_extraction(
        &self,
        doc_id: &str,
        relations: &BTreeMap<String, f32>,
        named_entities: &BTreeMap<String, Vec<String>>,
    ) -> Result<()> {
        self.db
            .query(
                "UPDATE $doc SET relations = $relations, \
                 named_entities = $named_entities, status = $status, \
                 updated_at = time::now()",
            )
            .bind(("doc", self.record(doc_id)))
            .bind(("relations", relations.clone()))
            .bind(("named_entities", named_entities.clone()))
            .bind(("status", DocStatus::Extracted.to_string()))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_status(&self, doc_id: &str, status: DocStatus) -> Result<()> {
        self.db
            .query("UPDATE $doc SET status = $status, updated_at = time::now()")
            .bind(("doc", self.record(doc_id)))
            .bind(("status", status.to_string()))
            .await?;
        Ok(())
    }

    /// Fetch a document by its bare id
    #[instrument(skip(self))]
    pub async fn get(&self, doc_id: &str) -> Result<Option<Document>> {
        let document: Option<Document> = self.db.select(("document", doc_id)).await?;
        Ok(document)
    }

    /// k-NN search by cosine similarity, nearest first.
    ///
    /// Returns at most `k` hits; an empty store yields an empty result,
    /// never an error. Records with an undecodable embedding are skipped
    /// and logged, not fatal.
    #[instrument(skip(self, query))]
    pub async fn knn_search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let documents: Vec<Document> = self.db.select("document").await?;

        let mut hits = Vec::new();
        for doc in documents {
            let Some(armored) = doc.embedding.as_deref() else {
                continue;
            };
            let bytes = match hex::decode(armored) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping document with corrupt embedding hex: {}", e);
                    continue;
                }
            };
            let vector = match embedding::decode(&bytes) {
                Ok(vector) => vector,
                Err(e) => {
                    warn!("Skipping document with corrupt embedding: {}", e);
                    continue;
                }
            };

            let Some(id) = doc.key() else { continue };
            hits.push(VectorHit {
                id,
                similarity: embedding::cosine_similarity(query, &vector),
                title: doc.title,
                url: doc.url,
                date: doc.date,
                snippet: doc.snippet,
                relations: doc.relations,
                named_entities: doc.named_entities,
            });
        }

        // Cosine similarity: larger is nearer, so descending order.
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(k);
        Ok(hits)
    }

    pub async fn count(&self) -> Result<i64> {
        #[derive(Deserialize, Default)]
        struct DocCount {
            #[serde(default)]
            document_count: i64,
        }

        let counts: Vec<DocCount> = self
            .db
            .query(
                "RETURN { document_count: \
                 (SELECT count() FROM document GROUP ALL)[0].count ?? 0 }",
            )
            .await?
            .take(0)?;
        Ok(counts.into_iter().next().unwrap_or_default().document_count)
    }
}
