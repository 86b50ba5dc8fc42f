//! Document types - one ingested snippet plus everything derived from it

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use surrealdb::types::{RecordId, RecordIdKey, ToSql};

use crate::job::Stage;

/// One record of a submitted batch, as delivered by the capture front door.
///
/// Every field is optional on the wire; only records with a non-blank
/// `snippet` are eligible for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedItem {
    #[serde(default)]
    pub date: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub snippet: Option<String>,

    /// Client-side capture id. Not used as storage identity.
    #[serde(default)]
    pub id: Option<String>,
}

impl SubmittedItem {
    /// A record is eligible when its snippet is present and non-blank.
    pub fn eligible_snippet(&self) -> Option<&str> {
        self.snippet
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Deterministic document id: a 16-hex-char prefix of SHA-256 over the
/// snippet text and the batch timestamp. Redelivery of the same batch
/// derives the same id, so retries cannot create duplicate documents.
pub fn document_id(snippet: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(snippet.as_bytes());
    hasher.update(timestamp.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Pipeline progress of a document.
///
/// Forward-only: `Embedded -> Extracted -> Loaded`, with `Failed(stage)`
/// reachable from any stage after retry exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocStatus {
    Embedded,
    Extracted,
    Loaded,
    Failed(Stage),
}

impl DocStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "embedded" => Some(Self::Embedded),
            "extracted" => Some(Self::Extracted),
            "loaded" => Some(Self::Loaded),
            other => other
                .strip_prefix("failed:")
                .and_then(Stage::parse)
                .map(Self::Failed),
        }
    }
}

impl std::fmt::Display for DocStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocStatus::Embedded => write!(f, "embedded"),
            DocStatus::Extracted => write!(f, "extracted"),
            DocStatus::Loaded => write!(f, "loaded"),
            DocStatus::Failed(stage) => write!(f, "failed:{}", stage),
        }
    }
}

/// A stored document record.
///
/// The embedding lives in its own field, hex-armored f32 little-endian
/// bytes, separate from the textual attributes. `relations` maps the
/// delimited relation key to its confidence; `named_entities` maps an
/// entity tag to the texts observed under it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Option<RecordId>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub date: Option<String>,

    pub snippet: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relations: Option<BTreeMap<String, f32>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named_entities: Option<BTreeMap<String, Vec<String>>>,

    #[serde(default)]
    pub status: Option<String>,
}

impl Document {
    /// The bare record key, without the table prefix.
    pub fn key(&self) -> Option<String> {
        self.id.as_ref().map(|id| match &id.key {
            RecordIdKey::String(s) => s.clone(),
            other => other.to_sql(),
        })
    }

    pub fn doc_status(&self) -> Option<DocStatus> {
        self.status.as_deref().and_then(DocStatus::parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(snippet: Option<&str>) -> SubmittedItem {
        SubmittedItem {
            date: None,
            title: None,
            url: None,
            snippet: snippet.map(String::from),
            id: None,
        }
    }

    #[test]
    fn test_eligibility_filter() {
        assert_eq!(item(Some("some text")).eligible_snippet(), Some("some text"));
        assert_eq!(item(Some("  padded  ")).eligible_snippet(), Some("padded"));
        assert_eq!(item(Some("   ")).eligible_snippet(), None);
        assert_eq!(item(Some("")).eligible_snippet(), None);
        assert_eq!(item(None).eligible_snippet(), None);
    }

    #[test]
    fn test_document_id_deterministic() {
        let a = document_id("same snippet", "20250323231428");
        let b = document_id("same snippet", "20250323231428");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        // A different timestamp or snippet yields a different id.
        assert_ne!(a, document_id("same snippet", "20250323231429"));
        assert_ne!(a, document_id("other snippet", "20250323231428"));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            DocStatus::Embedded,
            DocStatus::Extracted,
            DocStatus::Loaded,
            DocStatus::Failed(Stage::Extract),
        ] {
            assert_eq!(DocStatus::parse(&status.to_string()), Some(status));
        }
        assert_eq!(DocStatus::parse("bogus"), None);
    }
}
