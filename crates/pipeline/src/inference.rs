//! HTTP clients for the embedding, rerank, and completion capabilities

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use sniprag_core::RelationTuple;

use crate::{PipelineError, Result};

const DEFAULT_CONFIDENCE: f32 = 0.5;

#[derive(Clone)]
pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbedRequest {
    content: Vec<String>,
}

/// One response item per input text; the vector is the first element of
/// the nested list.
#[derive(Deserialize)]
struct EmbedItem {
    embedding: Vec<Vec<f32>>,
}

impl EmbeddingClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Embed a batch of texts with a single request. The response order
    /// matches the request order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embedding", self.base_url);
        let request = EmbedRequest {
            content: texts.to_vec(),
        };

        debug!("Requesting embeddings for {} texts", texts.len());

        let items: Vec<EmbedItem> = self
            .client
            .post(&url)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        items
            .into_iter()
            .map(|item| {
                item.embedding.into_iter().next().ok_or_else(|| {
                    PipelineError::Inference("embedding item carried no vector".into())
                })
            })
            .collect()
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Inference("no embedding returned".into()))
    }

    pub async fn health(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Clone)]
pub struct RerankClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
pub struct RerankResult {
    pub index: usize,
    pub relevance_score: f32,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

impl RerankClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Score each document against the query with the cross-encoder.
    pub async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankResult>> {
        let url = format!("{}/rerank", self.base_url);
        let request = RerankRequest { query, documents };

        let response: RerankResponse = self
            .client
            .post(&url)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.results)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
}

/// Relations with confidence plus entity-type -> texts, as produced by
/// the extraction call
#[derive(Debug, Default)]
pub struct Extraction {
    pub relations: Vec<RelationTuple>,
    pub entities: BTreeMap<String, Vec<String>>,
}

impl CompletionClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Send a prompt and return the generated text. Non-success status
    /// is an error; the completion body is otherwise opaque apart from
    /// the generated-text field.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/completion", self.base_url);
        let request = CompletionRequest { prompt };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::Inference(format!(
                "completion request failed: {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        extract_generated_text(body)
    }

    /// Extract relation tuples and named entities from a snippet.
    pub async fn extract(&self, text: &str) -> Result<Extraction> {
        let prompt = build_extraction_prompt(text);
        let generated = self.complete(&prompt).await?;
        let cleaned = normalize_json_payload(&generated);
        parse_extraction(&cleaned)
    }

    pub async fn health(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn build_extraction_prompt(text: &str) -> String {
    format!(
        "Return ONLY valid JSON. No markdown, no extra keys.\n\n\
         Schema:\n\
         {{\"relations\":[{{\"subject\":string,\"relation\":string,\"object\":string,\"confidence\":number}}],\
         \"entities\":{{\"PERSON\":[string],\"ORG\":[string],\"GPE\":[string],\"DATE\":[string]}}}}\n\n\
         Rules:\n\
         - Strings double-quoted, confidence between 0 and 1\n\
         - Entity keys are tags such as PERSON, ORG, GPE, DATE, EVENT, PRODUCT\n\
         - Keep strings short (1-6 words)\n\
         - If unsure, return empty collections\n\n\
         Text:\n{}",
        text
    )
}

/// Pull the generated text out of a completion response body.
fn extract_generated_text(value: Value) -> Result<String> {
    match value {
        Value::Object(mut obj) => {
            if let Some(Value::String(text)) = obj.remove("content") {
                Ok(text)
            } else if let Some(Value::String(text)) = obj.remove("response") {
                Ok(text)
            } else {
                Err(PipelineError::Inference(
                    "completion response missing generated text field".to_string(),
                ))
            }
        }
        other => Err(PipelineError::Inference(format!(
            "unexpected completion response format: {}",
            other
        ))),
    }
}

/// Strip markdown fences and surrounding prose from a JSON payload.
fn normalize_json_payload(payload: &str) -> String {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return trimmed.to_string();
    }

    let without_fence = if trimmed.starts_with("```") {
        let mut lines = trimmed.lines();
        let _ = lines.next(); // drop ``` or ```json
        let mut content = lines.collect::<Vec<_>>().join("\n");
        if content.ends_with("```") {
            content.truncate(content.len().saturating_sub(3));
        }
        content.trim().to_string()
    } else {
        trimmed.to_string()
    };

    if let (Some(start), Some(end)) = (without_fence.find('{'), without_fence.rfind('}')) {
        if start < end {
            return without_fence[start..=end].to_string();
        }
    }

    without_fence
}

/// Parse an extraction payload, tolerating malformed items: an item
/// with missing or wrongly-typed fields is skipped and logged, the rest
/// of the payload proceeds.
fn parse_extraction(payload: &str) -> Result<Extraction> {
    let value: Value = serde_json::from_str(payload).map_err(|e| {
        PipelineError::Inference(format!("extraction returned invalid JSON: {}", e))
    })?;

    let relations = value
        .get("relations")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let subject = string_field(item, &["subject", "source"])?;
                    let relation = string_field(item, &["relation", "relation_type", "type"])?;
                    let object = string_field(item, &["object", "target"])?;
                    let confidence = item
                        .get("confidence")
                        .and_then(Value::as_f64)
                        .map(|c| c as f32)
                        .unwrap_or(DEFAULT_CONFIDENCE);
                    Some(RelationTuple::new(subject, relation, object, confidence))
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut entities: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(map) = value.get("entities").and_then(|v| v.as_object()) {
        for (tag, texts) in map {
            let Some(texts) = texts.as_array() else {
                debug!("Skipping malformed entity group: {}", tag);
                continue;
            };
            let mut names: Vec<String> = texts
                .iter()
                .filter_map(|t| t.as_str())
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if names.is_empty() {
                continue;
            }
            names.sort();
            names.dedup();
            entities.insert(tag.trim().to_ascii_uppercase(), names);
        }
    }

    Ok(Extraction {
        relations,
        entities,
    })
}

fn string_field(item: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(text) = item.get(*key).and_then(Value::as_str) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    debug!("Skipping extraction item with missing field");
    None
}
