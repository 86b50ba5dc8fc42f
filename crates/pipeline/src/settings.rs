//! Runtime settings, read from the environment with compiled defaults

use std::path::PathBuf;

const DEFAULT_EMBEDDING_URL: &str = "http://localhost:8000";
const DEFAULT_RERANK_URL: &str = "http://localhost:8001";
const DEFAULT_COMPLETION_URL: &str = "http://localhost:8080";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SEARCH_K: usize = 5;
const DEFAULT_ANSWER_TOP_K: usize = 3;
const DEFAULT_FACT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_MAX_FACTS: usize = 20;

fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Runtime configuration for the pipelines
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the embedding service
    pub embedding_url: String,
    /// Base URL of the reranking service
    pub rerank_url: String,
    /// Base URL of the completion service
    pub completion_url: String,
    /// Per-request timeout for inference calls
    pub request_timeout_secs: u64,
    /// Vector-search width
    pub search_k: usize,
    /// Answer-set width after reranking
    pub answer_top_k: usize,
    /// Minimum confidence for a relation to become a fact
    pub fact_confidence_threshold: f32,
    /// Cap on the number of facts in a prompt
    pub max_facts: usize,
    /// Raw-batch audit log path; `None` disables the audit append
    pub audit_path: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Self {
        let audit_path = match std::env::var("AUDIT_LOG") {
            Ok(value) if value.trim().is_empty() || value.trim() == "off" => None,
            Ok(value) => Some(PathBuf::from(value)),
            Err(_) => Some(PathBuf::from("./data/audit.jsonl")),
        };

        Self {
            embedding_url: env_or_default("EMBEDDING_URL", DEFAULT_EMBEDDING_URL),
            rerank_url: env_or_default("RERANK_URL", DEFAULT_RERANK_URL),
            completion_url: env_or_default("COMPLETION_URL", DEFAULT_COMPLETION_URL),
            request_timeout_secs: env_parsed(
                "INFERENCE_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            ),
            search_k: env_parsed("SEARCH_K", DEFAULT_SEARCH_K),
            answer_top_k: env_parsed("ANSWER_TOP_K", DEFAULT_ANSWER_TOP_K),
            fact_confidence_threshold: env_parsed(
                "FACT_CONFIDENCE_THRESHOLD",
                DEFAULT_FACT_CONFIDENCE_THRESHOLD,
            ),
            max_facts: env_parsed("MAX_FACTS", DEFAULT_MAX_FACTS),
            audit_path,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            embedding_url: DEFAULT_EMBEDDING_URL.to_string(),
            rerank_url: DEFAULT_RERANK_URL.to_string(),
            completion_url: DEFAULT_COMPLETION_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            search_k: DEFAULT_SEARCH_K,
            answer_top_k: DEFAULT_ANSWER_TOP_K,
            fact_confidence_threshold: DEFAULT_FACT_CONFIDENCE_THRESHOLD,
            max_facts: DEFAULT_MAX_FACTS,
            audit_path: None,
        }
    }
}
