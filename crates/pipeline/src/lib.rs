//! Enrichment and answer pipelines for SnipRAG
//!
//! This crate contains the pipeline implementations:
//! - Embed / Extract / Load: the staged enrichment of submitted snippets
//! - Worker: claims queued jobs and drives the stages
//! - Answer: the synchronous retrieval and generation path

pub mod answer;
pub mod audit;
pub mod embed;
pub mod error;
pub mod extract;
pub mod inference;
pub mod load;
pub mod settings;
pub mod worker;

pub use answer::{AnswerBundle, AnswerPipeline, Fact, QueryOptions};
pub use audit::AuditLog;
pub use embed::EmbedStage;
pub use error::{PipelineError, Result};
pub use extract::ExtractStage;
pub use inference::{CompletionClient, EmbeddingClient, Extraction, RerankClient};
pub use load::LoadStage;
pub use settings::Settings;
pub use worker::{submit_batch, Worker};
