//! Core domain types for SnipRAG
//!
//! This crate defines the fundamental data structures used throughout
//! the pipeline: documents, relation tuples, named entities, and jobs.

pub mod document;
pub mod embedding;
pub mod entity;
pub mod error;
pub mod job;
pub mod relation;

pub use document::{document_id, Document, DocStatus, SubmittedItem};
pub use entity::NodeCategory;
pub use error::{CoreError, Result};
pub use job::{DocPayload, EmbedPayload, JobStatus, Stage, MAX_ATTEMPTS};
pub use relation::{RelationTuple, RELATION_DELIMITER};
