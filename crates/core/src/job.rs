//! Job types - units of pipeline work
//!
//! Jobs for one document form the causal chain Embed -> Extract -> Load;
//! no job revisits an earlier stage.

use serde::{Deserialize, Serialize};

use crate::document::SubmittedItem;

/// Maximum delivery attempts before a job is dead-lettered.
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff delays between retries, indexed by failed-attempt count.
const BACKOFF_SECS: [u64; 3] = [10, 30, 60];

/// Pipeline stages, in causal order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Embed,
    Extract,
    Load,
}

impl Stage {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "embed" => Some(Self::Embed),
            "extract" => Some(Self::Extract),
            "load" => Some(Self::Load),
            _ => None,
        }
    }

    /// Delay in seconds before redelivering after `attempts` failures.
    pub fn backoff_secs(attempts: u32) -> u64 {
        let idx = (attempts.max(1) as usize - 1).min(BACKOFF_SECS.len() - 1);
        BACKOFF_SECS[idx]
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Embed => write!(f, "embed"),
            Stage::Extract => write!(f, "extract"),
            Stage::Load => write!(f, "load"),
        }
    }
}

/// Job lifecycle states. `Failed` is the dead-letter terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Payload of an Embed job: the raw submitted batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedPayload {
    pub items: Vec<SubmittedItem>,
    pub timestamp: String,
}

/// Payload of Extract and Load jobs: a document id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocPayload {
    pub doc_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(Stage::backoff_secs(1), 10);
        assert_eq!(Stage::backoff_secs(2), 30);
        assert_eq!(Stage::backoff_secs(3), 60);
        // Clamped past the schedule and below it.
        assert_eq!(Stage::backoff_secs(7), 60);
        assert_eq!(Stage::backoff_secs(0), 10);
    }

    #[test]
    fn test_stage_round_trip() {
        for stage in [Stage::Embed, Stage::Extract, Stage::Load] {
            assert_eq!(Stage::parse(&stage.to_string()), Some(stage));
        }
        assert_eq!(Stage::parse("reduce"), None);
    }
}
