//! Best-effort audit log of raw submitted batches
//!
//! One JSON line per batch. Failures are logged and swallowed; the
//! audit append must never affect pipeline correctness.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use sniprag_core::SubmittedItem;

#[derive(Clone)]
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Append the raw batch as one JSON line. Best effort only.
    pub fn append(&self, timestamp: &str, items: &[SubmittedItem]) {
        let Some(path) = self.path.as_ref() else {
            return;
        };

        let line = json!({
            "timestamp": timestamp,
            "received_at": Utc::now().to_rfc3339(),
            "data": items,
        });

        if let Err(e) = Self::write_line(path, &line.to_string()) {
            warn!("Audit append failed (ignored): {}", e);
        } else {
            debug!("Audited batch {} ({} items)", timestamp, items.len());
        }
    }

    fn write_line(path: &PathBuf, line: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(snippet: &str) -> SubmittedItem {
        SubmittedItem {
            date: None,
            title: None,
            url: None,
            snippet: Some(snippet.to_string()),
            id: None,
        }
    }

    #[test]
    fn test_append_writes_one_line_per_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let audit = AuditLog::new(Some(path.clone()));

        audit.append("20250323231428", &[item("first")]);
        audit.append("20250323231429", &[item("second"), item("third")]);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["timestamp"], "20250323231428");
        assert_eq!(first["data"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_disabled_log_is_silent() {
        // Nothing to assert beyond "does not panic, writes nothing".
        AuditLog::disabled().append("20250323231428", &[item("x")]);
    }
}
