//! Relation tuples - extracted (subject, relation, object) facts

use serde::{Deserialize, Serialize};

/// Separator used in the persisted relation key.
///
/// Tuples containing this character in any part are rejected at encode
/// time, so a stored key always splits back into exactly three parts.
pub const RELATION_DELIMITER: char = '|';

/// An extracted fact with a confidence score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationTuple {
    pub subject: String,
    pub relation: String,
    pub object: String,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
}

impl RelationTuple {
    pub fn new(
        subject: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            subject: subject.into(),
            relation: relation.into(),
            object: object.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Encode the identity key as `subject|relation|object`.
    ///
    /// Returns `None` when a part is blank or contains the delimiter;
    /// such tuples cannot round-trip and must be skipped by the caller.
    pub fn encode_key(&self) -> Option<String> {
        let parts = [&self.subject, &self.relation, &self.object];
        for part in parts {
            let trimmed = part.trim();
            if trimmed.is_empty() || trimmed.contains(RELATION_DELIMITER) {
                return None;
            }
        }
        Some(format!(
            "{}{d}{}{d}{}",
            self.subject.trim(),
            self.relation.trim(),
            self.object.trim(),
            d = RELATION_DELIMITER
        ))
    }
}

/// Split a stored relation key back into (subject, relation, object).
///
/// Returns `None` unless the key yields exactly three non-empty parts.
pub fn split_key(key: &str) -> Option<(&str, &str, &str)> {
    let mut parts = key.split(RELATION_DELIMITER);
    let subject = parts.next()?.trim();
    let relation = parts.next()?.trim();
    let object = parts.next()?.trim();
    if parts.next().is_some()
        || subject.is_empty()
        || relation.is_empty()
        || object.is_empty()
    {
        return None;
    }
    Some((subject, relation, object))
}

/// Normalize a raw relation type for display as a graph edge label:
/// strip any namespace-style prefix, turn separators into spaces, and
/// title-case the words. `org:founded_by` becomes `Founded By`.
pub fn normalize_label(raw: &str) -> String {
    let stripped = match raw.rfind([':', '/']) {
        Some(pos) => &raw[pos + 1..],
        None => raw,
    };

    stripped
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        let tuple = RelationTuple::new("Larry Page", "founded", "Google", 0.9);
        let key = tuple.encode_key().unwrap();
        assert_eq!(key, "Larry Page|founded|Google");
        assert_eq!(split_key(&key), Some(("Larry Page", "founded", "Google")));
    }

    #[test]
    fn test_delimiter_in_part_rejected() {
        let tuple = RelationTuple::new("A|B", "rel", "C", 0.5);
        assert!(tuple.encode_key().is_none());

        let blank = RelationTuple::new(" ", "rel", "C", 0.5);
        assert!(blank.encode_key().is_none());
    }

    #[test]
    fn test_split_requires_three_parts() {
        assert!(split_key("only|two").is_none());
        assert!(split_key("a|b|c|d").is_none());
        assert!(split_key("a||c").is_none());
        assert!(split_key("").is_none());
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(RelationTuple::new("a", "b", "c", 1.7).confidence, 1.0);
        assert_eq!(RelationTuple::new("a", "b", "c", -0.2).confidence, 0.0);
    }

    #[test]
    fn test_label_normalization() {
        assert_eq!(normalize_label("org:founded_by"), "Founded By");
        assert_eq!(normalize_label("WORKS-AT"), "Works At");
        assert_eq!(normalize_label("rel/co_founded"), "Co Founded");
        assert_eq!(normalize_label("manages"), "Manages");
        assert_eq!(normalize_label("  spaced  out "), "Spaced Out");
    }
}
