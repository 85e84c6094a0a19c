//! Ledger entry model and record hashing.
//!
//! `record_hash = blake3(canonical(fields) || previous_hash)` where the
//! canonical form is JSON with lexicographically sorted keys and no
//! whitespace. `status`, `previous_hash` and `record_hash` itself are not part
//! of the canonical fields: status is the one mutable column, and the previous
//! hash is chained in by concatenation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use covenant_types::{Actor, ParseEnumError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// Lifecycle status of an entry. The only field that may change after write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    #[default]
    Draft,
    Verified,
    Final,
    Error,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Verified => "VERIFIED",
            Self::Final => "FINAL",
            Self::Error => "ERROR",
        }
    }

    /// DRAFT -> {VERIFIED, FINAL, ERROR}, VERIFIED -> {FINAL, ERROR}.
    /// FINAL and ERROR are terminal.
    pub fn can_transition_to(&self, next: EntryStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Verified)
                | (Self::Draft, Self::Final)
                | (Self::Draft, Self::Error)
                | (Self::Verified, Self::Final)
                | (Self::Verified, Self::Error)
        )
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(Self::Draft),
            "VERIFIED" => Ok(Self::Verified),
            "FINAL" => Ok(Self::Final),
            "ERROR" => Ok(Self::Error),
            _ => Err(ParseEnumError {
                kind: "entry status",
                value: s.to_string(),
            }),
        }
    }
}

/// One immutable recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    /// 1-based position in the chain.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub event_type: String,
    pub body: String,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Empty for the genesis entry.
    pub previous_hash: String,
    pub record_hash: String,
}

impl LedgerEntry {
    /// Recompute the record hash from the stored fields.
    pub fn compute_hash(&self) -> String {
        compute_record_hash(
            &hash_material(
                &self.id,
                self.sequence,
                &self.timestamp,
                self.actor,
                &self.event_type,
                &self.body,
                self.citation.as_deref(),
                self.citation_url.as_deref(),
                &self.tags,
            ),
            &self.previous_hash,
        )
    }

    pub fn is_genesis(&self) -> bool {
        self.sequence == 1
    }
}

/// Caller-supplied fields of a new entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    pub actor: Actor,
    pub event_type: String,
    pub body: String,
    #[serde(default)]
    pub status: EntryStatus,
    #[serde(default)]
    pub citation: Option<String>,
    #[serde(default)]
    pub citation_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewEntry {
    pub fn new(actor: Actor, event_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            actor,
            event_type: event_type.into(),
            body: body.into(),
            status: EntryStatus::Draft,
            citation: None,
            citation_url: None,
            tags: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: EntryStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_citation(mut self, citation: impl Into<String>, url: Option<String>) -> Self {
        self.citation = Some(citation.into());
        self.citation_url = url;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.event_type.trim().is_empty() {
            return Err(LedgerError::Validation("event_type is required".to_string()));
        }
        if self.body.trim().is_empty() {
            return Err(LedgerError::Validation("text is required".to_string()));
        }
        if matches!(self.status, EntryStatus::Error) {
            return Err(LedgerError::Validation(
                "entries cannot be written in ERROR status".to_string(),
            ));
        }
        Ok(())
    }

    /// Seal the entry onto a chain head. Does not persist anything.
    pub(crate) fn seal(self, sequence: u64, previous_hash: String) -> LedgerEntry {
        let id = Uuid::new_v4().to_string();
        // Stored as microsecond RFC 3339 text, so hash what survives a round trip.
        let timestamp = Utc::now().trunc_subsecs(6);
        let record_hash = compute_record_hash(
            &hash_material(
                &id,
                sequence,
                &timestamp,
                self.actor,
                &self.event_type,
                &self.body,
                self.citation.as_deref(),
                self.citation_url.as_deref(),
                &self.tags,
            ),
            &previous_hash,
        );

        LedgerEntry {
            id,
            sequence,
            timestamp,
            actor: self.actor,
            event_type: self.event_type,
            body: self.body,
            status: self.status,
            citation: self.citation,
            citation_url: self.citation_url,
            tags: self.tags,
            previous_hash,
            record_hash,
        }
    }
}

/// Timestamp text used in hashing and storage.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[allow(clippy::too_many_arguments)]
fn hash_material(
    id: &str,
    sequence: u64,
    timestamp: &DateTime<Utc>,
    actor: Actor,
    event_type: &str,
    body: &str,
    citation: Option<&str>,
    citation_url: Option<&str>,
    tags: &[String],
) -> Value {
    serde_json::json!({
        "id": id,
        "sequence": sequence,
        "timestamp": format_timestamp(timestamp),
        "actor": actor.as_str(),
        "event_type": event_type,
        "body": body,
        "citation": citation,
        "citation_url": citation_url,
        "tags": tags,
    })
}

fn compute_record_hash(material: &Value, previous_hash: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(canonical_json(material).as_bytes());
    hasher.update(previous_hash.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Serialize with sorted object keys, independent of map ordering features.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(key.as_str()) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_ignores_key_order() {
        let a = serde_json::json!({"b": 1, "a": {"y": [1, 2], "x": "s"}});
        let b = serde_json::json!({"a": {"x": "s", "y": [1, 2]}, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":{"x":"s","y":[1,2]},"b":1}"#);
    }

    #[test]
    fn status_is_not_hashed() {
        let mut entry = NewEntry::new(Actor::Human, "FILING", "draft return").seal(1, String::new());
        let before = entry.compute_hash();
        assert_eq!(before, entry.record_hash);

        entry.status = EntryStatus::Final;
        assert_eq!(entry.compute_hash(), before);

        entry.body.push('!');
        assert_ne!(entry.compute_hash(), before);
    }

    #[test]
    fn previous_hash_is_chained_in() {
        let a = NewEntry::new(Actor::Ai, "NOTE", "x").seal(2, "aa".to_string());
        let mut b = a.clone();
        b.previous_hash = "bb".to_string();
        assert_ne!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn status_transitions() {
        assert!(EntryStatus::Draft.can_transition_to(EntryStatus::Verified));
        assert!(EntryStatus::Verified.can_transition_to(EntryStatus::Final));
        assert!(!EntryStatus::Final.can_transition_to(EntryStatus::Draft));
        assert!(!EntryStatus::Error.can_transition_to(EntryStatus::Final));
        assert!(!EntryStatus::Draft.can_transition_to(EntryStatus::Draft));
    }

    #[test]
    fn new_entry_requires_text_and_type() {
        assert!(NewEntry::new(Actor::Human, " ", "body").validate().is_err());
        assert!(NewEntry::new(Actor::Human, "NOTE", "").validate().is_err());
        assert!(NewEntry::new(Actor::Human, "NOTE", "body").validate().is_ok());
    }
}
