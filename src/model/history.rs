//! Immutable audit records shared by team documents.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One append-only audit record.
///
/// Identity is `(action, actor, timestamp)`; two entries with the same
/// identity are the same event, which is what makes history merges
/// idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub action: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(action: &str, actor: &str, timestamp: DateTime<Utc>, payload: serde_json::Value) -> Self {
        Self {
            action: action.to_string(),
            actor: actor.to_string(),
            timestamp,
            payload,
        }
    }

    /// Unique key used for de-duplication.
    #[must_use]
    pub fn key(&self) -> (String, String, DateTime<Utc>) {
        (self.action.clone(), self.actor.clone(), self.timestamp)
    }
}

/// Append `entry` to `history`, nudging its timestamp forward if needed.
///
/// Within one document timestamps are kept strictly increasing so that two
/// quick actions by the same actor never collapse into one key.
pub fn append_history(history: &mut Vec<HistoryEntry>, mut entry: HistoryEntry) {
    if let Some(last) = history.iter().map(|e| e.timestamp).max() {
        if entry.timestamp <= last {
            entry.timestamp = last + Duration::microseconds(1);
        }
    }
    history.push(entry);
}
