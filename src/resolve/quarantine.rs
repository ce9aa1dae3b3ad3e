//! Quarantine for conflicts that need a human.
//!
//! Both versions of the contested document are preserved verbatim under
//! `quarantine/<id>.json`. The directory is machine-local: it is ignored by
//! git and the sync engine refuses to run while it has entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::namespace::layout;
use crate::store::{DocumentStore, content_hash};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineEntry {
    /// Path of the contested document relative to the namespace root.
    pub document: String,
    /// Key the resolver could not decide.
    pub key: String,
    pub detected_at: DateTime<Utc>,
    pub local: Option<Value>,
    pub remote: Option<Value>,
}

impl QuarantineEntry {
    #[must_use]
    pub fn new(
        document: &str,
        key: &str,
        local: Option<&[u8]>,
        remote: Option<&[u8]>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            document: document.to_string(),
            key: key.to_string(),
            detected_at,
            local: local.map(preserve),
            remote: remote.map(preserve),
        }
    }

    /// Stable id: the same conflict quarantined twice lands in one file.
    #[must_use]
    pub fn id(&self) -> String {
        let material = format!(
            "{}\n{}\n{}\n{}",
            self.document,
            self.key,
            self.local.as_ref().map(Value::to_string).unwrap_or_default(),
            self.remote.as_ref().map(Value::to_string).unwrap_or_default(),
        );
        format!("q_{}", &content_hash(material.as_bytes())[..12])
    }
}

/// Keep parsable versions as JSON and anything else as text, so nothing is lost.
fn preserve(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Record an entry. Returns its id.
///
/// # Errors
///
/// Returns `Io` if the entry cannot be written.
pub fn quarantine(store: &DocumentStore, entry: &QuarantineEntry) -> Result<String> {
    let id = entry.id();
    warn!(document = %entry.document, key = %entry.key, id = %id, "conflict quarantined");
    store.write(&layout::quarantine_entry(&id), entry)?;
    Ok(id)
}

/// All pending entries, oldest id first.
///
/// # Errors
///
/// Returns `CorruptDocument` if an entry cannot be parsed.
pub fn list(store: &DocumentStore) -> Result<Vec<(String, QuarantineEntry)>> {
    store
        .list(layout::QUARANTINE_DIR)?
        .into_iter()
        .map(|id| {
            let entry = store.read(&layout::quarantine_entry(&id))?;
            Ok((id, entry))
        })
        .collect()
}

/// Number of pending entries.
///
/// # Errors
///
/// Returns `Io` if the directory cannot be listed.
pub fn pending(store: &DocumentStore) -> Result<usize> {
    Ok(store.list(layout::QUARANTINE_DIR)?.len())
}

/// Remove one entry, or all of them when `id` is `None`. Returns how many were removed.
///
/// # Errors
///
/// Returns `Io` if a file cannot be removed.
pub fn clear(store: &DocumentStore, id: Option<&str>) -> Result<usize> {
    let ids = match id {
        Some(id) => vec![id.to_string()],
        None => store.list(layout::QUARANTINE_DIR)?,
    };
    let mut removed = 0;
    for id in ids {
        if store.remove(&layout::quarantine_entry(&id))? {
            removed += 1;
        }
    }
    Ok(removed)
}
