//! Time tracking documents.
//!
//! Each developer keeps one timesheet per calendar month. A timesheet is an
//! append-only list of entries keyed by session id; the period's accumulated
//! duration is derived from the entries, so merging two timesheets never
//! double-counts or loses time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::SessionRecord;

/// Time spent in one sealed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub session_id: String,
    pub task_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub seconds: i64,
}

impl TimeEntry {
    /// Build an entry from a sealed session. Returns `None` for open sessions.
    #[must_use]
    pub fn from_session(session: &SessionRecord) -> Option<Self> {
        let ended_at = session.end_time?;
        Some(Self {
            session_id: session.session_id.clone(),
            task_id: session.task_id.clone(),
            started_at: session.start_time,
            ended_at,
            seconds: session.duration().num_seconds(),
        })
    }
}

/// A month of time entries at `developers/<id>/time-tracking/<period>.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSheet {
    pub period: String,
    #[serde(default)]
    pub entries: Vec<TimeEntry>,
}

impl TimeSheet {
    #[must_use]
    pub fn new(period: &str) -> Self {
        Self {
            period: period.to_string(),
            entries: Vec::new(),
        }
    }

    /// Append `entry` unless an entry for the same session is already present.
    ///
    /// Returns `true` if the sheet changed.
    pub fn record(&mut self, entry: TimeEntry) -> bool {
        if self.entries.iter().any(|e| e.session_id == entry.session_id) {
            return false;
        }
        self.entries.push(entry);
        self.entries.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        true
    }

    /// Accumulated duration for the period.
    #[must_use]
    pub fn total_seconds(&self) -> i64 {
        self.entries.iter().map(|e| e.seconds).sum()
    }

    /// Accumulated duration for one task within the period.
    #[must_use]
    pub fn task_seconds(&self, task_id: &str) -> i64 {
        self.entries
            .iter()
            .filter(|e| e.task_id.as_deref() == Some(task_id))
            .map(|e| e.seconds)
            .sum()
    }
}

/// Period key (`YYYY-MM`) a timestamp falls into.
#[must_use]
pub fn period_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}
