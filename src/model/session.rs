//! Session records.
//!
//! A session is one continuous unit of work tied to zero or one task. It is
//! created active, sealed exactly once (end time set, `active = false`) and
//! read-only from then on. Restoring a sealed session creates a new record
//! that points back at its source through `restored_from`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version-control snapshot taken when a session starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub git_branch: Option<String>,
    pub git_commit: Option<String>,
    pub project_root: Option<String>,
}

/// One work session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub developer_id: String,
    pub task_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub active: bool,
    /// Single-hop back-reference to the session this one was restored from.
    pub restored_from: Option<String>,
    #[serde(default)]
    pub environment: Environment,
    /// Last mutation time, used for last-writer-wins reconciliation.
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a new active session starting at `now`.
    #[must_use]
    pub fn start(
        developer_id: &str,
        task_id: Option<&str>,
        environment: Environment,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: new_session_id(now),
            developer_id: developer_id.to_string(),
            task_id: task_id.map(ToString::to_string),
            start_time: now,
            end_time: None,
            active: true,
            restored_from: None,
            environment,
            updated_at: now,
        }
    }

    /// Create a new active session continuing `source`.
    #[must_use]
    pub fn restored_from(
        source: &SessionRecord,
        developer_id: &str,
        environment: Environment,
        now: DateTime<Utc>,
    ) -> Self {
        let mut session = Self::start(developer_id, source.task_id.as_deref(), environment, now);
        session.restored_from = Some(source.session_id.clone());
        session
    }

    /// Seal the session at `at`. Sealing an already sealed record is a no-op.
    pub fn seal(&mut self, at: DateTime<Utc>) {
        if self.is_sealed() {
            return;
        }
        let end = at.max(self.start_time);
        self.end_time = Some(end);
        self.active = false;
        self.updated_at = end.max(self.updated_at);
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        !self.active && self.end_time.is_some()
    }

    /// Time spent in the session; zero while it is still open.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.end_time
            .map_or_else(chrono::Duration::zero, |end| end - self.start_time)
    }

    /// The timestamp used to order sessions by recency.
    #[must_use]
    pub fn recency(&self) -> DateTime<Utc> {
        self.end_time.unwrap_or(self.start_time)
    }
}

/// Generate a session id that sorts by start time.
///
/// Format: `sess_<yyyymmddThhmmssmmm>_<8 hex>`.
#[must_use]
pub fn new_session_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("sess_{}_{}", now.format("%Y%m%dT%H%M%S%3f"), &suffix[..8])
}
