//! Document paths under the namespace root.
//!
//! ```text
//! developers/<id>/profile.json
//! developers/<id>/sessions/current.json
//! developers/<id>/sessions/history/<sessionId>.json
//! developers/<id>/time-tracking/<YYYY-MM>.json
//! team/task-assignments.json
//! team/blockers.json
//! quarantine/<entryId>.json          (machine-local, ignored by git)
//! ```

pub const DEVELOPERS_DIR: &str = "developers";
pub const TEAM_DIR: &str = "team";
pub const QUARANTINE_DIR: &str = "quarantine";
pub const TASK_ASSIGNMENTS: &str = "team/task-assignments.json";
pub const BLOCKERS: &str = "team/blockers.json";

#[must_use]
pub fn developer_dir(developer: &str) -> String {
    format!("{DEVELOPERS_DIR}/{developer}")
}

#[must_use]
pub fn profile(developer: &str) -> String {
    format!("{DEVELOPERS_DIR}/{developer}/profile.json")
}

#[must_use]
pub fn current_session(developer: &str) -> String {
    format!("{DEVELOPERS_DIR}/{developer}/sessions/current.json")
}

#[must_use]
pub fn session_history_dir(developer: &str) -> String {
    format!("{DEVELOPERS_DIR}/{developer}/sessions/history")
}

#[must_use]
pub fn session_history(developer: &str, session_id: &str) -> String {
    format!("{DEVELOPERS_DIR}/{developer}/sessions/history/{session_id}.json")
}

#[must_use]
pub fn time_tracking_dir(developer: &str) -> String {
    format!("{DEVELOPERS_DIR}/{developer}/time-tracking")
}

#[must_use]
pub fn time_tracking(developer: &str, period: &str) -> String {
    format!("{DEVELOPERS_DIR}/{developer}/time-tracking/{period}.json")
}

#[must_use]
pub fn quarantine_entry(id: &str) -> String {
    format!("{QUARANTINE_DIR}/{id}.json")
}

/// A recognized document path, parsed back from its relative form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentPath {
    Profile { developer: String },
    CurrentSession { developer: String },
    SessionHistory { developer: String, session_id: String },
    TimeSheet { developer: String, period: String },
    TaskAssignments,
    Blockers,
}

impl DocumentPath {
    /// Parse a `/`-separated path relative to the namespace root.
    #[must_use]
    pub fn parse(rel: &str) -> Option<Self> {
        let parts: Vec<&str> = rel.split('/').filter(|p| !p.is_empty()).collect();
        let stem = |name: &str| name.strip_suffix(".json").map(ToString::to_string);
        match parts.as_slice() {
            [DEVELOPERS_DIR, dev, "profile.json"] => Some(Self::Profile {
                developer: (*dev).to_string(),
            }),
            [DEVELOPERS_DIR, dev, "sessions", "current.json"] => Some(Self::CurrentSession {
                developer: (*dev).to_string(),
            }),
            [DEVELOPERS_DIR, dev, "sessions", "history", file] => Some(Self::SessionHistory {
                developer: (*dev).to_string(),
                session_id: stem(file)?,
            }),
            [DEVELOPERS_DIR, dev, "time-tracking", file] => Some(Self::TimeSheet {
                developer: (*dev).to_string(),
                period: stem(file)?,
            }),
            [TEAM_DIR, "task-assignments.json"] => Some(Self::TaskAssignments),
            [TEAM_DIR, "blockers.json"] => Some(Self::Blockers),
            _ => None,
        }
    }

    /// Developer that exclusively owns this document, if any.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        match self {
            Self::Profile { developer }
            | Self::CurrentSession { developer }
            | Self::SessionHistory { developer, .. }
            | Self::TimeSheet { developer, .. } => Some(developer),
            Self::TaskAssignments | Self::Blockers => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inverts_builders() {
        assert_eq!(
            DocumentPath::parse(&profile("ana")),
            Some(DocumentPath::Profile { developer: "ana".into() })
        );
        assert_eq!(
            DocumentPath::parse(&session_history("ana", "sess_1")),
            Some(DocumentPath::SessionHistory {
                developer: "ana".into(),
                session_id: "sess_1".into()
            })
        );
        assert_eq!(
            DocumentPath::parse(&time_tracking("bo", "2026-02")),
            Some(DocumentPath::TimeSheet {
                developer: "bo".into(),
                period: "2026-02".into()
            })
        );
        assert_eq!(DocumentPath::parse(BLOCKERS), Some(DocumentPath::Blockers));
        assert_eq!(DocumentPath::parse(TASK_ASSIGNMENTS), Some(DocumentPath::TaskAssignments));
    }

    #[test]
    fn test_parse_rejects_unknown_paths() {
        assert_eq!(DocumentPath::parse("config.json"), None);
        assert_eq!(DocumentPath::parse("developers/ana/notes.txt"), None);
        assert_eq!(DocumentPath::parse("developers/ana/sessions/history/x.txt"), None);
    }

    #[test]
    fn test_owner() {
        assert_eq!(
            DocumentPath::parse(&current_session("ana")).unwrap().owner(),
            Some("ana")
        );
        assert_eq!(DocumentPath::Blockers.owner(), None);
    }
}
