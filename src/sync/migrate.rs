//! One-time import of the machine-local legacy layout.
//!
//! Sources:
//! - `<root>/local/session.json`: `{"current_issue": ..., "session_start": ...}`
//!   becomes the active session if none exists yet
//! - `<project>/.task-times.json`: `{<issue>: {"status", "current_session":
//!   {"start"}, "sessions": [{"start", "end"}]}}`; finished sessions become
//!   sealed history plus time entries
//!
//! Every imported record gets an id derived from its content, so running
//! `migrate` again writes nothing new.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::engine::SyncEngine;
use crate::error::Result;
use crate::model::{Environment, Profile, SessionRecord};
use crate::namespace::{NamespaceManager, layout};
use crate::store::{ensure_gitattributes, ensure_gitignore, parse, read_if_exists, value_hash};

pub const LEGACY_SESSION: &str = "local/session.json";
pub const LEGACY_TASK_TIMES: &str = ".task-times.json";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub namespace_created: bool,
    pub gitignore_created: bool,
    pub gitattributes_created: bool,
    pub active_session: Option<String>,
    pub sessions_imported: usize,
    pub time_entries_imported: usize,
    /// `true` if the profile already carried a migration stamp.
    pub already_migrated: bool,
    pub committed: bool,
}

impl MigrationReport {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.namespace_created
            || self.gitignore_created
            || self.gitattributes_created
            || self.active_session.is_some()
            || self.sessions_imported > 0
            || self.time_entries_imported > 0
            || !self.already_migrated
    }
}

impl SyncEngine<'_> {
    /// Seed the tracked namespace from the legacy layout and commit the result.
    ///
    /// # Errors
    ///
    /// `CorruptDocument` if a legacy file exists but is not JSON.
    pub fn migrate(&mut self) -> Result<MigrationReport> {
        let ctx = self.context();
        let mut report = import_legacy(self.namespaces(), &ctx.root, ctx.project_dir(), Utc::now())?;
        if report.changed() {
            let root = ctx.root.clone();
            report.committed = self.vcs().commit("ff: migrate legacy layout", &[root.as_path()])?;
        }
        info!(
            sessions = report.sessions_imported,
            time_entries = report.time_entries_imported,
            "migration complete"
        );
        Ok(report)
    }
}

/// Import legacy documents into the caller's namespace.
///
/// # Errors
///
/// `CorruptDocument` for unparsable legacy files; store errors otherwise.
pub fn import_legacy(
    ns: &NamespaceManager,
    root: &Path,
    project_dir: &Path,
    now: DateTime<Utc>,
) -> Result<MigrationReport> {
    let developer = ns.developer_id().to_string();
    let mut report = MigrationReport {
        namespace_created: ns.load_profile(&developer)?.is_none(),
        gitignore_created: ensure_gitignore(root)?,
        gitattributes_created: ensure_gitattributes(root)?,
        ..MigrationReport::default()
    };
    let profile = ns.ensure(&developer, now)?;
    let environment = Environment {
        project_root: Some(project_dir.display().to_string()),
        ..Environment::default()
    };

    let mut active_candidate = None;
    if let Some(legacy) = read_legacy(&root.join(LEGACY_SESSION))? {
        active_candidate = legacy_active_session(&developer, &legacy, &environment)?;
    }

    let times = read_legacy(&project_dir.join(LEGACY_TASK_TIMES))?;
    let issues = times.as_ref().and_then(|t| {
        let issues = t.as_object();
        if issues.is_none() {
            warn!(file = LEGACY_TASK_TIMES, "expected an object keyed by issue, skipped");
        }
        issues
    });
    for (issue, data) in issues.into_iter().flatten() {
        for entry in data.get("sessions").and_then(Value::as_array).into_iter().flatten() {
            let (Some(start), Some(end)) = (timestamp(entry.get("start")), timestamp(entry.get("end"))) else {
                debug!(issue, "legacy session without start/end skipped");
                continue;
            };
            let session = legacy_session(&developer, Some(issue), start, Some(end), &environment)?;
            if !ns.store().exists(&layout::session_history(&developer, &session.session_id)) {
                ns.archive_session(&session)?;
                report.sessions_imported += 1;
            }
            if ns.record_time(&session)? {
                report.time_entries_imported += 1;
            }
        }

        let active = data.get("status").and_then(Value::as_str) == Some("active");
        if active && active_candidate.is_none() {
            let start = timestamp(data.get("current_session").and_then(|c| c.get("start")));
            if let Some(start) = start {
                active_candidate = Some(legacy_session(&developer, Some(issue), start, None, &environment)?);
            }
        }
    }

    if let Some(session) = active_candidate {
        if ns.current_session(&developer)?.is_none() {
            ns.save_current(&session)?;
            report.active_session = Some(session.session_id);
        }
    }

    finish(ns, profile, report, now)
}

fn finish(
    ns: &NamespaceManager,
    mut profile: Profile,
    mut report: MigrationReport,
    now: DateTime<Utc>,
) -> Result<MigrationReport> {
    report.already_migrated = profile.migrated_at.is_some();
    if !report.already_migrated {
        profile.migrated_at = Some(now);
        profile.updated_at = profile.updated_at.max(now);
        ns.save_profile(&profile)?;
    }
    Ok(report)
}

fn read_legacy(path: &Path) -> Result<Option<Value>> {
    match read_if_exists(path)? {
        Some(bytes) => parse(path, &bytes).map(Some),
        None => Ok(None),
    }
}

fn legacy_active_session(
    developer: &str,
    legacy: &Value,
    environment: &Environment,
) -> Result<Option<SessionRecord>> {
    let Some(start) = timestamp(legacy.get("session_start")) else {
        return Ok(None);
    };
    let task = legacy.get("current_issue").and_then(issue_id);
    legacy_session(developer, task.as_deref(), start, None, environment).map(Some)
}

fn legacy_session(
    developer: &str,
    task: Option<&str>,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    environment: &Environment,
) -> Result<SessionRecord> {
    let mut session = SessionRecord::start(developer, task, environment.clone(), start);
    session.session_id = legacy_session_id(developer, task, start)?;
    if let Some(end) = end {
        session.seal(end);
    }
    Ok(session)
}

/// `sess_<start>_<hash>`: sorts with native ids and is stable across runs.
fn legacy_session_id(developer: &str, task: Option<&str>, start: DateTime<Utc>) -> Result<String> {
    let digest = value_hash(&(developer, task, start))?;
    Ok(format!("sess_{}_{}", start.format("%Y%m%dT%H%M%S%3f"), &digest[..8]))
}

fn issue_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = value?.as_str()?.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
