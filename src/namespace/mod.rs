//! Namespace manager.
//!
//! Each developer owns a subtree under `developers/<id>/` holding their
//! profile, the current-session pointer, sealed session history and monthly
//! time sheets. Any developer may read any namespace (restoring a session
//! started on another machine or by a teammate), but only the owner may write
//! to theirs.

pub mod layout;

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::Context;
use crate::error::{Error, Result};
use crate::model::{Profile, SessionRecord, TimeEntry, TimeSheet, period_key};
use crate::store::DocumentStore;

/// Read access to every namespace; write access to the context's own.
#[derive(Debug, Clone)]
pub struct NamespaceManager {
    developer_id: String,
    store: DocumentStore,
}

impl NamespaceManager {
    #[must_use]
    pub fn new(ctx: &Context) -> Self {
        Self {
            developer_id: ctx.developer_id.clone(),
            store: DocumentStore::new(&ctx.root),
        }
    }

    #[must_use]
    pub fn developer_id(&self) -> &str {
        &self.developer_id
    }

    #[must_use]
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    fn check_owner(&self, developer: &str) -> Result<()> {
        if developer == self.developer_id {
            Ok(())
        } else {
            Err(Error::CrossNamespaceWrite {
                owner: developer.to_string(),
                developer: self.developer_id.clone(),
            })
        }
    }

    // ── Profile ───────────────────────────────────────────────

    /// Create the namespace if it does not exist yet. Returns the profile.
    ///
    /// # Errors
    ///
    /// `CrossNamespaceWrite` for another developer's namespace; `Io` or
    /// `CorruptDocument` from the store.
    pub fn ensure(&self, developer: &str, now: DateTime<Utc>) -> Result<Profile> {
        self.check_owner(developer)?;
        if let Some(profile) = self.load_profile(developer)? {
            return Ok(profile);
        }
        let profile = Profile::new(developer, now);
        self.store.write(&layout::profile(developer), &profile)?;
        info!(developer, "namespace created");
        Ok(profile)
    }

    /// # Errors
    ///
    /// Returns `CorruptDocument` or `Io`.
    pub fn load_profile(&self, developer: &str) -> Result<Option<Profile>> {
        self.store.read_opt(&layout::profile(developer))
    }

    /// # Errors
    ///
    /// `CrossNamespaceWrite` unless the profile is the caller's own.
    pub fn save_profile(&self, profile: &Profile) -> Result<()> {
        self.check_owner(&profile.developer_id)?;
        self.store.write(&layout::profile(&profile.developer_id), profile)
    }

    /// Developers that have a namespace, sorted.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be listed.
    pub fn developers(&self) -> Result<Vec<String>> {
        self.store.list_dirs(layout::DEVELOPERS_DIR)
    }

    // ── Sessions ──────────────────────────────────────────────

    /// The current-session document of `developer`.
    ///
    /// A current session still marked active whose sealed copy already sits
    /// in history is the trace of an interrupted `end`; for the owner it is
    /// repaired in place, for anyone else the sealed copy is returned.
    ///
    /// # Errors
    ///
    /// Returns `CorruptDocument` or `Io`.
    pub fn current_session(&self, developer: &str) -> Result<Option<SessionRecord>> {
        let Some(current) = self
            .store
            .read_opt::<SessionRecord>(&layout::current_session(developer))?
        else {
            return Ok(None);
        };
        if current.is_sealed() {
            return Ok(Some(current));
        }
        match self.load_history(developer, &current.session_id)? {
            Some(sealed) if sealed.is_sealed() => {
                warn!(developer, session = %sealed.session_id, "repairing interrupted session end");
                if developer == self.developer_id {
                    self.store.write(&layout::current_session(developer), &sealed)?;
                }
                Ok(Some(sealed))
            }
            _ => Ok(Some(current)),
        }
    }

    /// Active session of `developer`, if any.
    ///
    /// # Errors
    ///
    /// Returns `CorruptDocument` or `Io`.
    pub fn active_session(&self, developer: &str) -> Result<Option<SessionRecord>> {
        Ok(self.current_session(developer)?.filter(|s| s.active))
    }

    /// Replace the caller's current-session document.
    ///
    /// # Errors
    ///
    /// `CrossNamespaceWrite` for a foreign session; `Io` on write failure.
    pub fn save_current(&self, session: &SessionRecord) -> Result<()> {
        self.check_owner(&session.developer_id)?;
        self.store.write(&layout::current_session(&session.developer_id), session)
    }

    /// Store a sealed session in its owner's history.
    ///
    /// Re-archiving an identical record is a no-op.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the session is not sealed, or if a different
    ///   record is already archived under its id
    /// - `CrossNamespaceWrite` for a foreign session
    pub fn archive_session(&self, session: &SessionRecord) -> Result<()> {
        self.check_owner(&session.developer_id)?;
        if !session.is_sealed() {
            return Err(Error::InvalidArgument(format!(
                "session {} is still active and cannot be archived",
                session.session_id
            )));
        }
        let rel = layout::session_history(&session.developer_id, &session.session_id);
        if let Some(existing) = self.store.read_opt::<SessionRecord>(&rel)? {
            if existing == *session {
                return Ok(());
            }
            return Err(Error::InvalidArgument(format!(
                "session {} is sealed and immutable",
                session.session_id
            )));
        }
        debug!(session = %session.session_id, "archiving session");
        self.store.write(&rel, session)
    }

    fn load_history(&self, developer: &str, session_id: &str) -> Result<Option<SessionRecord>> {
        self.store
            .read_opt(&layout::session_history(developer, session_id))
    }

    /// Sealed sessions of `developer`, most recent first.
    ///
    /// Records are read one at a time as the iterator advances; call again to
    /// start over.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the history directory cannot be listed.
    pub fn list_session_history(&self, developer: &str) -> Result<SessionHistory<'_>> {
        let mut ids = self.store.list(&layout::session_history_dir(developer))?;
        // Session ids embed their start time, so name order is start order.
        ids.sort_by(|a, b| b.cmp(a));
        Ok(SessionHistory {
            store: &self.store,
            developer: developer.to_string(),
            ids: ids.into_iter(),
        })
    }

    /// Find a session by id: the current session or history, own namespace
    /// first, then every other namespace.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` if no namespace has it.
    pub fn find_session_by_id(&self, session_id: &str) -> Result<SessionRecord> {
        for developer in self.search_order()? {
            if let Some(found) = self.load_history(&developer, session_id)? {
                return Ok(found);
            }
            if let Some(current) = self.current_session(&developer)? {
                if current.session_id == session_id {
                    return Ok(current);
                }
            }
        }
        Err(Error::SessionNotFound {
            id: session_id.to_string(),
        })
    }

    /// The caller's most recent sealed session.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` if the caller has no history.
    pub fn find_latest_session(&self) -> Result<SessionRecord> {
        let developer = self.developer_id.clone();
        let mut sessions = self
            .list_session_history(&developer)?
            .collect::<Result<Vec<_>>>()?;
        sessions.sort_by_key(|s| Reverse(s.recency()));
        sessions.into_iter().next().ok_or_else(|| Error::SessionNotFound {
            id: "latest".to_string(),
        })
    }

    /// Most recent sealed session for a task, own namespace first.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` if no namespace has a session for the task.
    pub fn find_session_by_task(&self, task_id: &str) -> Result<SessionRecord> {
        for developer in self.search_order()? {
            let mut best: Option<SessionRecord> = None;
            for session in self.list_session_history(&developer)? {
                let session = session?;
                if session.task_id.as_deref() == Some(task_id)
                    && best.as_ref().is_none_or(|b| session.recency() > b.recency())
                {
                    best = Some(session);
                }
            }
            if let Some(best) = best {
                return Ok(best);
            }
        }
        Err(Error::SessionNotFound {
            id: format!("task:{task_id}"),
        })
    }

    fn search_order(&self) -> Result<Vec<String>> {
        let mut order = vec![self.developer_id.clone()];
        order.extend(
            self.developers()?
                .into_iter()
                .filter(|d| *d != self.developer_id),
        );
        Ok(order)
    }

    // ── Time tracking ─────────────────────────────────────────

    /// Add a sealed session to the caller's time sheet for its period.
    /// Returns `false` if it was already recorded.
    ///
    /// # Errors
    ///
    /// `CrossNamespaceWrite` for a foreign session; store errors otherwise.
    pub fn record_time(&self, session: &SessionRecord) -> Result<bool> {
        self.check_owner(&session.developer_id)?;
        let Some(entry) = TimeEntry::from_session(session) else {
            return Ok(false);
        };
        let period = period_key(entry.started_at);
        let rel = layout::time_tracking(&session.developer_id, &period);
        let (_, added) = self.store.merge(&rel, |sheet: &mut TimeSheet| {
            if sheet.period.is_empty() {
                sheet.period.clone_from(&period);
            }
            Ok(sheet.record(entry.clone()))
        })?;
        Ok(added)
    }

    /// Time sheet of `developer` for `period` (`YYYY-MM`), empty if none.
    ///
    /// # Errors
    ///
    /// Returns `CorruptDocument` or `Io`.
    pub fn timesheet(&self, developer: &str, period: &str) -> Result<TimeSheet> {
        Ok(self
            .store
            .read_opt(&layout::time_tracking(developer, period))?
            .unwrap_or_else(|| TimeSheet::new(period)))
    }

    /// Periods with a time sheet for `developer`, sorted.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be listed.
    pub fn periods(&self, developer: &str) -> Result<Vec<String>> {
        self.store.list(&layout::time_tracking_dir(developer))
    }
}

/// Lazy, finite sequence of a developer's sealed sessions, newest first.
pub struct SessionHistory<'a> {
    store: &'a DocumentStore,
    developer: String,
    ids: std::vec::IntoIter<String>,
}

impl Iterator for SessionHistory<'_> {
    type Item = Result<SessionRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        Some(self.store.read(&layout::session_history(&self.developer, &id)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::model::Environment;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn t(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(min)
    }

    fn manager(dir: &TempDir, developer: &str) -> NamespaceManager {
        let ctx = Context::new(developer, dir.path(), Settings::default()).unwrap();
        NamespaceManager::new(&ctx)
    }

    fn sealed(developer: &str, task: Option<&str>, start: i64, end: i64) -> SessionRecord {
        let mut s = SessionRecord::start(developer, task, Environment::default(), t(start));
        s.seal(t(end));
        s
    }

    #[test]
    fn test_ensure_is_lazy_and_idempotent() {
        let dir = TempDir::new().unwrap();
        let ns = manager(&dir, "ana");
        assert!(ns.load_profile("ana").unwrap().is_none());

        let first = ns.ensure("ana", t(0)).unwrap();
        let second = ns.ensure("ana", t(10)).unwrap();
        assert_eq!(first, second);
        assert_eq!(ns.developers().unwrap(), vec!["ana"]);
    }

    #[test]
    fn test_cross_namespace_write_is_rejected() {
        let dir = TempDir::new().unwrap();
        let ana = manager(&dir, "ana");
        let bo = manager(&dir, "bo");
        bo.ensure("bo", t(0)).unwrap();

        assert!(matches!(
            ana.ensure("bo", t(0)),
            Err(Error::CrossNamespaceWrite { .. })
        ));
        let foreign = SessionRecord::start("bo", None, Environment::default(), t(0));
        assert!(matches!(
            ana.save_current(&foreign),
            Err(Error::CrossNamespaceWrite { .. })
        ));
        // Reads across namespaces are fine.
        assert!(ana.load_profile("bo").unwrap().is_some());
    }

    #[test]
    fn test_history_is_newest_first_and_restartable() {
        let dir = TempDir::new().unwrap();
        let ns = manager(&dir, "ana");
        for (start, end) in [(0, 10), (20, 30), (40, 50)] {
            ns.archive_session(&sealed("ana", Some("T1"), start, end)).unwrap();
        }

        let starts: Vec<_> = ns
            .list_session_history("ana")
            .unwrap()
            .map(|s| s.unwrap().start_time)
            .collect();
        assert_eq!(starts, vec![t(40), t(20), t(0)]);

        let first_again = ns.list_session_history("ana").unwrap().next().unwrap().unwrap();
        assert_eq!(first_again.start_time, t(40));
        assert!(ns.list_session_history("nobody").unwrap().next().is_none());
    }

    #[test]
    fn test_archived_sessions_are_immutable() {
        let dir = TempDir::new().unwrap();
        let ns = manager(&dir, "ana");
        let session = sealed("ana", None, 0, 10);
        ns.archive_session(&session).unwrap();
        ns.archive_session(&session).unwrap();

        let mut edited = session.clone();
        edited.task_id = Some("T9".into());
        assert!(ns.archive_session(&edited).is_err());

        let active = SessionRecord::start("ana", None, Environment::default(), t(0));
        assert!(ns.archive_session(&active).is_err());
    }

    #[test]
    fn test_find_sessions() {
        let dir = TempDir::new().unwrap();
        let ana = manager(&dir, "ana");
        let bo = manager(&dir, "bo");
        let own = sealed("ana", Some("T1"), 0, 10);
        let newer_own = sealed("ana", Some("T2"), 20, 30);
        let foreign = sealed("bo", Some("T7"), 5, 15);
        ana.archive_session(&own).unwrap();
        ana.archive_session(&newer_own).unwrap();
        bo.archive_session(&foreign).unwrap();

        assert_eq!(ana.find_latest_session().unwrap(), newer_own);
        assert_eq!(ana.find_session_by_id(&foreign.session_id).unwrap(), foreign);
        assert_eq!(ana.find_session_by_task("T7").unwrap(), foreign);
        assert_eq!(ana.find_session_by_task("T1").unwrap(), own);
        assert!(matches!(
            ana.find_session_by_task("T404"),
            Err(Error::SessionNotFound { .. })
        ));
        assert!(bo.find_session_by_id("sess_missing").is_err());
    }

    #[test]
    fn test_interrupted_end_is_repaired() {
        let dir = TempDir::new().unwrap();
        let ns = manager(&dir, "ana");
        let active = SessionRecord::start("ana", Some("T1"), Environment::default(), t(0));
        ns.save_current(&active).unwrap();
        let mut done = active.clone();
        done.seal(t(25));
        // Killed after archiving, before rewriting the current pointer.
        ns.archive_session(&done).unwrap();

        assert!(ns.active_session("ana").unwrap().is_none());
        let stored: SessionRecord = ns.store().read(&layout::current_session("ana")).unwrap();
        assert_eq!(stored, done);
    }

    #[test]
    fn test_record_time_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let ns = manager(&dir, "ana");
        let session = sealed("ana", Some("T1"), 0, 90);

        assert!(ns.record_time(&session).unwrap());
        assert!(!ns.record_time(&session).unwrap());

        let sheet = ns.timesheet("ana", "2026-03").unwrap();
        assert_eq!(sheet.period, "2026-03");
        assert_eq!(sheet.total_seconds(), 90 * 60);
        assert_eq!(ns.periods("ana").unwrap(), vec!["2026-03"]);
    }
}
