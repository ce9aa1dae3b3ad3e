//! The sync cycle state machine.
//!
//! ```text
//! Idle → Pulling → Merging → [Resolving] → Committing → Pushing → Idle
//! ```
//!
//! - `sync` runs the whole cycle
//! - `pull` stops after Merging (or Resolving)
//! - `push` runs Committing → Pushing
//!
//! Local uncommitted namespace changes are stashed before integrating the
//! upstream and re-applied afterwards. Conflicts on either step go through the
//! resolver; anything it cannot decide is quarantined and the cycle halts in
//! `Resolving` with the local edits left in the working copy.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Context;
use crate::error::{Error, Result};
use crate::model::SessionRecord;
use crate::namespace::{NamespaceManager, layout};
use crate::resolve::{self, QuarantineEntry, Resolution, quarantine};
use crate::store::{DocumentStore, ensure_gitattributes, ensure_gitignore};
use crate::vcs::{PullOutcome, PullStrategy, Stage, StashPop, Vcs};

const MERGE_MESSAGE: &str = "ff: merge remote namespace changes";

/// Where a sync cycle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Pulling,
    Merging,
    Resolving,
    Committing,
    Pushing,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Pulling => "pulling",
            Self::Merging => "merging",
            Self::Resolving => "resolving",
            Self::Committing => "committing",
            Self::Pushing => "pushing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Integrate the upstream without stashing local edits first.
    pub force: bool,
    /// Commit message; a default is generated when absent.
    pub message: Option<String>,
}

/// What one invocation did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub pull: Option<PullOutcome>,
    /// Documents reconciled by the resolver (relative to the namespace root).
    pub resolved: Vec<String>,
    /// Sessions sealed into history because another session won the current slot.
    pub displaced: Vec<String>,
    pub committed: bool,
    pub pushed: bool,
}

/// Runs sync cycles for one context against one working tree.
pub struct SyncEngine<'a> {
    ctx: &'a Context,
    vcs: &'a dyn Vcs,
    namespaces: NamespaceManager,
    phase: SyncPhase,
}

impl<'a> SyncEngine<'a> {
    #[must_use]
    pub fn new(ctx: &'a Context, vcs: &'a dyn Vcs) -> Self {
        Self {
            ctx,
            vcs,
            namespaces: NamespaceManager::new(ctx),
            phase: SyncPhase::Idle,
        }
    }

    /// Phase the last operation reached; `Idle` after a completed one.
    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub(crate) fn context(&self) -> &Context {
        self.ctx
    }

    pub(crate) fn vcs(&self) -> &dyn Vcs {
        self.vcs
    }

    pub(crate) fn namespaces(&self) -> &NamespaceManager {
        &self.namespaces
    }

    fn store(&self) -> &DocumentStore {
        self.namespaces.store()
    }

    fn transition(&mut self, next: SyncPhase) {
        debug!(from = %self.phase, to = %next, "sync phase");
        self.phase = next;
    }

    // ── Operations ────────────────────────────────────────────

    /// Full cycle: pull, merge, resolve, commit, push.
    ///
    /// # Errors
    ///
    /// - `AmbiguousConflict` (phase stays `Resolving`; see `ff quarantine list`)
    /// - `NetworkFailure` from fetch or push; nothing partial is committed
    /// - `NonFastForward` if the remote moved during the cycle
    pub fn sync(&mut self, options: &SyncOptions) -> Result<SyncReport> {
        self.refuse_while_quarantined()?;
        self.namespaces.ensure(&self.ctx.developer_id, Utc::now())?;

        let mut report = SyncReport::default();
        self.pull_phase(options, &mut report)?;
        report.committed = self.commit_phase(options)?;
        report.pushed = self.push_phase()?;
        self.transition(SyncPhase::Idle);
        info!(
            committed = report.committed,
            pushed = report.pushed,
            resolved = report.resolved.len(),
            "sync complete"
        );
        Ok(report)
    }

    /// Integrate the upstream into the working copy without committing local edits.
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::sync`], minus push failures.
    pub fn pull(&mut self, options: &SyncOptions) -> Result<SyncReport> {
        self.refuse_while_quarantined()?;
        let mut report = SyncReport::default();
        self.pull_phase(options, &mut report)?;
        self.transition(SyncPhase::Idle);
        Ok(report)
    }

    /// Commit pending namespace changes and push. Never pulls, never forces.
    ///
    /// After an interrupted sync this only pushes the commit already made.
    ///
    /// # Errors
    ///
    /// `NonFastForward` if the remote has commits this clone does not; pull first.
    pub fn push(&mut self, options: &SyncOptions) -> Result<SyncReport> {
        self.refuse_while_quarantined()?;
        let report = SyncReport {
            committed: self.commit_phase(options)?,
            pushed: self.push_phase()?,
            ..SyncReport::default()
        };
        self.transition(SyncPhase::Idle);
        Ok(report)
    }

    fn refuse_while_quarantined(&self) -> Result<()> {
        let entries = quarantine::list(self.store())?;
        match entries.into_iter().next() {
            Some((_, entry)) => Err(Error::AmbiguousConflict {
                document: entry.document,
                key: entry.key,
            }),
            None => Ok(()),
        }
    }

    // ── Phases ────────────────────────────────────────────────

    fn pull_phase(&mut self, options: &SyncOptions, report: &mut SyncReport) -> Result<()> {
        self.transition(SyncPhase::Pulling);
        self.prepare_root()?;

        let root = self.ctx.root.clone();
        // An unborn branch has nothing to stash onto and nothing to rebase.
        let stashed = !options.force && self.vcs.head_commit()?.is_some() && self.vcs.stash(&root)?;
        if stashed {
            debug!("stashed local namespace changes");
        }

        let outcome = match self.vcs.pull(PullStrategy::Rebase) {
            Ok(outcome) => outcome,
            Err(e) => {
                if stashed {
                    self.unstash_after_failure();
                }
                return Err(e);
            }
        };

        self.transition(SyncPhase::Merging);
        if let PullOutcome::Conflicted { paths } = &outcome {
            if let Err(e) = self.resolve_merge(paths, report) {
                if stashed {
                    self.unstash_after_failure();
                }
                return Err(e);
            }
        }
        report.pull = Some(outcome);

        if stashed {
            if let StashPop::Conflicted { paths } = self.vcs.stash_pop()? {
                self.resolve_stash_pop(&paths, report)?;
            }
        }
        Ok(())
    }

    /// Commit pending namespace changes. Returns `false` when there were none.
    fn commit_phase(&mut self, options: &SyncOptions) -> Result<bool> {
        self.transition(SyncPhase::Committing);
        let root = self.ctx.root.clone();
        if !self.vcs.status(&root)?.dirty {
            debug!("nothing to commit");
            return Ok(false);
        }

        let now = Utc::now();
        let mut profile = self.namespaces.ensure(&self.ctx.developer_id, now)?;
        profile.mark_synced(now);
        self.namespaces.save_profile(&profile)?;

        let message = options
            .message
            .clone()
            .unwrap_or_else(|| format!("ff: sync {}", self.ctx.developer_id));
        let committed = self.vcs.commit(&message, &[root.as_path()])?;
        if committed {
            info!(message = %message, "committed namespace changes");
        }
        Ok(committed)
    }

    /// Push local commits. Returns `false` when there was nothing to push.
    fn push_phase(&mut self) -> Result<bool> {
        self.transition(SyncPhase::Pushing);
        let status = self.vcs.status(&self.ctx.root)?;
        if !status.has_remote {
            info!("no remote configured, nothing pushed");
            return Ok(false);
        }
        if self.vcs.head_commit()?.is_none() {
            return Ok(false);
        }
        if status.upstream.is_some() && status.ahead == 0 {
            debug!("remote already up to date");
            return Ok(false);
        }
        self.vcs.push()?;
        info!(ahead = status.ahead, "pushed");
        Ok(true)
    }

    /// Write the namespace `.gitignore` and `.gitattributes` if missing.
    /// They are committed with the next namespace commit, never on their own.
    fn prepare_root(&self) -> Result<()> {
        let root = &self.ctx.root;
        let ignore = ensure_gitignore(root)?;
        let attributes = ensure_gitattributes(root)?;
        if ignore || attributes {
            debug!("wrote namespace attributes");
        }
        Ok(())
    }

    // ── Conflict resolution ───────────────────────────────────

    fn rel(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.ctx.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Resolve an in-progress merge of committed history. Nothing is written
    /// unless every path resolves; otherwise the merge is aborted.
    fn resolve_merge(&mut self, paths: &[PathBuf], report: &mut SyncReport) -> Result<()> {
        self.transition(SyncPhase::Resolving);

        let mut resolutions = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(rel) = self.rel(path) else {
                self.vcs.abort_merge()?;
                return Err(Error::Vcs {
                    command: "merge".to_string(),
                    message: format!(
                        "conflict outside the namespace root: {}; resolve it with git",
                        path.display()
                    ),
                });
            };
            let local = self.vcs.read_stage(path, Stage::Ours)?;
            let remote = self.vcs.read_stage(path, Stage::Theirs)?;
            match resolve::resolve(&rel, local.as_deref(), remote.as_deref()) {
                Ok(resolution) => resolutions.push((path, rel, resolution)),
                Err(e) => {
                    if let Error::AmbiguousConflict { key, .. } = &e {
                        let entry = QuarantineEntry::new(&rel, key, local.as_deref(), remote.as_deref(), Utc::now());
                        quarantine::quarantine(self.store(), &entry)?;
                    }
                    self.vcs.abort_merge()?;
                    return Err(e);
                }
            }
        }

        for (path, rel, resolution) in resolutions {
            self.apply(&rel, resolution, report)?;
            self.vcs.mark_resolved(&[path.as_path()])?;
        }
        self.vcs.conclude_merge(MERGE_MESSAGE)?;
        self.transition(SyncPhase::Merging);
        Ok(())
    }

    /// Resolve conflicts from re-applying stashed edits on top of the
    /// integrated upstream. Here the stash is the local side.
    fn resolve_stash_pop(&mut self, paths: &[PathBuf], report: &mut SyncReport) -> Result<()> {
        self.transition(SyncPhase::Resolving);

        let mut first_ambiguous = None;
        for path in paths {
            let local = self.vcs.read_stage(path, Stage::Theirs)?;
            let remote = self.vcs.read_stage(path, Stage::Ours)?;
            let Some(rel) = self.rel(path) else {
                warn!(path = %path.display(), "stash conflict outside the namespace root left for git");
                continue;
            };
            match resolve::resolve(&rel, local.as_deref(), remote.as_deref()) {
                Ok(resolution) => self.apply(&rel, resolution, report)?,
                Err(Error::AmbiguousConflict { document, key }) => {
                    let entry = QuarantineEntry::new(&rel, &key, local.as_deref(), remote.as_deref(), Utc::now());
                    quarantine::quarantine(self.store(), &entry)?;
                    // Keep the local edit in the working copy for manual reconciliation.
                    if let Some(bytes) = &local {
                        self.store().write_bytes(&rel, bytes)?;
                    }
                    first_ambiguous.get_or_insert(Error::AmbiguousConflict { document, key });
                }
                Err(e) => return Err(e),
            }
        }

        let all: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
        self.vcs.unstage(&all)?;
        self.vcs.stash_drop()?;

        match first_ambiguous {
            Some(e) => Err(e),
            None => {
                self.transition(SyncPhase::Merging);
                Ok(())
            }
        }
    }

    /// Write a resolved document and file any displaced sessions into history.
    fn apply(&self, rel: &str, resolution: Resolution, report: &mut SyncReport) -> Result<()> {
        self.store().write_bytes(rel, &resolution.content)?;
        for session in resolution.displaced {
            self.file_displaced(&session)?;
            report.displaced.push(session.session_id);
        }
        info!(document = rel, "conflict resolved");
        report.resolved.push(rel.to_string());
        Ok(())
    }

    fn file_displaced(&self, session: &SessionRecord) -> Result<()> {
        if session.developer_id == self.ctx.developer_id {
            self.namespaces.archive_session(session)?;
            self.namespaces.record_time(session)?;
            return Ok(());
        }
        // Reconciling someone else's documents: keep the record, never overwrite history.
        let rel = layout::session_history(&session.developer_id, &session.session_id);
        if !self.store().exists(&rel) {
            self.store().write(&rel, session)?;
        }
        Ok(())
    }

    fn unstash_after_failure(&self) {
        match self.vcs.stash_pop() {
            Ok(StashPop::Clean) => {}
            Ok(StashPop::Conflicted { paths }) => {
                warn!(count = paths.len(), "local edits re-applied with conflicts; see `git status`");
            }
            Err(e) => warn!(error = %e, "could not re-apply local edits; they remain in `git stash list`"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::vcs::fake::FakeVcs;
    use tempfile::TempDir;

    #[test]
    fn test_sync_without_remote_creates_namespace() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("ana", dir.path().join(".flowforge"), Settings::default()).unwrap();
        let vcs = FakeVcs::new(dir.path(), &["main"], "main");
        let mut engine = SyncEngine::new(&ctx, &vcs);

        let report = engine.sync(&SyncOptions::default()).unwrap();

        assert_eq!(report.pull, Some(PullOutcome::NoUpstream));
        assert!(!report.pushed);
        assert_eq!(engine.phase(), SyncPhase::Idle);
        assert!(ctx.root.join(".gitattributes").is_file());
        assert!(engine.namespaces().load_profile("ana").unwrap().is_some());
    }

    #[test]
    fn test_sync_refuses_while_quarantined() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("ana", dir.path(), Settings::default()).unwrap();
        let vcs = FakeVcs::new(dir.path(), &["main"], "main");
        let store = DocumentStore::new(&ctx.root);
        let entry = QuarantineEntry::new(layout::BLOCKERS, "T1", Some(b"{}"), Some(b"[]"), Utc::now());
        quarantine::quarantine(&store, &entry).unwrap();

        let mut engine = SyncEngine::new(&ctx, &vcs);
        for result in [
            engine.sync(&SyncOptions::default()),
            engine.pull(&SyncOptions::default()),
            engine.push(&SyncOptions::default()),
        ] {
            assert!(matches!(result, Err(Error::AmbiguousConflict { .. })));
        }
    }

    #[test]
    fn test_rel_paths_use_forward_slashes() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("ana", dir.path(), Settings::default()).unwrap();
        let vcs = FakeVcs::new(dir.path(), &["main"], "main");
        let engine = SyncEngine::new(&ctx, &vcs);

        let path = ctx.root.join("team").join("blockers.json");
        assert_eq!(engine.rel(&path).as_deref(), Some("team/blockers.json"));
        assert_eq!(engine.rel(Path::new("/elsewhere/x.json")), None);
    }

    fn blocker_board(task: &str, developer: &str) -> Vec<u8> {
        let now = Utc::now();
        let board = crate::model::BlockerBoard {
            blockers: vec![crate::model::Blocker {
                task: task.into(),
                developer: developer.into(),
                reason: "stuck".into(),
                reported_at: now,
                status: crate::model::BlockerStatus::Active,
                resolved_at: None,
                updated_at: now,
            }],
            history: Vec::new(),
        };
        crate::store::to_document_bytes(&board).unwrap()
    }

    #[test]
    fn test_merge_conflict_is_resolved_structurally() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("ana", dir.path().join(".flowforge"), Settings::default()).unwrap();
        let vcs = FakeVcs::new(dir.path(), &["main"], "main");
        let ours = blocker_board("T1", "ana");
        let theirs = blocker_board("T2", "bo");
        vcs.script_conflict(ctx.root.join("team").join("blockers.json"), Some(&ours), Some(&theirs));

        let mut engine = SyncEngine::new(&ctx, &vcs);
        let report = engine.pull(&SyncOptions::default()).unwrap();

        assert_eq!(report.resolved, vec!["team/blockers.json".to_string()]);
        assert!(*vcs.concluded.lock().unwrap());
        let board: crate::model::BlockerBoard = engine.store().read(layout::BLOCKERS).unwrap();
        assert!(board.active_for("T1").is_some());
        assert!(board.active_for("T2").is_some());
        assert_eq!(engine.phase(), SyncPhase::Idle);
    }

    #[test]
    fn test_ambiguous_conflict_is_quarantined_and_merge_aborted() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("ana", dir.path().join(".flowforge"), Settings::default()).unwrap();
        let vcs = FakeVcs::new(dir.path(), &["main"], "main");
        vcs.script_conflict(ctx.root.join("notes.json"), Some(b"{\"a\":1}"), Some(b"{\"a\":2}"));

        let mut engine = SyncEngine::new(&ctx, &vcs);
        let err = engine.sync(&SyncOptions::default()).unwrap_err();

        assert!(matches!(err, Error::AmbiguousConflict { ref document, .. } if document == "notes.json"));
        assert_eq!(engine.phase(), SyncPhase::Resolving);
        assert!(*vcs.aborted.lock().unwrap());
        assert!(!*vcs.concluded.lock().unwrap());

        let entries = quarantine::list(engine.store()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.local, Some(serde_json::json!({"a": 1})));
        assert_eq!(entries[0].1.remote, Some(serde_json::json!({"a": 2})));
    }

    #[test]
    fn test_conflict_outside_root_aborts_merge() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("ana", dir.path().join(".flowforge"), Settings::default()).unwrap();
        let vcs = FakeVcs::new(dir.path(), &["main"], "main");
        vcs.script_conflict(dir.path().join("src").join("main.rs"), Some(b"a"), Some(b"b"));

        let mut engine = SyncEngine::new(&ctx, &vcs);
        let err = engine.pull(&SyncOptions::default()).unwrap_err();

        assert!(matches!(err, Error::Vcs { .. }));
        assert!(*vcs.aborted.lock().unwrap());
        assert_eq!(quarantine::pending(engine.store()).unwrap(), 0);
    }

    #[test]
    fn test_network_failure_commits_nothing() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("ana", dir.path().join(".flowforge"), Settings::default()).unwrap();
        let vcs = FakeVcs::new(dir.path(), &["main"], "main");
        vcs.set_dirty(true);
        vcs.fail_next_pull(Error::NetworkFailure {
            operation: "fetch".into(),
            message: "Could not resolve host".into(),
        });
        let head = vcs.head_commit().unwrap();

        let mut engine = SyncEngine::new(&ctx, &vcs);
        let err = engine.sync(&SyncOptions::default()).unwrap_err();

        assert!(matches!(err, Error::NetworkFailure { .. }));
        assert!(vcs.commits().is_empty());
        assert_eq!(vcs.head_commit().unwrap(), head);
        // Local edits are back in the working copy.
        assert!(vcs.is_dirty());
        assert!(!vcs.has_stash());
        assert!(ctx.root.join(".gitattributes").is_file());
    }

    #[test]
    fn test_stash_pop_conflict_is_resolved_and_committed() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("ana", dir.path().join(".flowforge"), Settings::default()).unwrap();
        let vcs = FakeVcs::new(dir.path(), &["main"], "main");
        vcs.set_dirty(true);
        let upstream = blocker_board("T2", "bo");
        let stashed = blocker_board("T1", "ana");
        vcs.script_stash_conflict(ctx.root.join("team").join("blockers.json"), Some(&upstream), Some(&stashed));

        let mut engine = SyncEngine::new(&ctx, &vcs);
        let report = engine.sync(&SyncOptions::default()).unwrap();

        assert_eq!(report.resolved, vec!["team/blockers.json".to_string()]);
        assert!(report.committed);
        assert!(!vcs.has_stash());
        assert_eq!(vcs.commits().len(), 1);
        let board: crate::model::BlockerBoard = engine.store().read(layout::BLOCKERS).unwrap();
        assert!(board.active_for("T1").is_some());
        assert!(board.active_for("T2").is_some());
        assert_eq!(engine.phase(), SyncPhase::Idle);
    }

    #[test]
    fn test_ambiguous_stash_pop_keeps_local_edit() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("ana", dir.path().join(".flowforge"), Settings::default()).unwrap();
        let vcs = FakeVcs::new(dir.path(), &["main"], "main");
        vcs.set_dirty(true);
        vcs.script_stash_conflict(ctx.root.join("notes.json"), Some(b"{\"a\":2}"), Some(b"{\"a\":1}"));

        let mut engine = SyncEngine::new(&ctx, &vcs);
        let err = engine.sync(&SyncOptions::default()).unwrap_err();

        assert!(matches!(err, Error::AmbiguousConflict { ref document, .. } if document == "notes.json"));
        assert_eq!(engine.phase(), SyncPhase::Resolving);
        assert!(vcs.is_dirty());
        assert!(!vcs.has_stash());
        assert!(vcs.commits().is_empty());
        assert_eq!(std::fs::read(ctx.root.join("notes.json")).unwrap(), b"{\"a\":1}");

        let entries = quarantine::list(engine.store()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.local, Some(serde_json::json!({"a": 1})));
        assert_eq!(entries[0].1.remote, Some(serde_json::json!({"a": 2})));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(SyncPhase::Resolving.to_string(), "resolving");
        assert_eq!(serde_json::to_value(SyncPhase::Pushing).unwrap(), "pushing");
    }
}
