//! Session lifecycle.
//!
//! `NoSession → Active → Ended`. A developer has at most one active session;
//! ending one seals it into history, where it never changes again. Restoring
//! a sealed session (own or a teammate's) creates a new active session that
//! points back at its source.
//!
//! Writes happen in an order that a killed process can always recover from:
//! the sealed copy goes to history before the current pointer is rewritten, and
//! the namespace manager repairs a pointer left behind.

pub mod services;

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Context, validate_task_id};
use crate::error::{Error, Result};
use crate::model::{Environment, SessionRecord};
use crate::namespace::NamespaceManager;
use crate::vcs::Vcs;

pub use services::{
    CommandTimer, LogNotifier, NoopTimer, NotificationService, SessionEvent, TimerService,
    timer_from_settings,
};

/// Which sealed session to restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreTarget {
    /// The caller's most recent sealed session.
    Latest,
    /// The most recent session for a task, own namespace first.
    Task(String),
    /// A session id from any namespace.
    Session(String),
}

impl FromStr for RestoreTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidArgument("restore target is empty".into()));
        }
        if s == "latest" {
            return Ok(Self::Latest);
        }
        if let Some(task) = s.strip_prefix("task:") {
            validate_task_id(task)?;
            return Ok(Self::Task(task.to_string()));
        }
        Ok(Self::Session(s.to_string()))
    }
}

impl fmt::Display for RestoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Task(task) => write!(f, "task:{task}"),
            Self::Session(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StartOptions {
    /// Seal an active session instead of failing with `AlreadyActive`.
    pub replace: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    pub replace: bool,
    /// Do not switch to the source session's branch.
    pub skip_branch: bool,
}

/// Snapshot for `session status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub developer_id: String,
    pub active: Option<SessionRecord>,
    pub elapsed_seconds: Option<i64>,
    pub last_ended: Option<SessionRecord>,
}

/// Creates, ends and restores the caller's sessions.
pub struct SessionManager<'a> {
    namespaces: NamespaceManager,
    project_root: String,
    vcs: Option<&'a dyn Vcs>,
    timer: &'a dyn TimerService,
    notifier: &'a dyn NotificationService,
}

impl<'a> SessionManager<'a> {
    /// `vcs` is `None` outside a git working tree; branch switching and the
    /// environment's git fields are then skipped.
    #[must_use]
    pub fn new(
        ctx: &Context,
        vcs: Option<&'a dyn Vcs>,
        timer: &'a dyn TimerService,
        notifier: &'a dyn NotificationService,
    ) -> Self {
        Self {
            namespaces: NamespaceManager::new(ctx),
            project_root: ctx.project_dir().display().to_string(),
            vcs,
            timer,
            notifier,
        }
    }

    #[must_use]
    pub fn namespaces(&self) -> &NamespaceManager {
        &self.namespaces
    }

    fn developer(&self) -> String {
        self.namespaces.developer_id().to_string()
    }

    /// Start a session, optionally tied to a task.
    ///
    /// # Errors
    ///
    /// `AlreadyActive` if a session is active and `replace` is not set.
    pub fn start(&self, task_id: Option<&str>, options: StartOptions) -> Result<SessionRecord> {
        if let Some(task) = task_id {
            validate_task_id(task)?;
        }
        let developer = self.developer();
        let now = Utc::now();
        self.namespaces.ensure(&developer, now)?;
        self.take_over_active(options.replace)?;

        let session = SessionRecord::start(&developer, task_id, self.environment()?, now);
        self.namespaces.save_current(&session)?;
        info!(session = %session.session_id, task = ?session.task_id, "session started");

        if let Some(task) = task_id {
            self.best_effort_timer(TimerAction::Start, task);
        }
        self.best_effort_notify(&SessionEvent::Started {
            session_id: session.session_id.clone(),
            task_id: session.task_id.clone(),
        });
        Ok(session)
    }

    /// Seal the active session.
    ///
    /// # Errors
    ///
    /// `NoActiveSession` if there is nothing to end.
    pub fn end(&self) -> Result<SessionRecord> {
        let developer = self.developer();
        let active = self
            .namespaces
            .active_session(&developer)?
            .ok_or(Error::NoActiveSession { developer })?;
        self.seal(active)
    }

    fn seal(&self, mut session: SessionRecord) -> Result<SessionRecord> {
        session.seal(Utc::now());
        self.namespaces.archive_session(&session)?;
        self.namespaces.record_time(&session)?;
        self.namespaces.save_current(&session)?;
        info!(
            session = %session.session_id,
            seconds = session.duration().num_seconds(),
            "session ended"
        );

        if let Some(task) = session.task_id.as_deref() {
            self.best_effort_timer(TimerAction::Stop, task);
        }
        self.best_effort_notify(&SessionEvent::Ended {
            session_id: session.session_id.clone(),
            task_id: session.task_id.clone(),
            seconds: session.duration().num_seconds(),
        });
        Ok(session)
    }

    fn take_over_active(&self, replace: bool) -> Result<()> {
        if let Some(active) = self.namespaces.active_session(&self.developer())? {
            if !replace {
                return Err(Error::AlreadyActive {
                    session_id: active.session_id,
                });
            }
            debug!(session = %active.session_id, "sealing active session before replacing it");
            self.seal(active)?;
        }
        Ok(())
    }

    /// Continue a sealed session as a new active one.
    ///
    /// Nothing is written if the source's branch is missing locally.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` if the target does not resolve
    /// - `AlreadyActive` if a session is active and `replace` is not set
    /// - `BranchNotFound` if the source's branch does not exist locally
    pub fn restore(&self, target: &RestoreTarget, options: RestoreOptions) -> Result<SessionRecord> {
        let developer = self.developer();
        let source = match target {
            RestoreTarget::Latest => self.namespaces.find_latest_session()?,
            RestoreTarget::Task(task) => self.namespaces.find_session_by_task(task)?,
            RestoreTarget::Session(id) => self.namespaces.find_session_by_id(id)?,
        };

        if let Some(active) = self.namespaces.active_session(&developer)? {
            if !options.replace {
                return Err(Error::AlreadyActive {
                    session_id: active.session_id,
                });
            }
        }
        if !source.is_sealed() {
            return Err(Error::InvalidArgument(format!(
                "session {} is still active; only ended sessions can be restored",
                source.session_id
            )));
        }

        if !options.skip_branch {
            self.switch_branch(&source)?;
        }

        let now = Utc::now();
        self.namespaces.ensure(&developer, now)?;
        self.take_over_active(options.replace)?;

        let session = SessionRecord::restored_from(&source, &developer, self.environment()?, now);
        self.namespaces.save_current(&session)?;
        info!(
            session = %session.session_id,
            restored_from = %source.session_id,
            "session restored"
        );

        if let Some(task) = session.task_id.as_deref() {
            self.best_effort_timer(TimerAction::Start, task);
        }
        self.best_effort_notify(&SessionEvent::Restored {
            session_id: session.session_id.clone(),
            restored_from: source.session_id.clone(),
            task_id: session.task_id.clone(),
        });
        Ok(session)
    }

    fn switch_branch(&self, source: &SessionRecord) -> Result<()> {
        let Some(branch) = source.environment.git_branch.as_deref() else {
            return Ok(());
        };
        let Some(vcs) = self.vcs else {
            warn!(branch, "not in a git working tree, branch not switched");
            return Ok(());
        };
        if vcs.current_branch()?.as_deref() == Some(branch) {
            return Ok(());
        }
        // Never fetched implicitly.
        if !vcs.branch_exists(branch)? {
            return Err(Error::BranchNotFound {
                branch: branch.to_string(),
            });
        }
        vcs.checkout(branch)?;
        info!(branch, "switched branch");
        Ok(())
    }

    /// Active session and the most recent ended one.
    ///
    /// # Errors
    ///
    /// Returns `CorruptDocument` or `Io`.
    pub fn status(&self) -> Result<SessionStatus> {
        let developer = self.developer();
        let active = self.namespaces.active_session(&developer)?;
        let elapsed_seconds = active
            .as_ref()
            .map(|s| (Utc::now() - s.start_time).num_seconds().max(0));
        let last_ended = match self.namespaces.list_session_history(&developer)?.next() {
            Some(session) => Some(session?),
            None => None,
        };
        Ok(SessionStatus {
            developer_id: developer,
            active,
            elapsed_seconds,
            last_ended,
        })
    }

    /// Up to `limit` sealed sessions of the caller, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CorruptDocument` or `Io`.
    pub fn list(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        self.namespaces
            .list_session_history(&self.developer())?
            .take(limit)
            .collect()
    }

    fn environment(&self) -> Result<Environment> {
        let (git_branch, git_commit) = match self.vcs {
            Some(vcs) => (vcs.current_branch()?, vcs.head_commit()?),
            None => (None, None),
        };
        Ok(Environment {
            git_branch,
            git_commit,
            project_root: Some(self.project_root.clone()),
        })
    }

    fn best_effort_timer(&self, action: TimerAction, task: &str) {
        let result = match action {
            TimerAction::Start => self.timer.start(task),
            TimerAction::Stop => self.timer.stop(task),
        };
        if let Err(e) = result {
            warn!(task, action = ?action, error = %e, "timer call failed");
        }
    }

    fn best_effort_notify(&self, event: &SessionEvent) {
        if let Err(e) = self.notifier.notify(event) {
            warn!(error = %e, "notification failed");
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TimerAction {
    Start,
    Stop,
}
