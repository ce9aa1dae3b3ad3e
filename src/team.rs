//! Team coordination store.
//!
//! Task assignments and blockers are shared documents under `team/`. Every
//! mutation is an optimistic read-modify-write through
//! [`DocumentStore::merge`], touches only the entry for its own task, and
//! appends a history entry in the same write. Concurrent edits to different
//! tasks therefore never interfere, locally or after a sync.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;

use crate::config::{Context, validate_developer_id, validate_task_id};
use crate::error::{Error, Result};
use crate::model::{
    Blocker, BlockerBoard, BlockerStatus, HistoryEntry, TaskAssignment, TaskAssignments, TaskStatus,
    append_history,
};
use crate::namespace::layout;
use crate::store::DocumentStore;

pub struct TeamStore {
    developer_id: String,
    store: DocumentStore,
}

impl TeamStore {
    #[must_use]
    pub fn new(ctx: &Context) -> Self {
        Self {
            developer_id: ctx.developer_id.clone(),
            store: DocumentStore::new(&ctx.root),
        }
    }

    /// # Errors
    ///
    /// Returns `CorruptDocument` or `Io`.
    pub fn assignments(&self) -> Result<TaskAssignments> {
        Ok(self.store.read_opt(layout::TASK_ASSIGNMENTS)?.unwrap_or_default())
    }

    /// # Errors
    ///
    /// Returns `CorruptDocument` or `Io`.
    pub fn blockers(&self) -> Result<BlockerBoard> {
        Ok(self.store.read_opt(layout::BLOCKERS)?.unwrap_or_default())
    }

    // ── Assignments ───────────────────────────────────────────

    /// Take a task for the caller with status `in_progress`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a bad task id; store errors otherwise.
    pub fn claim(&self, task_id: &str) -> Result<TaskAssignment> {
        validate_task_id(task_id)?;
        let me = self.developer_id.clone();
        let now = Utc::now();
        let (_, assignment) = self.store.merge(layout::TASK_ASSIGNMENTS, |doc: &mut TaskAssignments| {
            let previous = doc.tasks.get(task_id).map(|a| a.assignee.clone());
            let assignment = TaskAssignment {
                assignee: me.clone(),
                claimed_at: now,
                status: TaskStatus::InProgress,
                previous_owner: previous.clone().filter(|p| *p != me),
                updated_at: now,
            };
            doc.tasks.insert(task_id.to_string(), assignment.clone());
            append_history(
                &mut doc.history,
                HistoryEntry::new("claim", &me, now, json!({ "task": task_id, "previousOwner": previous })),
            );
            Ok(assignment)
        })?;
        info!(task = task_id, "task claimed");
        Ok(assignment)
    }

    /// Transfer a task from `from` to `to`.
    ///
    /// A task nobody has claimed yet is created on the spot. Otherwise `from`
    /// must be its current assignee.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `from` does not hold the task or `from == to`.
    pub fn handoff(&self, task_id: &str, from: &str, to: &str) -> Result<TaskAssignment> {
        validate_task_id(task_id)?;
        validate_developer_id(from)?;
        validate_developer_id(to)?;
        if from == to {
            return Err(Error::InvalidArgument(format!("{task_id} is already assigned to {to}")));
        }
        let actor = self.developer_id.clone();
        let now = Utc::now();
        let (_, assignment) = self.store.merge(layout::TASK_ASSIGNMENTS, |doc: &mut TaskAssignments| {
            let claimed_at = match doc.tasks.get(task_id) {
                Some(current) if current.assignee != from => {
                    return Err(Error::InvalidArgument(format!(
                        "{task_id} is assigned to {}, not {from}",
                        current.assignee
                    )));
                }
                Some(current) => current.claimed_at,
                None => now,
            };
            let assignment = TaskAssignment {
                assignee: to.to_string(),
                claimed_at,
                status: TaskStatus::HandedOff,
                previous_owner: Some(from.to_string()),
                updated_at: now,
            };
            doc.tasks.insert(task_id.to_string(), assignment.clone());
            append_history(
                &mut doc.history,
                HistoryEntry::new("handoff", &actor, now, json!({ "task": task_id, "from": from, "to": to })),
            );
            Ok(assignment)
        })?;
        info!(task = task_id, from, to, "task handed off");
        Ok(assignment)
    }

    /// Mark a task closed.
    ///
    /// # Errors
    ///
    /// `TaskNotFound` if nobody ever claimed it.
    pub fn close(&self, task_id: &str) -> Result<TaskAssignment> {
        self.transition(task_id, "close", TaskStatus::Closed, Utc::now())
    }

    fn transition(&self, task_id: &str, action: &str, status: TaskStatus, now: DateTime<Utc>) -> Result<TaskAssignment> {
        validate_task_id(task_id)?;
        let actor = self.developer_id.clone();
        let (_, assignment) = self.store.merge(layout::TASK_ASSIGNMENTS, |doc: &mut TaskAssignments| {
            let assignment = doc.tasks.get_mut(task_id).ok_or_else(|| Error::TaskNotFound {
                id: task_id.to_string(),
            })?;
            let from = assignment.status;
            assignment.status = status;
            assignment.updated_at = now;
            let assignment = assignment.clone();
            append_history(
                &mut doc.history,
                HistoryEntry::new(action, &actor, now, json!({ "task": task_id, "from": from, "to": status })),
            );
            Ok(assignment)
        })?;
        info!(task = task_id, status = %status, "task status changed");
        Ok(assignment)
    }

    /// Move an existing assignment's status; tasks nobody claimed are left alone.
    fn follow_blocker(&self, task_id: &str, status: TaskStatus, now: DateTime<Utc>) -> Result<()> {
        let action = match status {
            TaskStatus::Blocked => "blocked",
            _ => "unblocked",
        };
        match self.transition(task_id, action, status, now) {
            Ok(_) | Err(Error::TaskNotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // ── Blockers ──────────────────────────────────────────────

    /// Report a blocker on a task for the caller.
    ///
    /// Any active blocker on the same task is resolved by this report. The
    /// task's assignment, if any, moves to `blocked`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a bad task id or an empty reason.
    pub fn report_blocker(&self, task_id: &str, reason: &str) -> Result<Blocker> {
        validate_task_id(task_id)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::InvalidArgument("blocker reason is empty".into()));
        }
        let me = self.developer_id.clone();
        let now = Utc::now();
        let (_, blocker) = self.store.merge(layout::BLOCKERS, |board: &mut BlockerBoard| {
            // Keep reports on one task strictly ordered so the newest is unambiguous.
            let latest = board
                .blockers
                .iter()
                .filter(|b| b.task == task_id)
                .map(|b| b.reported_at)
                .max();
            let reported_at = match latest {
                Some(at) if at >= now => at + chrono::Duration::microseconds(1),
                _ => now,
            };

            let mut superseded = Vec::new();
            for existing in board.blockers.iter_mut().filter(|b| b.task == task_id && b.is_active()) {
                existing.resolve(reported_at);
                superseded.push(existing.key());
            }

            let blocker = Blocker {
                task: task_id.to_string(),
                developer: me.clone(),
                reason: reason.to_string(),
                reported_at,
                status: BlockerStatus::Active,
                resolved_at: None,
                updated_at: reported_at,
            };
            board.blockers.push(blocker.clone());
            append_history(
                &mut board.history,
                HistoryEntry::new(
                    "report_blocker",
                    &me,
                    reported_at,
                    json!({ "task": task_id, "reason": reason, "superseded": superseded }),
                ),
            );
            Ok(blocker)
        })?;
        self.follow_blocker(task_id, TaskStatus::Blocked, now)?;
        info!(task = task_id, "blocker reported");
        Ok(blocker)
    }

    /// Resolve the active blocker on a task. The task's assignment, if any,
    /// moves back to `in_progress`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the task has no active blocker.
    pub fn resolve_blocker(&self, task_id: &str) -> Result<Blocker> {
        validate_task_id(task_id)?;
        let me = self.developer_id.clone();
        let now = Utc::now();
        let (_, blocker) = self.store.merge(layout::BLOCKERS, |board: &mut BlockerBoard| {
            let blocker = board
                .blockers
                .iter_mut()
                .find(|b| b.task == task_id && b.is_active())
                .ok_or_else(|| Error::TaskNotFound {
                    id: format!("{task_id} (no active blocker)"),
                })?;
            blocker.resolve(now);
            let blocker = blocker.clone();
            append_history(
                &mut board.history,
                HistoryEntry::new("resolve_blocker", &me, now, json!({ "task": task_id })),
            );
            Ok(blocker)
        })?;
        self.follow_blocker(task_id, TaskStatus::InProgress, now)?;
        info!(task = task_id, "blocker resolved");
        Ok(blocker)
    }
}
