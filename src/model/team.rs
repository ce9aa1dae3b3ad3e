//! Shared team documents: task assignments and blockers.
//!
//! Both documents are owned collectively. Entries are never deleted, only
//! status-transitioned, and every transition is mirrored in the document's
//! append-only `history`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::HistoryEntry;

/// Lifecycle state of a task assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProgress,
    Blocked,
    HandedOff,
    Closed,
}

impl TaskStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::HandedOff => "handed_off",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "blocked" => Ok(Self::Blocked),
            "handed_off" => Ok(Self::HandedOff),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Unknown task status: {s}")),
        }
    }
}

/// Current owner of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssignment {
    pub assignee: String,
    pub claimed_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub previous_owner: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// `team/task-assignments.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignments {
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskAssignment>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Whether a blocker still obstructs its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerStatus {
    Active,
    Resolved,
}

impl fmt::Display for BlockerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Resolved => f.write_str("resolved"),
        }
    }
}

/// A reported obstruction on a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blocker {
    pub task: String,
    pub developer: String,
    pub reason: String,
    pub reported_at: DateTime<Utc>,
    pub status: BlockerStatus,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Blocker {
    /// Identity of a report: who reported which task when.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.task, self.developer, self.reported_at.to_rfc3339())
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == BlockerStatus::Active
    }

    /// Transition to `resolved` at `at`.
    pub fn resolve(&mut self, at: DateTime<Utc>) {
        if self.is_active() {
            self.status = BlockerStatus::Resolved;
            self.resolved_at = Some(at);
            self.updated_at = self.updated_at.max(at);
        }
    }
}

/// `team/blockers.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockerBoard {
    #[serde(default)]
    pub blockers: Vec<Blocker>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl BlockerBoard {
    /// The active blocker for `task`, if any.
    #[must_use]
    pub fn active_for(&self, task: &str) -> Option<&Blocker> {
        self.blockers.iter().find(|b| b.task == task && b.is_active())
    }

    /// All active blockers, oldest report first.
    #[must_use]
    pub fn active(&self) -> Vec<&Blocker> {
        let mut active: Vec<&Blocker> = self.blockers.iter().filter(|b| b.is_active()).collect();
        active.sort_by_key(|b| b.reported_at);
        active
    }
}
