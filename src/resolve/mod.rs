//! Conflict resolver.
//!
//! Given the local and remote versions of one diverged document, produce the
//! reconciled document. The policy is picked from the document's path:
//!
//! | Document | Policy |
//! |---|---|
//! | profile | last-writer-wins on `updatedAt`; monotonic fields folded |
//! | current session | newest session wins; an active loser is sealed and displaced |
//! | session history | last-writer-wins on `updatedAt` |
//! | time tracking | union of entries keyed by session id |
//! | task assignments | per-task last-writer-wins; history union |
//! | blockers | per-blocker last-writer-wins; history union; one active per task |
//!
//! Anything the policies cannot decide becomes `AmbiguousConflict`; the caller
//! quarantines both versions.

pub mod policy;
pub mod quarantine;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Blocker, BlockerBoard, HistoryEntry, Profile, SessionRecord, TaskAssignments, TimeSheet};
use crate::namespace::layout::DocumentPath;
use crate::store::{parse, to_document_bytes};

use policy::{Tie, Winner, last_writer_wins, merge_keyed, union_by_key, union_last_writer_wins};

pub use quarantine::QuarantineEntry;

/// Reconciled document plus side effects the caller must persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Bytes to write at the document's path.
    pub content: Vec<u8>,
    /// Sessions that lost a current-session conflict, already sealed. They
    /// belong in the owner's session history.
    pub displaced: Vec<SessionRecord>,
}

impl Resolution {
    fn document<T: serde::Serialize>(doc: &T) -> Result<Self> {
        Ok(Self {
            content: to_document_bytes(doc)?,
            displaced: Vec::new(),
        })
    }
}

/// Reconcile two versions of the document at `rel`.
///
/// A side that is `None` did not have the document; the other side is taken
/// as-is.
///
/// # Errors
///
/// - `AmbiguousConflict` when a policy cannot decide
/// - `CorruptDocument` when either side does not parse
pub fn resolve(rel: &str, local: Option<&[u8]>, remote: Option<&[u8]>) -> Result<Resolution> {
    let (local, remote) = match (local, remote) {
        (Some(l), Some(r)) if l == r => return Ok(take(l)),
        (Some(l), Some(r)) => (l, r),
        (Some(only), None) | (None, Some(only)) => return Ok(take(only)),
        (None, None) => {
            return Err(Error::Other(format!("{rel}: no version to resolve")));
        }
    };

    debug!(document = rel, "resolving diverged document");
    let ambiguous = |tie: Tie| Error::AmbiguousConflict {
        document: rel.to_string(),
        key: tie.key,
    };

    match DocumentPath::parse(rel) {
        Some(DocumentPath::Profile { .. }) => {
            let merged = resolve_profile(decode(rel, local)?, decode(rel, remote)?);
            Resolution::document(&merged)
        }
        Some(DocumentPath::CurrentSession { .. }) => {
            resolve_current_session(rel, decode(rel, local)?, decode(rel, remote)?)
        }
        Some(DocumentPath::SessionHistory { session_id, .. }) => {
            let local: SessionRecord = decode(rel, local)?;
            let remote: SessionRecord = decode(rel, remote)?;
            let winner = match last_writer_wins(&local, &remote, &session_id, |s| s.updated_at)
                .map_err(ambiguous)?
            {
                Winner::Local => local,
                Winner::Remote => remote,
            };
            Resolution::document(&winner)
        }
        Some(DocumentPath::TimeSheet { .. }) => {
            let merged = resolve_timesheet(decode(rel, local)?, decode(rel, remote)?).map_err(ambiguous)?;
            Resolution::document(&merged)
        }
        Some(DocumentPath::TaskAssignments) => {
            let merged =
                resolve_assignments(decode(rel, local)?, decode(rel, remote)?).map_err(ambiguous)?;
            Resolution::document(&merged)
        }
        Some(DocumentPath::Blockers) => {
            let merged = resolve_blockers(decode(rel, local)?, decode(rel, remote)?).map_err(ambiguous)?;
            Resolution::document(&merged)
        }
        None => Err(ambiguous(Tie::new(rel))),
    }
}

fn take(bytes: &[u8]) -> Resolution {
    Resolution {
        content: bytes.to_vec(),
        displaced: Vec::new(),
    }
}

fn decode<T: DeserializeOwned>(rel: &str, bytes: &[u8]) -> Result<T> {
    parse(&PathBuf::from(rel), bytes)
}

// ── Single-owner documents ────────────────────────────────────

/// Last writer wins, but timestamps that only ever move one way are folded
/// from both sides so neither replica can move them backwards.
#[must_use]
pub fn resolve_profile(local: Profile, remote: Profile) -> Profile {
    let created_at = local.created_at.min(remote.created_at);
    let last_synced = local.last_synced.max(remote.last_synced);
    let migrated_at = local.migrated_at.max(remote.migrated_at);
    let updated_at = local.updated_at.max(remote.updated_at);

    let mut winner = if remote.updated_at > local.updated_at { remote } else { local };
    winner.created_at = created_at;
    winner.last_synced = last_synced;
    winner.migrated_at = migrated_at;
    winner.updated_at = updated_at;
    winner
}

fn resolve_current_session(rel: &str, local: SessionRecord, remote: SessionRecord) -> Result<Resolution> {
    if local.session_id == remote.session_id {
        let winner = match last_writer_wins(&local, &remote, &local.session_id, |s| s.updated_at) {
            Ok(Winner::Local) => local,
            Ok(Winner::Remote) => remote,
            // Sealing is terminal: of two same-stamp copies, the sealed one is newer.
            Err(_) if local.is_sealed() != remote.is_sealed() => {
                if local.is_sealed() { local } else { remote }
            }
            Err(tie) => {
                return Err(Error::AmbiguousConflict {
                    document: rel.to_string(),
                    key: tie.key,
                });
            }
        };
        return Resolution::document(&winner);
    }

    // Two different sessions: the one started last is current.
    let local_order = (local.start_time, local.session_id.clone());
    let remote_order = (remote.start_time, remote.session_id.clone());
    let (winner, mut loser) = if remote_order > local_order {
        (remote, local)
    } else {
        (local, remote)
    };
    let mut resolution = Resolution::document(&winner)?;
    if !loser.is_sealed() {
        debug!(session = %loser.session_id, by = %winner.session_id, "session displaced");
        loser.seal(winner.start_time);
        resolution.displaced.push(loser);
    }
    Ok(resolution)
}

// ── Append-only and shared documents ──────────────────────────

fn history_key(entry: &HistoryEntry) -> String {
    format!(
        "{}|{}|{}",
        entry.action,
        entry.actor,
        entry.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
    )
}

fn merge_history(local: Vec<HistoryEntry>, remote: Vec<HistoryEntry>) -> std::result::Result<Vec<HistoryEntry>, Tie> {
    union_by_key(local, remote, history_key, |e| e.timestamp)
}

/// Union of entries keyed by session id.
///
/// # Errors
///
/// Returns `Tie` if one session carries different time on the two sides.
pub fn resolve_timesheet(local: TimeSheet, remote: TimeSheet) -> std::result::Result<TimeSheet, Tie> {
    let entries = union_by_key(
        local.entries,
        remote.entries,
        |e| e.session_id.clone(),
        |e| e.started_at,
    )?;
    Ok(TimeSheet {
        period: local.period,
        entries,
    })
}

/// Per-task last-writer-wins plus history union.
///
/// # Errors
///
/// Returns `Tie` for a task edited on both sides at the same instant.
pub fn resolve_assignments(
    local: TaskAssignments,
    remote: TaskAssignments,
) -> std::result::Result<TaskAssignments, Tie> {
    Ok(TaskAssignments {
        tasks: merge_keyed(local.tasks, remote.tasks, |a| a.updated_at)?,
        history: merge_history(local.history, remote.history)?,
    })
}

/// Per-blocker last-writer-wins plus history union, then at most one active
/// blocker per task: older active reports are superseded by the newest.
///
/// # Errors
///
/// Returns `Tie` for a blocker edited on both sides at the same instant, or
/// for two different active reports on one task at the same instant.
pub fn resolve_blockers(local: BlockerBoard, remote: BlockerBoard) -> std::result::Result<BlockerBoard, Tie> {
    let mut blockers = union_last_writer_wins(
        local.blockers,
        remote.blockers,
        Blocker::key,
        |b| b.updated_at,
        |b| b.reported_at,
    )?;
    supersede_stale_blockers(&mut blockers)?;
    Ok(BlockerBoard {
        blockers,
        history: merge_history(local.history, remote.history)?,
    })
}

fn supersede_stale_blockers(blockers: &mut [Blocker]) -> std::result::Result<(), Tie> {
    let mut newest: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
    for b in blockers.iter().filter(|b| b.is_active()) {
        let at = newest.entry(b.task.clone()).or_insert(b.reported_at);
        *at = (*at).max(b.reported_at);
    }

    let mut winners: BTreeMap<String, String> = BTreeMap::new();
    for b in blockers.iter().filter(|b| b.is_active()) {
        if newest.get(&b.task) == Some(&b.reported_at) && winners.insert(b.task.clone(), b.key()).is_some() {
            return Err(Tie::new(b.task.clone()));
        }
    }

    for b in blockers.iter_mut().filter(|b| b.is_active()) {
        if winners.get(&b.task).is_some_and(|key| *key != b.key()) {
            if let Some(at) = newest.get(&b.task) {
                b.resolve(*at);
            }
        }
    }
    Ok(())
}
