//! Version-control substrate.
//!
//! The sync engine never talks to git directly; it goes through the [`Vcs`]
//! trait so the working tree, remote and branch operations can be swapped
//! out. [`GitCli`] is the production implementation and shells out to `git`.
//!
//! All paths crossing this interface are absolute.

pub mod git;

#[cfg(test)]
pub(crate) mod fake;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;

pub use git::GitCli;

/// Read-only snapshot of the working copy relative to its upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VcsStatus {
    /// Uncommitted changes (tracked or untracked) inside the queried scope.
    pub dirty: bool,
    /// Local commits not on the upstream.
    pub ahead: u32,
    /// Upstream commits not yet integrated (as of the last fetch).
    pub behind: u32,
    pub has_remote: bool,
    pub branch: Option<String>,
    pub upstream: Option<String>,
}

/// How fetched upstream history is integrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PullStrategy {
    Rebase,
    Merge,
}

/// Result of integrating upstream history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum PullOutcome {
    /// Nothing to integrate.
    UpToDate,
    /// The branch has no upstream yet (first push pending).
    NoUpstream,
    /// Upstream integrated with the given strategy.
    Applied { strategy: PullStrategy },
    /// A merge is in progress with these unmerged paths.
    Conflicted { paths: Vec<PathBuf> },
}

/// Result of re-applying stashed changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StashPop {
    Clean,
    /// The stash is still recorded; these paths are unmerged.
    Conflicted { paths: Vec<PathBuf> },
}

/// Index stage of an unmerged path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Base = 1,
    Ours = 2,
    Theirs = 3,
}

/// Operations the sync engine and session manager need from version control.
pub trait Vcs {
    /// Top-level directory of the working tree.
    fn workdir(&self) -> &Path;

    /// Working copy status. `dirty` only considers paths under `scope`.
    ///
    /// # Errors
    ///
    /// Returns `Vcs` on git failure.
    fn status(&self, scope: &Path) -> Result<VcsStatus>;

    /// Fetch and integrate the upstream.
    ///
    /// Rebase is attempted first when `strategy` is `Rebase`; if it stops on a
    /// conflict it is aborted and a three-way merge is attempted instead. A
    /// merge that stops on conflicts is left in progress and reported as
    /// `Conflicted`.
    ///
    /// # Errors
    ///
    /// `NetworkFailure` if fetching fails (nothing is modified), `Vcs` otherwise.
    fn pull(&self, strategy: PullStrategy) -> Result<PullOutcome>;

    /// Push the current branch, setting its upstream if needed. Never forces.
    ///
    /// # Errors
    ///
    /// `NonFastForward` if the remote moved, `NetworkFailure` on transport errors.
    fn push(&self) -> Result<()>;

    /// Stash all changes under `scope`, including new files.
    /// Returns `false` if there was nothing to stash.
    ///
    /// # Errors
    ///
    /// Returns `Vcs` on git failure.
    fn stash(&self, scope: &Path) -> Result<bool>;

    /// Re-apply the most recent stash.
    ///
    /// # Errors
    ///
    /// Returns `Vcs` if the pop fails for a reason other than conflicts.
    fn stash_pop(&self) -> Result<StashPop>;

    /// Drop the most recent stash (after a conflicted pop was resolved).
    ///
    /// # Errors
    ///
    /// Returns `Vcs` on git failure.
    fn stash_drop(&self) -> Result<()>;

    /// Commit everything under `paths`. Returns `false` if there was nothing to commit.
    ///
    /// # Errors
    ///
    /// Returns `Vcs` on git failure.
    fn commit(&self, message: &str, paths: &[&Path]) -> Result<bool>;

    /// Content of an unmerged path at `stage`; `None` if that side has no such file.
    ///
    /// # Errors
    ///
    /// Returns `Vcs` on git failure.
    fn read_stage(&self, path: &Path, stage: Stage) -> Result<Option<Vec<u8>>>;

    /// Stage resolved paths.
    ///
    /// # Errors
    ///
    /// Returns `Vcs` on git failure.
    fn mark_resolved(&self, paths: &[&Path]) -> Result<()>;

    /// Reset index entries for `paths` to `HEAD`, keeping the working files.
    ///
    /// # Errors
    ///
    /// Returns `Vcs` on git failure.
    fn unstage(&self, paths: &[&Path]) -> Result<()>;

    /// Record the in-progress merge as a commit.
    ///
    /// # Errors
    ///
    /// Returns `Vcs` on git failure.
    fn conclude_merge(&self, message: &str) -> Result<()>;

    /// Abandon the in-progress merge, restoring the pre-merge state.
    ///
    /// # Errors
    ///
    /// Returns `Vcs` on git failure.
    fn abort_merge(&self) -> Result<()>;

    /// Switch to an existing local branch.
    ///
    /// # Errors
    ///
    /// `BranchNotFound` if it does not exist locally, `Vcs` otherwise.
    fn checkout(&self, branch: &str) -> Result<()>;

    /// Create `name` from `base` without switching to it.
    ///
    /// # Errors
    ///
    /// Returns `Vcs` on git failure.
    fn create_branch(&self, name: &str, base: &str) -> Result<()>;

    /// Whether a local branch exists.
    ///
    /// # Errors
    ///
    /// Returns `Vcs` on git failure.
    fn branch_exists(&self, name: &str) -> Result<bool>;

    /// Current branch, `None` when detached or unborn.
    ///
    /// # Errors
    ///
    /// Returns `Vcs` on git failure.
    fn current_branch(&self) -> Result<Option<String>>;

    /// `HEAD` commit id, `None` before the first commit.
    ///
    /// # Errors
    ///
    /// Returns `Vcs` on git failure.
    fn head_commit(&self) -> Result<Option<String>>;
}
