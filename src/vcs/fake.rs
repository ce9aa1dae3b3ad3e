//! In-memory `Vcs` for unit tests: branches, a dirty flag, a commit log,
//! a stash and scripted pull outcomes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{PullOutcome, PullStrategy, Stage, StashPop, Vcs, VcsStatus};
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct FakeVcs {
    workdir: PathBuf,
    pub branches: Mutex<Vec<String>>,
    pub current: Mutex<Option<String>>,
    pub checkouts: Mutex<Vec<String>>,
    /// Unmerged paths the next `pull` reports, with their stage contents.
    conflicts: Mutex<Vec<PathBuf>>,
    /// Unmerged paths the next `stash_pop` reports.
    pop_conflicts: Mutex<Vec<PathBuf>>,
    stages: Mutex<HashMap<(PathBuf, u8), Vec<u8>>>,
    pull_failure: Mutex<Option<Error>>,
    dirty: Mutex<bool>,
    stashed: Mutex<bool>,
    commits: Mutex<Vec<String>>,
    pub aborted: Mutex<bool>,
    pub concluded: Mutex<bool>,
}

impl FakeVcs {
    pub fn new(workdir: &Path, branches: &[&str], current: &str) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            branches: Mutex::new(branches.iter().map(ToString::to_string).collect()),
            current: Mutex::new(Some(current.to_string())),
            checkouts: Mutex::default(),
            conflicts: Mutex::default(),
            pop_conflicts: Mutex::default(),
            stages: Mutex::default(),
            pull_failure: Mutex::default(),
            dirty: Mutex::new(false),
            stashed: Mutex::new(false),
            commits: Mutex::default(),
            aborted: Mutex::new(false),
            concluded: Mutex::new(false),
        }
    }

    /// Make the next `pull` stop on a conflict at `path`.
    pub fn script_conflict(&self, path: PathBuf, ours: Option<&[u8]>, theirs: Option<&[u8]>) {
        let mut stages = self.stages.lock().unwrap();
        if let Some(ours) = ours {
            stages.insert((path.clone(), Stage::Ours as u8), ours.to_vec());
        }
        if let Some(theirs) = theirs {
            stages.insert((path.clone(), Stage::Theirs as u8), theirs.to_vec());
        }
        self.conflicts.lock().unwrap().push(path);
    }

    /// Make the next `stash_pop` stop on a conflict at `path`. During a pop
    /// "ours" is the integrated upstream and "theirs" is the stashed edit.
    pub fn script_stash_conflict(&self, path: PathBuf, upstream: Option<&[u8]>, stashed: Option<&[u8]>) {
        let mut stages = self.stages.lock().unwrap();
        if let Some(upstream) = upstream {
            stages.insert((path.clone(), Stage::Ours as u8), upstream.to_vec());
        }
        if let Some(stashed) = stashed {
            stages.insert((path.clone(), Stage::Theirs as u8), stashed.to_vec());
        }
        self.pop_conflicts.lock().unwrap().push(path);
    }

    /// Make the next `pull` fail with `error`.
    pub fn fail_next_pull(&self, error: Error) {
        *self.pull_failure.lock().unwrap() = Some(error);
    }

    pub fn set_dirty(&self, dirty: bool) {
        *self.dirty.lock().unwrap() = dirty;
    }

    pub fn is_dirty(&self) -> bool {
        *self.dirty.lock().unwrap()
    }

    pub fn has_stash(&self) -> bool {
        *self.stashed.lock().unwrap()
    }

    pub fn commits(&self) -> Vec<String> {
        self.commits.lock().unwrap().clone()
    }

    pub fn checkouts(&self) -> Vec<String> {
        self.checkouts.lock().unwrap().clone()
    }
}

impl Vcs for FakeVcs {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn status(&self, _scope: &Path) -> Result<VcsStatus> {
        Ok(VcsStatus {
            dirty: self.is_dirty(),
            ahead: u32::try_from(self.commits.lock().unwrap().len()).unwrap_or(u32::MAX),
            branch: self.current.lock().unwrap().clone(),
            ..VcsStatus::default()
        })
    }

    fn pull(&self, _strategy: PullStrategy) -> Result<PullOutcome> {
        if let Some(error) = self.pull_failure.lock().unwrap().take() {
            return Err(error);
        }
        let paths = std::mem::take(&mut *self.conflicts.lock().unwrap());
        if paths.is_empty() {
            Ok(PullOutcome::NoUpstream)
        } else {
            Ok(PullOutcome::Conflicted { paths })
        }
    }

    fn push(&self) -> Result<()> {
        Ok(())
    }

    fn stash(&self, _scope: &Path) -> Result<bool> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.set_dirty(false);
        *self.stashed.lock().unwrap() = true;
        Ok(true)
    }

    fn stash_pop(&self) -> Result<StashPop> {
        if !self.has_stash() {
            return Err(Error::Vcs {
                command: "stash".to_string(),
                message: "No stash entries found.".to_string(),
            });
        }
        self.set_dirty(true);
        let paths = std::mem::take(&mut *self.pop_conflicts.lock().unwrap());
        if paths.is_empty() {
            *self.stashed.lock().unwrap() = false;
            Ok(StashPop::Clean)
        } else {
            // A conflicted pop keeps the stash entry.
            Ok(StashPop::Conflicted { paths })
        }
    }

    fn stash_drop(&self) -> Result<()> {
        *self.stashed.lock().unwrap() = false;
        Ok(())
    }

    fn commit(&self, message: &str, _paths: &[&Path]) -> Result<bool> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.set_dirty(false);
        self.commits.lock().unwrap().push(message.to_string());
        Ok(true)
    }

    fn read_stage(&self, path: &Path, stage: Stage) -> Result<Option<Vec<u8>>> {
        Ok(self.stages.lock().unwrap().get(&(path.to_path_buf(), stage as u8)).cloned())
    }

    fn mark_resolved(&self, _paths: &[&Path]) -> Result<()> {
        Ok(())
    }

    fn unstage(&self, _paths: &[&Path]) -> Result<()> {
        Ok(())
    }

    fn conclude_merge(&self, _message: &str) -> Result<()> {
        *self.concluded.lock().unwrap() = true;
        Ok(())
    }

    fn abort_merge(&self) -> Result<()> {
        *self.aborted.lock().unwrap() = true;
        Ok(())
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        if !self.branch_exists(branch)? {
            return Err(Error::BranchNotFound {
                branch: branch.to_string(),
            });
        }
        *self.current.lock().unwrap() = Some(branch.to_string());
        self.checkouts.lock().unwrap().push(branch.to_string());
        Ok(())
    }

    fn create_branch(&self, name: &str, _base: &str) -> Result<()> {
        self.branches.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.branches.lock().unwrap().iter().any(|b| b == name))
    }

    fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.current.lock().unwrap().clone())
    }

    fn head_commit(&self) -> Result<Option<String>> {
        Ok(Some(format!("{:040x}", self.commits.lock().unwrap().len())))
    }
}
