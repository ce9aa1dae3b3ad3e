//! `git` command-line implementation of [`Vcs`].
//!
//! Every invocation runs at the top of the working tree with a fixed locale
//! (so stderr can be classified) and with terminal prompts disabled (so a
//! credential prompt turns into a failure instead of a hang). Failures caused
//! by another git process holding `index.lock` / ref locks are retried with
//! bounded exponential backoff.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::{PullOutcome, PullStrategy, Stage, StashPop, Vcs, VcsStatus};
use crate::config::Settings;
use crate::error::{Error, Result};

const STASH_MESSAGE: &str = "ff: autostash before sync";

/// Captured result of one git invocation.
#[derive(Debug)]
struct GitOutput {
    success: bool,
    stdout: Vec<u8>,
    stderr: String,
}

impl GitOutput {
    fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

/// Shells out to the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
    remote: String,
    lock_retries: u32,
    lock_backoff: Duration,
}

impl GitCli {
    /// Build for an already-resolved working tree top.
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self {
            workdir: workdir.into(),
            remote: settings.remote.clone(),
            lock_retries: settings.lock_retries,
            lock_backoff: Duration::from_millis(settings.lock_backoff_ms),
        }
    }

    /// Locate the working tree containing `start`.
    ///
    /// # Errors
    ///
    /// Returns `NotARepository` if `start` is not inside a git working tree.
    /// `start` need not exist; the search begins at its nearest existing ancestor.
    pub fn discover(start: &Path, settings: &Settings) -> Result<Self> {
        // The namespace root may not exist before its first write.
        let dir = start.ancestors().find(|p| p.is_dir()).unwrap_or(start);
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(dir)
            .env("LC_ALL", "C")
            .output()
            .map_err(|e| Error::io(start, e))?;

        if !output.status.success() {
            return Err(Error::NotARepository {
                path: start.to_path_buf(),
            });
        }
        let top = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Self::new(PathBuf::from(top), settings))
    }

    #[must_use]
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Run git, retrying while a lock file is held by another process.
    fn run(&self, args: &[&str]) -> Result<GitOutput> {
        let mut backoff = self.lock_backoff;
        let mut attempt = 0;
        loop {
            debug!(args = ?args, "git");
            let output = Command::new("git")
                .arg("-c")
                .arg("core.quotepath=off")
                .args(args)
                .current_dir(&self.workdir)
                .env("LC_ALL", "C")
                .env("GIT_TERMINAL_PROMPT", "0")
                .output()
                .map_err(|e| Error::io(&self.workdir, e))?;

            let out = GitOutput {
                success: output.status.success(),
                stdout: output.stdout,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            };

            if !out.success && is_lock_contention(&out.stderr) && attempt < self.lock_retries {
                attempt += 1;
                warn!(attempt, wait_ms = backoff.as_millis(), "git lock held by another process, retrying");
                thread::sleep(backoff);
                backoff = backoff.saturating_mul(2);
                continue;
            }
            return Ok(out);
        }
    }

    /// Run git and require success.
    fn git(&self, args: &[&str]) -> Result<GitOutput> {
        let out = self.run(args)?;
        if out.success {
            Ok(out)
        } else {
            Err(vcs_error(args, &out.stderr))
        }
    }

    /// Pathspec for `path`, relative to the working tree top.
    fn pathspec(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.workdir).unwrap_or(path);
        let spec = rel.to_string_lossy().replace('\\', "/");
        if spec.is_empty() { ".".to_string() } else { spec }
    }

    fn pathspecs(&self, paths: &[&Path]) -> Vec<String> {
        paths.iter().map(|p| self.pathspec(p)).collect()
    }

    fn has_remote(&self) -> Result<bool> {
        let out = self.git(&["remote"])?;
        Ok(out.stdout_str().lines().any(|r| r.trim() == self.remote))
    }

    /// Upstream ref of the current branch, wiring it up if the remote branch
    /// exists but tracking was never configured.
    fn upstream(&self) -> Result<Option<String>> {
        let out = self.run(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])?;
        if out.success {
            return Ok(Some(out.stdout_str()));
        }

        let Some(branch) = self.current_branch()? else {
            return Ok(None);
        };
        let remote_ref = format!("refs/remotes/{}/{branch}", self.remote);
        if !self.run(&["rev-parse", "--verify", "--quiet", &remote_ref])?.success {
            return Ok(None);
        }
        let tracking = format!("{}/{branch}", self.remote);
        self.git(&["branch", "--set-upstream-to", &tracking])?;
        Ok(Some(tracking))
    }

    fn unmerged_paths(&self) -> Result<Vec<PathBuf>> {
        let out = self.git(&["diff", "--name-only", "--diff-filter=U"])?;
        let mut paths: Vec<PathBuf> = out
            .stdout_str()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| self.workdir.join(l.trim()))
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    fn merge_upstream(&self, upstream: &str) -> Result<PullOutcome> {
        let out = self.run(&["merge", "--no-edit", upstream])?;
        if out.success {
            return Ok(PullOutcome::Applied {
                strategy: PullStrategy::Merge,
            });
        }

        let paths = self.unmerged_paths()?;
        if paths.is_empty() {
            let _ = self.run(&["merge", "--abort"]);
            return Err(vcs_error(&["merge", upstream], &out.stderr));
        }
        debug!(count = paths.len(), "merge stopped on conflicts");
        Ok(PullOutcome::Conflicted { paths })
    }
}

impl Vcs for GitCli {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn status(&self, scope: &Path) -> Result<VcsStatus> {
        let scope = self.pathspec(scope);
        let out = self.git(&[
            "status",
            "--porcelain=v2",
            "--branch",
            "--untracked-files=all",
            "--",
            &scope,
        ])?;

        let mut status = parse_porcelain_v2(&out.stdout_str());
        status.has_remote = self.has_remote()?;
        if status.upstream.is_none() && self.head_commit()?.is_some() {
            // Nothing published yet: every local commit is ahead.
            let count = self.git(&["rev-list", "--count", "HEAD"])?.stdout_str();
            status.ahead = count.parse().unwrap_or(0);
        }
        Ok(status)
    }

    fn pull(&self, strategy: PullStrategy) -> Result<PullOutcome> {
        if !self.has_remote()? {
            return Ok(PullOutcome::NoUpstream);
        }

        let fetch = self.run(&["fetch", "--quiet", &self.remote])?;
        if !fetch.success {
            return Err(Error::NetworkFailure {
                operation: "fetch".to_string(),
                message: fetch.stderr,
            });
        }

        let Some(upstream) = self.upstream()? else {
            return Ok(PullOutcome::NoUpstream);
        };

        if self.head_commit()?.is_some() {
            let range = format!("HEAD..{upstream}");
            let behind = self.git(&["rev-list", "--count", &range])?.stdout_str();
            if behind == "0" {
                return Ok(PullOutcome::UpToDate);
            }
        }

        if strategy == PullStrategy::Rebase {
            let rebase = self.run(&["rebase", "--quiet", &upstream])?;
            if rebase.success {
                return Ok(PullOutcome::Applied {
                    strategy: PullStrategy::Rebase,
                });
            }
            warn!(stderr = %rebase.stderr, "rebase failed, falling back to three-way merge");
            let _ = self.run(&["rebase", "--abort"]);
        }

        self.merge_upstream(&upstream)
    }

    fn push(&self) -> Result<()> {
        let Some(branch) = self.current_branch()? else {
            return Err(Error::Vcs {
                command: "push".to_string(),
                message: "HEAD is detached".to_string(),
            });
        };

        let out = self.run(&["push", "--quiet", "-u", &self.remote, &branch])?;
        if out.success {
            return Ok(());
        }
        Err(classify_push_failure(&branch, &out.stderr))
    }

    fn stash(&self, scope: &Path) -> Result<bool> {
        let scope = self.pathspec(scope);
        // Staging first turns new files into index entries, so a later pop
        // reports add/add collisions as ordinary conflicts.
        self.git(&["add", "-A", "--", &scope])?;
        let staged = self.run(&["diff", "--cached", "--quiet", "--", &scope])?;
        if staged.success {
            return Ok(false);
        }
        self.git(&["stash", "push", "--quiet", "-m", STASH_MESSAGE, "--", &scope])?;
        Ok(true)
    }

    fn stash_pop(&self) -> Result<StashPop> {
        let out = self.run(&["stash", "pop", "--quiet"])?;
        if out.success {
            return Ok(StashPop::Clean);
        }
        let paths = self.unmerged_paths()?;
        if paths.is_empty() {
            return Err(vcs_error(&["stash", "pop"], &out.stderr));
        }
        Ok(StashPop::Conflicted { paths })
    }

    fn stash_drop(&self) -> Result<()> {
        self.git(&["stash", "drop", "--quiet"])?;
        Ok(())
    }

    fn commit(&self, message: &str, paths: &[&Path]) -> Result<bool> {
        let rels = self.pathspecs(paths);

        let mut add = vec!["add", "-A", "--"];
        add.extend(rels.iter().map(String::as_str));
        self.git(&add)?;

        let mut diff = vec!["diff", "--cached", "--quiet", "--"];
        diff.extend(rels.iter().map(String::as_str));
        if self.run(&diff)?.success {
            return Ok(false);
        }

        let mut commit = vec!["commit", "--quiet", "-m", message, "--"];
        commit.extend(rels.iter().map(String::as_str));
        self.git(&commit)?;
        Ok(true)
    }

    fn read_stage(&self, path: &Path, stage: Stage) -> Result<Option<Vec<u8>>> {
        let rel = self.pathspec(path);
        let out = self.git(&["ls-files", "-u", "--", &rel])?;
        let wanted = (stage as u8).to_string();

        // "<mode> <object> <stage>\t<path>"
        let object = out.stdout_str().lines().find_map(|line| {
            let (meta, _) = line.split_once('\t')?;
            let mut fields = meta.split_whitespace();
            let _mode = fields.next()?;
            let object = fields.next()?;
            (fields.next()? == wanted).then(|| object.to_string())
        });

        match object {
            Some(object) => Ok(Some(self.git(&["cat-file", "blob", &object])?.stdout)),
            None => Ok(None),
        }
    }

    fn mark_resolved(&self, paths: &[&Path]) -> Result<()> {
        let rels = self.pathspecs(paths);
        let mut args = vec!["add", "--"];
        args.extend(rels.iter().map(String::as_str));
        self.git(&args)?;
        Ok(())
    }

    fn unstage(&self, paths: &[&Path]) -> Result<()> {
        let rels = self.pathspecs(paths);
        let mut args = vec!["reset", "--quiet", "--"];
        args.extend(rels.iter().map(String::as_str));
        self.git(&args)?;
        Ok(())
    }

    fn conclude_merge(&self, message: &str) -> Result<()> {
        self.git(&["commit", "--quiet", "--no-verify", "-m", message])?;
        Ok(())
    }

    fn abort_merge(&self) -> Result<()> {
        self.git(&["merge", "--abort"])?;
        Ok(())
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        if !self.branch_exists(branch)? {
            return Err(Error::BranchNotFound {
                branch: branch.to_string(),
            });
        }
        self.git(&["checkout", "--quiet", branch])?;
        Ok(())
    }

    fn create_branch(&self, name: &str, base: &str) -> Result<()> {
        self.git(&["branch", name, base])?;
        Ok(())
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        let refname = format!("refs/heads/{name}");
        Ok(self.run(&["rev-parse", "--verify", "--quiet", &refname])?.success)
    }

    fn current_branch(&self) -> Result<Option<String>> {
        let out = self.run(&["symbolic-ref", "--short", "-q", "HEAD"])?;
        Ok(out.success.then(|| out.stdout_str()).filter(|b| !b.is_empty()))
    }

    fn head_commit(&self) -> Result<Option<String>> {
        let out = self.run(&["rev-parse", "--verify", "-q", "HEAD"])?;
        Ok(out.success.then(|| out.stdout_str()).filter(|c| !c.is_empty()))
    }
}

/// Parse `git status --porcelain=v2 --branch` output.
///
/// An upstream without a `branch.ab` line is configured but missing on the
/// remote (a clone of an empty repository), so it is reported as absent.
fn parse_porcelain_v2(output: &str) -> VcsStatus {
    let mut status = VcsStatus::default();
    let mut tracked = false;
    for line in output.lines() {
        if let Some(head) = line.strip_prefix("# branch.head ") {
            if head != "(detached)" {
                status.branch = Some(head.to_string());
            }
        } else if let Some(upstream) = line.strip_prefix("# branch.upstream ") {
            status.upstream = Some(upstream.to_string());
        } else if let Some(ab) = line.strip_prefix("# branch.ab ") {
            tracked = true;
            for part in ab.split_whitespace() {
                if let Some(n) = part.strip_prefix('+') {
                    status.ahead = n.parse().unwrap_or(0);
                } else if let Some(n) = part.strip_prefix('-') {
                    status.behind = n.parse().unwrap_or(0);
                }
            }
        } else if !line.starts_with('#') && !line.trim().is_empty() {
            status.dirty = true;
        }
    }
    if !tracked {
        status.upstream = None;
    }
    status
}

fn is_lock_contention(stderr: &str) -> bool {
    stderr.contains(".lock") && (stderr.contains("File exists") || stderr.contains("Unable to create"))
}

fn classify_push_failure(branch: &str, stderr: &str) -> Error {
    const REJECTED: [&str; 4] = ["[rejected]", "non-fast-forward", "fetch first", "tip of your current branch is behind"];
    const TRANSPORT: [&str; 6] = [
        "Could not read from remote",
        "unable to access",
        "Could not resolve host",
        "Connection",
        "does not appear to be a git repository",
        "timed out",
    ];

    if REJECTED.iter().any(|m| stderr.contains(m)) {
        Error::NonFastForward {
            branch: branch.to_string(),
        }
    } else if TRANSPORT.iter().any(|m| stderr.contains(m)) {
        Error::NetworkFailure {
            operation: "push".to_string(),
            message: stderr.to_string(),
        }
    } else {
        vcs_error(&["push"], stderr)
    }
}

fn vcs_error(args: &[&str], stderr: &str) -> Error {
    Error::Vcs {
        command: args.first().copied().unwrap_or("git").to_string(),
        message: stderr.to_string(),
    }
}
