//! Configuration management.
//!
//! This module resolves *who* is acting and *where* their namespaces live,
//! and loads the tunables for the sync engine.
//!
//! # Architecture
//!
//! Everything an operation needs is carried by an explicit [`Context`] that
//! callers thread through the namespace manager, the sync engine, the session
//! manager and the team store. Nothing is read from process-wide state after
//! the context is built, which keeps tests and multi-root setups isolated.
//!
//! - **Developer id**: `--developer` / `FF_DEVELOPER`, else derived from git
//!   identity or the OS user
//! - **Namespace root**: `--root` / `FF_ROOT`, else `<git toplevel>/.flowforge`
//! - **Settings**: `<root>/config.json` over `~/.flowforge/config.json` over
//!   built-in defaults

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::read_if_exists;

/// Directory name of the namespace root inside a project.
pub const ROOT_DIR_NAME: &str = ".flowforge";

/// Settings file name, both per-root and per-user.
pub const CONFIG_FILE: &str = "config.json";

// ── Settings ──────────────────────────────────────────────────

/// Tunables for sync and collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Remote used for pull/push.
    pub remote: String,
    /// A namespace that has not synced for this long is reported stale.
    pub stale_after_hours: i64,
    /// How many times a git command is retried while a lock file is held.
    pub lock_retries: u32,
    /// Initial backoff between lock retries; doubles each attempt.
    pub lock_backoff_ms: u64,
    /// External timer program invoked as `<cmd> start|stop <task>`.
    pub timer_command: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            stale_after_hours: 24,
            lock_retries: 5,
            lock_backoff_ms: 100,
            timer_command: None,
        }
    }
}

/// Partial settings as they appear in a config file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SettingsFile {
    remote: Option<String>,
    stale_after_hours: Option<i64>,
    lock_retries: Option<u32>,
    lock_backoff_ms: Option<u64>,
    timer_command: Option<String>,
}

impl Settings {
    fn apply(&mut self, file: SettingsFile) {
        if let Some(remote) = file.remote {
            self.remote = remote;
        }
        if let Some(hours) = file.stale_after_hours {
            self.stale_after_hours = hours;
        }
        if let Some(retries) = file.lock_retries {
            self.lock_retries = retries;
        }
        if let Some(ms) = file.lock_backoff_ms {
            self.lock_backoff_ms = ms;
        }
        if file.timer_command.is_some() {
            self.timer_command = file.timer_command;
        }
    }

    /// Load settings: defaults, then the user file, then the root file.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a present file cannot be parsed. A malformed file
    /// is never silently ignored.
    pub fn load(root: &Path) -> Result<Self> {
        let mut settings = Self::default();
        let user_file = global_config_dir().map(|dir| dir.join(CONFIG_FILE));
        for path in user_file.into_iter().chain(std::iter::once(root.join(CONFIG_FILE))) {
            if let Some(file) = read_settings_file(&path)? {
                debug!(path = %path.display(), "loaded settings");
                settings.apply(file);
            }
        }
        Ok(settings)
    }

    #[must_use]
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::hours(self.stale_after_hours)
    }
}

fn read_settings_file(path: &Path) -> Result<Option<SettingsFile>> {
    let Some(bytes) = read_if_exists(path)? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

/// User-level configuration directory (`~/.flowforge`).
#[must_use]
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(ROOT_DIR_NAME))
}

// ── Context ───────────────────────────────────────────────────

/// Who is acting, on which namespace root, with which settings.
#[derive(Debug, Clone)]
pub struct Context {
    pub developer_id: String,
    pub root: PathBuf,
    pub settings: Settings,
}

/// External overrides, typically from CLI flags or environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub developer_id: Option<String>,
    pub namespace_root: Option<PathBuf>,
}

impl Context {
    /// Build a context with explicit values, canonicalizing the root.
    ///
    /// The root itself is not created here; the first document write does that.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unusable developer id, or `Io` if the
    /// root cannot be resolved.
    pub fn new(developer_id: &str, root: impl AsRef<Path>, settings: Settings) -> Result<Self> {
        validate_developer_id(developer_id)?;
        let root = canonicalize_lenient(root.as_ref())?;
        Ok(Self {
            developer_id: developer_id.to_string(),
            root,
            settings,
        })
    }

    /// Resolve a context from overrides, git and the environment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an invalid explicit developer id, or
    /// `Config` for a malformed settings file.
    pub fn resolve(overrides: &Overrides) -> Result<Self> {
        let root = resolve_namespace_root(overrides.namespace_root.as_deref())?;
        let developer_id = match overrides.developer_id.as_deref() {
            Some(id) => {
                validate_developer_id(id)?;
                id.to_string()
            }
            None => default_developer_id(),
        };
        let settings = Settings::load(&root)?;
        Self::new(&developer_id, root, settings)
    }

    /// Directory the namespace root lives in (the project checkout).
    #[must_use]
    pub fn project_dir(&self) -> &Path {
        self.root.parent().unwrap_or(&self.root)
    }
}

/// Absolute, symlink-free form of `path`, which need not exist yet: the
/// nearest existing ancestor is canonicalized and the rest appended.
fn canonicalize_lenient(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_err(|e| Error::io(".", e))?.join(path)
    };

    let mut missing = Vec::new();
    let mut existing = absolute.as_path();
    while !existing.exists() {
        let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
            break;
        };
        missing.push(name.to_os_string());
        existing = parent;
    }

    let mut resolved = existing.canonicalize().map_err(|e| Error::io(existing, e))?;
    resolved.extend(missing.iter().rev());
    Ok(resolved)
}

/// Resolve the namespace root.
///
/// Priority:
/// 1. Explicit override
/// 2. `<git toplevel>/.flowforge`
/// 3. `<cwd>/.flowforge`
///
/// # Errors
///
/// Returns `Io` if the current directory cannot be determined.
pub fn resolve_namespace_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(top) = git_toplevel() {
        return Ok(top.join(ROOT_DIR_NAME));
    }
    let cwd = std::env::current_dir().map_err(|e| Error::io(".", e))?;
    Ok(cwd.join(ROOT_DIR_NAME))
}

fn git_toplevel() -> Option<PathBuf> {
    Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim().to_string()))
}

fn git_config(key: &str) -> Option<String> {
    Command::new("git")
        .args(["config", key])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Derive the developer id when none was given.
///
/// Priority:
/// 1. Local part of `git config user.email`
/// 2. `git config user.name`
/// 3. `USER` / `USERNAME`
/// 4. "unknown"
#[must_use]
pub fn default_developer_id() -> String {
    let candidates = [
        git_config("user.email").and_then(|e| e.split('@').next().map(ToString::to_string)),
        git_config("user.name"),
        std::env::var("USER").ok(),
        std::env::var("USERNAME").ok(),
    ];
    candidates
        .into_iter()
        .flatten()
        .map(|raw| sanitize_developer_id(&raw))
        .find(|id| !id.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Lowercase and replace anything outside `[a-z0-9._-]` with `-`.
#[must_use]
pub fn sanitize_developer_id(raw: &str) -> String {
    let mapped: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .take(64)
        .collect();
    mapped.trim_matches(|c| c == '-' || c == '.').to_string()
}

/// Ids become directory names, so they must be plain path segments.
///
/// # Errors
///
/// Returns `InvalidArgument` describing the problem.
pub fn validate_developer_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 {
        return Err(Error::InvalidArgument(format!(
            "developer id must be 1-64 characters, got {:?}",
            id
        )));
    }
    if id.starts_with('.') {
        return Err(Error::InvalidArgument(format!(
            "developer id may not start with '.': {id}"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(Error::InvalidArgument(format!(
            "developer id may only contain letters, digits, '.', '_' and '-': {id}"
        )));
    }
    Ok(())
}

/// Task ids are used as map keys and in document names.
///
/// # Errors
///
/// Returns `InvalidArgument` for empty ids or ids containing `/` or whitespace.
pub fn validate_task_id(id: &str) -> Result<()> {
    if id.trim().is_empty() || id.contains('/') || id.contains('\\') || id.chars().any(char::is_whitespace) {
        return Err(Error::InvalidArgument(format!("invalid task id: {id:?}")));
    }
    Ok(())
}
