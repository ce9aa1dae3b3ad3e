//! Error types for the FlowForge CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=storage, 3=not_found, 4=validation, etc.)
//! - Retryability flags so callers know whether a plain retry can succeed
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for FlowForge operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Storage (exit 2)
    IoFailure,
    CorruptDocument,
    Contention,

    // Not Found (exit 3)
    NotFound,
    NoActiveSession,
    BranchNotFound,

    // Validation (exit 4)
    InvalidArgument,
    AlreadyActive,
    CrossNamespaceWrite,

    // Sync (exit 6)
    NetworkFailure,
    NonFastForward,
    AmbiguousConflict,
    VcsError,
    NotARepository,

    // Config (exit 7)
    ConfigError,

    // Serialization (exit 8)
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::IoFailure => "IO_FAILURE",
            Self::CorruptDocument => "CORRUPT_DOCUMENT",
            Self::Contention => "CONTENTION",
            Self::NotFound => "NOT_FOUND",
            Self::NoActiveSession => "NO_ACTIVE_SESSION",
            Self::BranchNotFound => "BRANCH_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::AlreadyActive => "ALREADY_ACTIVE",
            Self::CrossNamespaceWrite => "CROSS_NAMESPACE_WRITE",
            Self::NetworkFailure => "NETWORK_FAILURE",
            Self::NonFastForward => "NON_FAST_FORWARD",
            Self::AmbiguousConflict => "AMBIGUOUS_CONFLICT",
            Self::VcsError => "VCS_ERROR",
            Self::NotARepository => "NOT_A_REPOSITORY",
            Self::ConfigError => "CONFIG_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::IoFailure | Self::CorruptDocument | Self::Contention => 2,
            Self::NotFound | Self::NoActiveSession | Self::BranchNotFound => 3,
            Self::InvalidArgument | Self::AlreadyActive | Self::CrossNamespaceWrite => 4,
            Self::NetworkFailure
            | Self::NonFastForward
            | Self::AmbiguousConflict
            | Self::VcsError
            | Self::NotARepository => 6,
            Self::ConfigError => 7,
            Self::JsonError => 8,
        }
    }

    /// Whether re-running the same operation can succeed without human input.
    ///
    /// `NonFastForward` is not retryable as-is: the caller must pull first.
    /// `AmbiguousConflict` always needs manual reconciliation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure | Self::Contention | Self::IoFailure)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in FlowForge operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt document {}: {message}", path.display())]
    CorruptDocument { path: PathBuf, message: String },

    #[error("Document changed concurrently too many times: {}", path.display())]
    Contention { path: PathBuf },

    #[error("Document not found: {}", path.display())]
    DocumentNotFound { path: PathBuf },

    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    #[error("No active session for {developer}")]
    NoActiveSession { developer: String },

    #[error("Session {session_id} is already active")]
    AlreadyActive { session_id: String },

    #[error("Branch not found locally: {branch}")]
    BranchNotFound { branch: String },

    #[error("{owner}'s namespace cannot be written by {developer}")]
    CrossNamespaceWrite { owner: String, developer: String },

    #[error("Network failure during {operation}: {message}")]
    NetworkFailure { operation: String, message: String },

    #[error("Push rejected (non-fast-forward) on {branch}")]
    NonFastForward { branch: String },

    #[error("Ambiguous conflict in {document} at {key}")]
    AmbiguousConflict { document: String, key: String },

    #[error("git {command} failed: {message}")]
    Vcs { command: String, message: String },

    #[error("Not a git repository: {}", path.display())]
    NotARepository { path: PathBuf },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Io { .. } => ErrorCode::IoFailure,
            Self::CorruptDocument { .. } => ErrorCode::CorruptDocument,
            Self::Contention { .. } => ErrorCode::Contention,
            Self::DocumentNotFound { .. } | Self::SessionNotFound { .. } | Self::TaskNotFound { .. } => {
                ErrorCode::NotFound
            }
            Self::NoActiveSession { .. } => ErrorCode::NoActiveSession,
            Self::AlreadyActive { .. } => ErrorCode::AlreadyActive,
            Self::BranchNotFound { .. } => ErrorCode::BranchNotFound,
            Self::CrossNamespaceWrite { .. } => ErrorCode::CrossNamespaceWrite,
            Self::NetworkFailure { .. } => ErrorCode::NetworkFailure,
            Self::NonFastForward { .. } => ErrorCode::NonFastForward,
            Self::AmbiguousConflict { .. } => ErrorCode::AmbiguousConflict,
            Self::Vcs { .. } => ErrorCode::VcsError,
            Self::NotARepository { .. } => ErrorCode::NotARepository,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NonFastForward { .. } => Some(
                "The remote has commits you don't have. Run `ff pull`, then `ff push` again."
                    .to_string(),
            ),
            Self::NetworkFailure { .. } => Some(
                "Nothing was committed. Check connectivity to the remote and retry.".to_string(),
            ),
            Self::AmbiguousConflict { document, .. } => Some(format!(
                "Both versions of {document} were preserved.\n  \
                 Inspect: ff quarantine list\n  \
                 Reconcile the document by hand, then: ff quarantine clear && ff sync"
            )),
            Self::AlreadyActive { session_id } => Some(format!(
                "End it with `ff session end`, or pass --replace to seal {session_id} and start anew."
            )),
            Self::NoActiveSession { .. } => Some(
                "Start one:   ff session start <task>\n  \
                 Restore one: ff session restore latest"
                    .to_string(),
            ),
            Self::BranchNotFound { branch } => Some(format!(
                "Fetch it explicitly (`git fetch origin {branch}:{branch}`) or pass --no-branch."
            )),
            Self::SessionNotFound { id } => Some(format!(
                "No session '{id}'. Use `ff session list` to see recorded sessions."
            )),
            Self::CorruptDocument { path, .. } => Some(format!(
                "Fix or restore {} from history (`git log -- <path>`); it was not overwritten.",
                path.display()
            )),
            Self::NotARepository { .. } => {
                Some("Run inside a git working tree or pass --root.".to_string())
            }
            Self::Io { .. }
            | Self::Contention { .. }
            | Self::DocumentNotFound { .. }
            | Self::TaskNotFound { .. }
            | Self::CrossNamespaceWrite { .. }
            | Self::Vcs { .. }
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
