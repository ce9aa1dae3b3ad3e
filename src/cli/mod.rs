//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Overrides;

pub mod commands;

/// FlowForge CLI - git-synchronized developer namespaces
#[derive(Parser, Debug)]
#[command(name = "ff", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Developer id (default: derived from git config user.email)
    #[arg(long, global = true, env = "FF_DEVELOPER")]
    pub developer: Option<String>,

    /// Namespace root (default: <git toplevel>/.flowforge)
    #[arg(long, global = true, env = "FF_ROOT")]
    pub root: Option<PathBuf>,

    /// Output as JSON (for agent integration)
    #[arg(long, alias = "robot", global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl Cli {
    /// Context overrides collected from flags and environment.
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            developer_id: self.developer.clone(),
            namespace_root: self.root.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull, reconcile, commit and push the namespace root
    Sync {
        /// Integrate the upstream without stashing local edits first
        #[arg(long)]
        force: bool,

        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Integrate remote namespace changes without committing local ones
    Pull {
        /// Integrate the upstream without stashing local edits first
        #[arg(long)]
        force: bool,
    },

    /// Commit pending namespace changes and push (never forces)
    Push {
        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show sync state and namespace freshness
    Status,

    /// Import the legacy machine-local layout into the tracked namespace
    Migrate,

    /// Session lifecycle
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Task assignments
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Task blockers
    Blocker {
        #[command(subcommand)]
        command: BlockerCommands,
    },

    /// Conflicts the resolver could not decide
    Quarantine {
        #[command(subcommand)]
        command: QuarantineCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Show version information
    Version,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Session Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Start a new session
    Start {
        /// Task the session works on
        task: Option<String>,

        /// End the active session first instead of failing
        #[arg(long)]
        replace: bool,
    },

    /// End the active session
    End,

    /// Continue a sealed session in a new one
    Restore {
        /// `latest`, `task:<id>` or a session id
        #[arg(default_value = "latest")]
        target: String,

        /// End the active session first instead of failing
        #[arg(long)]
        replace: bool,

        /// Do not switch to the session's branch
        #[arg(long)]
        no_branch: bool,
    },

    /// Show the active session
    Status,

    /// List ended sessions, newest first
    List {
        /// Maximum sessions to return
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

// ============================================================================
// Team Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Take a task
    Claim {
        /// Task ID
        task: String,
    },

    /// Hand a task to another developer
    Handoff {
        /// Task ID
        task: String,

        /// Receiving developer
        #[arg(long)]
        to: String,

        /// Current assignee (defaults to you)
        #[arg(long)]
        from: Option<String>,
    },

    /// Close a task
    Close {
        /// Task ID
        task: String,
    },

    /// List task assignments
    List {
        /// Include closed tasks
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum BlockerCommands {
    /// Report a blocker (supersedes the task's active one)
    Report {
        /// Task ID
        task: String,

        /// What is blocking
        reason: String,
    },

    /// Resolve the task's active blocker
    Resolve {
        /// Task ID
        task: String,
    },

    /// List blockers
    List {
        /// Include resolved blockers
        #[arg(long)]
        all: bool,
    },
}

// ============================================================================
// Quarantine Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum QuarantineCommands {
    /// List quarantined conflicts
    List,

    /// Discard quarantined entries after reconciling by hand
    Clear {
        /// Entry ID (from `ff quarantine list`)
        #[arg(required_unless_present = "all")]
        id: Option<String>,

        /// Clear every entry
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
}
