//! Namespace synchronization.
//!
//! Keeps the namespace root consistent across clones by cycling through the
//! git remote:
//!
//! - **Pull**: stash local edits, fetch, rebase (falling back to a three-way
//!   merge), re-apply the stash
//! - **Resolve**: diverged documents go through [`crate::resolve`]; ties are
//!   quarantined and halt the cycle
//! - **Commit / Push**: commit the namespace root, push without forcing
//! - **Status**: read-only view of the working copy and namespace freshness
//! - **Migrate**: one-time, idempotent import of the legacy local layout
//!
//! # Example
//!
//! ```ignore
//! use ff::sync::{SyncEngine, SyncOptions};
//!
//! let vcs = GitCli::discover(&ctx.root, &ctx.settings)?;
//! let mut engine = SyncEngine::new(&ctx, &vcs);
//! let report = engine.sync(&SyncOptions::default())?;
//! ```

mod engine;
mod migrate;
mod status;

pub use engine::{SyncEngine, SyncOptions, SyncPhase, SyncReport};
pub use migrate::{LEGACY_SESSION, LEGACY_TASK_TIMES, MigrationReport, import_legacy};
pub use status::{NamespaceFreshness, SyncStatus, print_status};
