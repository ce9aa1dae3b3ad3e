//! Sync command implementations (sync, pull, push, migrate).
//!
//! All of them operate on the git working tree that contains the namespace
//! root and touch nothing outside it.

use crate::config::Context;
use crate::error::Result;
use crate::sync::{MigrationReport, SyncEngine, SyncOptions, SyncReport};
use crate::vcs::{GitCli, PullOutcome, PullStrategy};

/// Which part of the cycle to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sync,
    Pull,
    Push,
}

/// Execute `sync`, `pull` or `push`.
///
/// # Errors
///
/// Returns `NotARepository` outside a git working tree, otherwise whatever the
/// sync engine reports.
pub fn execute(ctx: &Context, mode: Mode, options: &SyncOptions, json: bool) -> Result<()> {
    let git = GitCli::discover(&ctx.root, &ctx.settings)?;
    let mut engine = SyncEngine::new(ctx, &git);

    let report = match mode {
        Mode::Sync => engine.sync(options)?,
        Mode::Pull => engine.pull(options)?,
        Mode::Push => engine.push(options)?,
    };

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_report(&report, git.remote());
    }
    Ok(())
}

fn print_report(report: &SyncReport, remote: &str) {
    match &report.pull {
        Some(PullOutcome::UpToDate) => println!("Already up to date with {remote}."),
        Some(PullOutcome::NoUpstream) => println!("No upstream yet; nothing to pull."),
        Some(PullOutcome::Applied { strategy }) => {
            println!("Integrated changes from {remote} ({})", strategy_name(*strategy));
        }
        Some(PullOutcome::Conflicted { .. }) => println!("Merged changes from {remote}."),
        None => {}
    }
    if !report.resolved.is_empty() {
        println!("Reconciled {} document(s):", report.resolved.len());
        for path in &report.resolved {
            println!("  {path}");
        }
    }
    if !report.displaced.is_empty() {
        println!("Sealed into history (another session won the current slot):");
        for id in &report.displaced {
            println!("  {id}");
        }
    }
    if report.committed {
        println!("Committed namespace changes.");
    }
    if report.pushed {
        println!("Pushed to {remote}.");
    } else if !report.committed {
        println!("Nothing to push.");
    }
}

const fn strategy_name(strategy: PullStrategy) -> &'static str {
    match strategy {
        PullStrategy::Rebase => "rebase",
        PullStrategy::Merge => "merge",
    }
}

/// Execute `migrate`.
///
/// # Errors
///
/// Returns `CorruptDocument` for unparsable legacy files, `NotARepository`
/// outside a git working tree.
pub fn migrate(ctx: &Context, json: bool) -> Result<()> {
    let git = GitCli::discover(&ctx.root, &ctx.settings)?;
    let mut engine = SyncEngine::new(ctx, &git);
    let report = engine.migrate()?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_migration(&report, ctx);
    }
    Ok(())
}

fn print_migration(report: &MigrationReport, ctx: &Context) {
    if !report.changed() {
        println!("Already migrated: {}", ctx.root.display());
        return;
    }
    println!("Migrated into: {}", ctx.root.display());
    println!();
    if report.namespace_created {
        println!("  Namespace:     created for {}", ctx.developer_id);
    }
    if report.sessions_imported > 0 {
        println!("  Sessions:      {}", report.sessions_imported);
    }
    if report.time_entries_imported > 0 {
        println!("  Time entries:  {}", report.time_entries_imported);
    }
    if let Some(session) = &report.active_session {
        println!("  Active:        {session}");
    }
    if report.gitignore_created || report.gitattributes_created {
        println!("  Wrote .gitignore / .gitattributes");
    }
    if report.committed {
        println!();
        println!("Run 'ff sync' to publish.");
    }
}
