//! Blocker command implementations.

use crate::cli::BlockerCommands;
use crate::config::Context;
use crate::error::Result;
use crate::model::Blocker;
use crate::team::TeamStore;
use colored::Colorize;

/// Execute blocker commands.
///
/// # Errors
///
/// Returns `TaskNotFound` when resolving a task without an active blocker.
pub fn execute(command: &BlockerCommands, ctx: &Context, json: bool) -> Result<()> {
    let team = TeamStore::new(ctx);
    match command {
        BlockerCommands::Report { task, reason } => {
            let blocker = team.report_blocker(task, reason)?;
            print_blocker("Reported blocker on", &blocker, json)
        }
        BlockerCommands::Resolve { task } => {
            let blocker = team.resolve_blocker(task)?;
            print_blocker("Resolved blocker on", &blocker, json)
        }
        BlockerCommands::List { all } => {
            let board = team.blockers()?;
            let blockers: Vec<&Blocker> = if *all {
                board.blockers.iter().collect()
            } else {
                board.active()
            };
            if json {
                let output = serde_json::json!({ "count": blockers.len(), "blockers": blockers });
                println!("{output}");
                return Ok(());
            }
            if blockers.is_empty() {
                println!("No blockers.");
                return Ok(());
            }
            for blocker in blockers {
                let line = format!(
                    "  {:<16} {:<12} {}  {}",
                    blocker.task,
                    blocker.developer,
                    blocker.reported_at.format("%Y-%m-%d %H:%M"),
                    blocker.reason
                );
                if blocker.is_active() {
                    println!("{line}");
                } else {
                    println!("{}", line.dimmed());
                }
            }
            Ok(())
        }
    }
}

fn print_blocker(verb: &str, blocker: &Blocker, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(blocker)?);
        return Ok(());
    }
    println!("{verb} {}", blocker.task);
    println!("  Reason: {}", blocker.reason);
    println!("  Status: {}", blocker.status);
    Ok(())
}
