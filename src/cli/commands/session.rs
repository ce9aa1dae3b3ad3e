//! Session command implementations.

use crate::cli::SessionCommands;
use crate::config::Context;
use crate::error::Result;
use crate::model::SessionRecord;
use crate::session::{
    LogNotifier, RestoreOptions, RestoreTarget, SessionManager, StartOptions, timer_from_settings,
};
use crate::vcs::{GitCli, Vcs};
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

/// Output for session list command.
#[derive(Serialize)]
struct SessionListOutput {
    sessions: Vec<SessionRecord>,
    count: usize,
}

/// Execute session commands.
///
/// Works outside a git working tree too; branch capture and switching are
/// then skipped.
///
/// # Errors
///
/// Returns whatever the session manager reports.
pub fn execute(command: &SessionCommands, ctx: &Context, json: bool) -> Result<()> {
    let git = match GitCli::discover(&ctx.root, &ctx.settings) {
        Ok(git) => Some(git),
        Err(e) => {
            debug!(error = %e, "no git working tree, sessions run without branch info");
            None
        }
    };
    let timer = timer_from_settings(&ctx.settings);
    let notifier = LogNotifier;
    let manager = SessionManager::new(ctx, git.as_ref().map(|g| g as &dyn Vcs), timer.as_ref(), &notifier);

    match command {
        SessionCommands::Start { task, replace } => {
            let session = manager.start(task.as_deref(), StartOptions { replace: *replace })?;
            print_session("Started session", &session, json)
        }
        SessionCommands::End => {
            let session = manager.end()?;
            if json {
                println!("{}", serde_json::to_string(&session)?);
            } else {
                println!("Ended session: {}", session.session_id);
                println!("  Duration: {}", format_duration(session.duration().num_seconds()));
            }
            Ok(())
        }
        SessionCommands::Restore {
            target,
            replace,
            no_branch,
        } => {
            let target: RestoreTarget = target.parse()?;
            let options = RestoreOptions {
                replace: *replace,
                skip_branch: *no_branch,
            };
            let session = manager.restore(&target, options)?;
            print_session("Restored session", &session, json)
        }
        SessionCommands::Status => {
            let status = manager.status()?;
            if json {
                println!("{}", serde_json::to_string(&status)?);
                return Ok(());
            }
            match (&status.active, status.elapsed_seconds) {
                (Some(active), elapsed) => {
                    println!("{} {}", "Active:".green().bold(), active.session_id);
                    if let Some(task) = &active.task_id {
                        println!("  Task:    {task}");
                    }
                    println!("  Elapsed: {}", format_duration(elapsed.unwrap_or_default()));
                }
                (None, _) => println!("No active session for {}.", status.developer_id),
            }
            if let Some(last) = &status.last_ended {
                println!(
                    "{} {} ({})",
                    "Last ended:".dimmed(),
                    last.session_id,
                    format_duration(last.duration().num_seconds())
                );
            }
            Ok(())
        }
        SessionCommands::List { limit } => {
            let sessions = manager.list(*limit)?;
            if json {
                let output = SessionListOutput {
                    count: sessions.len(),
                    sessions,
                };
                println!("{}", serde_json::to_string(&output)?);
                return Ok(());
            }
            if sessions.is_empty() {
                println!("No ended sessions.");
                return Ok(());
            }
            println!("Sessions ({} found):", sessions.len());
            println!();
            for session in &sessions {
                println!(
                    "  {} {}  {}  {}",
                    session.start_time.format("%Y-%m-%d %H:%M"),
                    session.session_id,
                    session.task_id.as_deref().unwrap_or("-"),
                    format_duration(session.duration().num_seconds()).dimmed()
                );
            }
            Ok(())
        }
    }
}

fn print_session(label: &str, session: &SessionRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(session)?);
        return Ok(());
    }
    println!("{label}: {}", session.session_id);
    if let Some(task) = &session.task_id {
        println!("  Task: {task}");
    }
    if let Some(source) = &session.restored_from {
        println!("  Restored from: {source}");
    }
    if let Some(branch) = &session.environment.git_branch {
        println!("  Branch: {branch}");
    }
    Ok(())
}

fn format_duration(seconds: i64) -> String {
    let minutes = seconds / 60;
    if minutes < 60 {
        format!("{minutes}m")
    } else {
        format!("{}h{:02}m", minutes / 60, minutes % 60)
    }
}
