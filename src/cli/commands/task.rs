//! Task assignment command implementations.

use crate::cli::TaskCommands;
use crate::config::Context;
use crate::error::Result;
use crate::model::{TaskAssignment, TaskStatus};
use crate::team::TeamStore;
use colored::Colorize;

/// Execute task commands.
///
/// # Errors
///
/// Returns `TaskNotFound` when closing an unknown task, `InvalidArgument`
/// when handing off a task the sender does not hold.
pub fn execute(command: &TaskCommands, ctx: &Context, json: bool) -> Result<()> {
    let team = TeamStore::new(ctx);
    match command {
        TaskCommands::Claim { task } => {
            let assignment = team.claim(task)?;
            print_assignment("Claimed", task, &assignment, json)
        }
        TaskCommands::Handoff { task, to, from } => {
            let from = from.as_deref().unwrap_or(&ctx.developer_id);
            let assignment = team.handoff(task, from, to)?;
            print_assignment("Handed off", task, &assignment, json)
        }
        TaskCommands::Close { task } => {
            let assignment = team.close(task)?;
            print_assignment("Closed", task, &assignment, json)
        }
        TaskCommands::List { all } => list(&team, *all, json),
    }
}

fn print_assignment(verb: &str, task: &str, assignment: &TaskAssignment, json: bool) -> Result<()> {
    if json {
        let output = serde_json::json!({ "task": task, "assignment": assignment });
        println!("{output}");
        return Ok(());
    }
    println!("{verb} {task}");
    println!("  Assignee: {}", assignment.assignee);
    println!("  Status:   {}", assignment.status);
    if let Some(previous) = &assignment.previous_owner {
        println!("  Previous: {previous}");
    }
    Ok(())
}

fn list(team: &TeamStore, all: bool, json: bool) -> Result<()> {
    let assignments = team.assignments()?;
    let tasks: Vec<(&String, &TaskAssignment)> = assignments
        .tasks
        .iter()
        .filter(|(_, a)| all || a.status != TaskStatus::Closed)
        .collect();

    if json {
        let tasks: serde_json::Map<String, serde_json::Value> = tasks
            .iter()
            .map(|(id, a)| Ok(((*id).clone(), serde_json::to_value(a)?)))
            .collect::<Result<_>>()?;
        let output = serde_json::json!({ "count": tasks.len(), "tasks": tasks });
        println!("{output}");
        return Ok(());
    }

    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    for (id, assignment) in tasks {
        let status = match assignment.status {
            TaskStatus::InProgress => assignment.status.to_string().green(),
            TaskStatus::Blocked => assignment.status.to_string().red(),
            TaskStatus::HandedOff => assignment.status.to_string().yellow(),
            TaskStatus::Closed => assignment.status.to_string().dimmed(),
        };
        println!("  {id:<16} {:<12} {status}", assignment.assignee);
    }
    Ok(())
}
