//! Status command implementation.

use crate::config::Context;
use crate::error::Result;
use crate::sync::{SyncEngine, print_status};
use crate::vcs::GitCli;

/// Execute status command.
///
/// # Errors
///
/// Returns `NotARepository` outside a git working tree, or a store error for
/// an unreadable profile.
pub fn execute(ctx: &Context, json: bool) -> Result<()> {
    let git = GitCli::discover(&ctx.root, &ctx.settings)?;
    let engine = SyncEngine::new(ctx, &git);
    let status = engine.status()?;

    if json {
        let output = serde_json::json!({
            "developer": ctx.developer_id,
            "root": ctx.root.display().to_string(),
            "status": status,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Namespace root: {}", ctx.root.display());
        println!();
        print_status(&status);
    }
    Ok(())
}
