//! Quarantine command implementations.

use crate::cli::QuarantineCommands;
use crate::config::Context;
use crate::error::{Error, Result};
use crate::resolve::quarantine;
use crate::store::DocumentStore;
use colored::Colorize;

/// Execute quarantine commands.
///
/// # Errors
///
/// Returns `DocumentNotFound` when clearing an id that does not exist.
pub fn execute(command: &QuarantineCommands, ctx: &Context, json: bool) -> Result<()> {
    let store = DocumentStore::new(&ctx.root);
    match command {
        QuarantineCommands::List => {
            let entries = quarantine::list(&store)?;
            if json {
                let entries: Vec<_> = entries
                    .iter()
                    .map(|(id, entry)| serde_json::json!({ "id": id, "entry": entry }))
                    .collect();
                let output = serde_json::json!({ "count": entries.len(), "entries": entries });
                println!("{output}");
                return Ok(());
            }
            if entries.is_empty() {
                println!("{}", "No quarantined conflicts.".green());
                return Ok(());
            }
            for (id, entry) in &entries {
                println!("{} {}", id.bold(), entry.document);
                println!("  Key:      {}", entry.key);
                println!("  Detected: {}", entry.detected_at.format("%Y-%m-%d %H:%M UTC"));
            }
            println!();
            println!(
                "{}",
                "Reconcile each document by hand, then 'ff quarantine clear <id>' and 'ff sync'."
                    .dimmed()
            );
            Ok(())
        }
        QuarantineCommands::Clear { id, all } => {
            let target = if *all { None } else { id.as_deref() };
            let removed = quarantine::clear(&store, target)?;
            if let (Some(id), 0) = (target, removed) {
                return Err(Error::DocumentNotFound {
                    path: ctx.root.join(crate::namespace::layout::quarantine_entry(id)),
                });
            }
            if json {
                println!("{}", serde_json::json!({ "cleared": removed }));
            } else {
                println!("Cleared {removed} quarantined conflict(s).");
            }
            Ok(())
        }
    }
}
