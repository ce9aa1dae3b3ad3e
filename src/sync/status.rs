//! Sync status.
//!
//! A read-only projection of the working copy state plus how recently each
//! namespace was synced. Nothing here fetches, so `behind` reflects the last
//! fetch.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use super::engine::{SyncEngine, SyncPhase};
use crate::error::Result;
use crate::resolve::quarantine;
use crate::vcs::VcsStatus;

/// Freshness of one developer namespace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceFreshness {
    pub developer_id: String,
    pub last_synced: Option<DateTime<Utc>>,
    pub stale: bool,
    pub own: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub vcs: VcsStatus,
    pub namespaces: Vec<NamespaceFreshness>,
    pub quarantined: usize,
    pub active_session: Option<String>,
}

impl SyncEngine<'_> {
    /// # Errors
    ///
    /// Returns `Vcs` if git status fails, or a store error for unreadable profiles.
    pub fn status(&self) -> Result<SyncStatus> {
        let ctx = self.context();
        let ns = self.namespaces();
        let now = Utc::now();
        let max_age = ctx.settings.stale_after();

        let mut namespaces = Vec::new();
        for developer in ns.developers()? {
            let profile = ns.load_profile(&developer)?;
            let last_synced = profile.as_ref().and_then(|p| p.last_synced);
            namespaces.push(NamespaceFreshness {
                stale: profile.as_ref().is_none_or(|p| p.is_stale(now, max_age)),
                own: developer == ctx.developer_id,
                developer_id: developer,
                last_synced,
            });
        }

        // A pending quarantine keeps the cycle halted across processes.
        let quarantined = quarantine::pending(ns.store())?;
        let phase = if quarantined > 0 { SyncPhase::Resolving } else { self.phase() };

        Ok(SyncStatus {
            phase,
            vcs: self.vcs().status(&ctx.root)?,
            namespaces,
            quarantined,
            active_session: ns
                .active_session(&ctx.developer_id)?
                .map(|s| s.session_id),
        })
    }
}

/// Print status in human-readable form.
pub fn print_status(status: &SyncStatus) {
    println!("{}", "Sync Status".bold().underline());
    println!();

    let vcs = &status.vcs;
    let branch = vcs.branch.as_deref().unwrap_or("(detached)");
    match &vcs.upstream {
        Some(upstream) => println!("  Branch:   {branch} → {upstream}"),
        None if vcs.has_remote => println!("  Branch:   {branch} {}", "(not pushed yet)".dimmed()),
        None => println!("  Branch:   {branch} {}", "(no remote)".dimmed()),
    }
    if vcs.ahead > 0 {
        println!("  Ahead:    {}", vcs.ahead.to_string().yellow());
    }
    if vcs.behind > 0 {
        println!("  Behind:   {}", vcs.behind.to_string().yellow());
    }
    if vcs.dirty {
        println!("  Changes:  {}", "uncommitted namespace changes".yellow());
    }
    if let Some(session) = &status.active_session {
        println!("  Session:  {session}");
    }
    println!();

    if !status.namespaces.is_empty() {
        println!("{}", "Namespaces:".blue().bold());
        for ns in &status.namespaces {
            let synced = ns
                .last_synced
                .map_or_else(|| "never synced".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string());
            let marker = if ns.own { " (you)" } else { "" };
            if ns.stale {
                println!("  {}{marker}  {}", ns.developer_id, synced.yellow());
            } else {
                println!("  {}{marker}  {synced}", ns.developer_id);
            }
        }
        println!();
    }

    if status.quarantined > 0 {
        println!(
            "{} sync stopped while resolving; {} quarantined conflict(s) block it.",
            "Attention:".red().bold(),
            status.quarantined
        );
        println!("{}", "Run 'ff quarantine list' to inspect them.".dimmed());
    } else if vcs.dirty || vcs.ahead > 0 {
        println!("{}", "Run 'ff sync' to publish local changes.".dimmed());
    } else if vcs.behind > 0 {
        println!("{}", "Run 'ff pull' to bring in remote changes.".dimmed());
    } else {
        println!("{}", "Up to date.".green());
    }
}
