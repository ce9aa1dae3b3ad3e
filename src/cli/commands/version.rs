//! Version command implementation.

use crate::error::Result;
use serde::Serialize;
use std::process::Command;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    /// `git --version` of the binary sync shells out to, if one is on PATH.
    git: Option<String>,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) { "dev" } else { "release" };
    let git = git_version();

    if json {
        let output = VersionOutput { version, build, git };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("ff version {version} ({build})");
    match git {
        Some(git) => println!("{git}"),
        None => println!("git: not found (sync commands unavailable)"),
    }
    Ok(())
}

fn git_version() -> Option<String> {
    let output = Command::new("git").arg("--version").output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}
