//! Atomic file operations.
//!
//! This module provides safe file operations that prevent torn documents:
//! - Atomic writes: write to a temp file in the same directory, fsync, rename
//! - Reads that distinguish "missing" from "unreadable"

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::Builder;

use crate::error::{Error, Result};

/// Write content to a file atomically.
///
/// This function:
/// 1. Creates the parent directory if needed
/// 2. Writes content to a temporary file next to the target
/// 3. Calls `fsync` to ensure data is on disk
/// 4. Atomically renames the temp file over the target
///
/// If any step fails, the original file (if any) remains untouched and the
/// temp file is removed.
///
/// # Errors
///
/// Returns `Error::Io` if any file operation fails.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let mut tmp = Builder::new()
        .prefix(".ff-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| Error::io(dir, e))?;
    tmp.write_all(content).map_err(|e| Error::io(path, e))?;
    tmp.flush().map_err(|e| Error::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(path, e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;

    Ok(())
}

/// Read a file's bytes, returning `None` if it does not exist.
///
/// # Errors
///
/// Returns `Error::Io` for any failure other than "not found".
pub fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Remove a file; a missing file is not an error.
///
/// # Errors
///
/// Returns `Error::Io` if the file exists but cannot be removed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Generate .gitignore content for the namespace root.
///
/// Temp files from interrupted writes and the machine-local legacy layout
/// must never be committed.
#[must_use]
pub fn gitignore_content() -> &'static str {
    r"# FlowForge namespace root
# Interrupted atomic writes
.ff-*
*.tmp

# Machine-local legacy layout (imported by `ff migrate`)
local/
billing/

# Unresolved conflicts awaiting manual reconciliation
quarantine/
"
}

/// Generate .gitattributes content for the namespace root.
///
/// Documents are merged structurally, never line by line: a textual merge of
/// two JSON edits can succeed and still produce an unparsable document.
#[must_use]
pub fn gitattributes_content() -> &'static str {
    r"# FlowForge documents are reconciled by `ff sync`, not by git
*.json merge=binary
"
}

/// Ensure .gitignore exists in the namespace root.
///
/// If the file already exists, it is not modified (the team may have
/// customized it). Returns `true` if the file was created.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn ensure_gitignore(root: &Path) -> Result<bool> {
    ensure_file(&root.join(".gitignore"), gitignore_content())
}

/// Ensure .gitattributes exists in the namespace root. Same rules as
/// [`ensure_gitignore`].
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn ensure_gitattributes(root: &Path) -> Result<bool> {
    ensure_file(&root.join(".gitattributes"), gitattributes_content())
}

fn ensure_file(path: &Path, content: &str) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let mut file = File::create(path).map_err(|e| Error::io(path, e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| Error::io(path, e))?;
    file.sync_all().map_err(|e| Error::io(path, e))?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a").join("b").join("doc.json");

        atomic_write(&path, b"{}\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{}\n");
    }

    #[test]
    fn test_atomic_write_replaces_without_leftovers() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.json");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temp file should have been renamed away");
    }

    #[test]
    fn test_read_if_exists_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(read_if_exists(&temp_dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn test_remove_if_exists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.json");
        assert!(!remove_if_exists(&path).unwrap());
        fs::write(&path, "x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_ensure_gitignore_does_not_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let gitignore_path = temp_dir.path().join(".gitignore");

        assert!(ensure_gitignore(temp_dir.path()).unwrap());
        assert!(fs::read_to_string(&gitignore_path).unwrap().contains("local/"));

        fs::write(&gitignore_path, "# Custom content\n").unwrap();
        assert!(!ensure_gitignore(temp_dir.path()).unwrap());
        assert_eq!(fs::read_to_string(&gitignore_path).unwrap(), "# Custom content\n");
    }

    #[test]
    fn test_ensure_gitattributes_disables_textual_merge() {
        let temp_dir = TempDir::new().unwrap();
        assert!(ensure_gitattributes(temp_dir.path()).unwrap());
        let content = fs::read_to_string(temp_dir.path().join(".gitattributes")).unwrap();
        assert!(content.contains("*.json merge=binary"));
        assert!(!ensure_gitattributes(temp_dir.path()).unwrap());
    }
}
