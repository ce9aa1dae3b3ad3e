//! Document store.
//!
//! Typed read/modify/write access to JSON documents under a root directory.
//!
//! - **Reads** distinguish a missing document (`DocumentNotFound`) from an
//!   unparsable one (`CorruptDocument`); nothing is ever silently defaulted.
//! - **Writes** are atomic (temp file + fsync + rename), so a concurrent reader
//!   or a killed process only ever observes the old or the new document.
//! - **Merges** are optimistic read-modify-write: if the document changes
//!   between the read and the write, the mutation is re-applied to the fresh
//!   copy, up to [`MERGE_ATTEMPTS`] times.
//!
//! Document paths are relative to the store root and always use `/`.

pub mod file;
pub mod hash;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};

pub use file::{
    atomic_write, ensure_gitattributes, ensure_gitignore, gitattributes_content, gitignore_content,
    read_if_exists, remove_if_exists,
};
pub use hash::{content_hash, has_changed, value_hash};

/// How many times `merge` re-applies a mutation after losing a race.
pub const MERGE_ATTEMPTS: usize = 5;

/// JSON documents rooted at one directory.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a document.
    #[must_use]
    pub fn path(&self, rel: &str) -> PathBuf {
        rel.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    #[must_use]
    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).is_file()
    }

    /// Read and parse a document.
    ///
    /// # Errors
    ///
    /// - `DocumentNotFound` if it does not exist
    /// - `CorruptDocument` if its bytes are not a valid `T`
    /// - `Io` on any other read failure
    pub fn read<T: DeserializeOwned>(&self, rel: &str) -> Result<T> {
        self.read_opt(rel)?.ok_or_else(|| Error::DocumentNotFound {
            path: self.path(rel),
        })
    }

    /// Read and parse a document, mapping "missing" to `None`.
    ///
    /// # Errors
    ///
    /// Returns `CorruptDocument` or `Io`; never substitutes a default.
    pub fn read_opt<T: DeserializeOwned>(&self, rel: &str) -> Result<Option<T>> {
        let path = self.path(rel);
        match read_if_exists(&path)? {
            Some(bytes) => parse(&path, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Raw bytes of a document, if present.
    ///
    /// # Errors
    ///
    /// Returns `Io` on read failure.
    pub fn read_bytes(&self, rel: &str) -> Result<Option<Vec<u8>>> {
        read_if_exists(&self.path(rel))
    }

    /// Serialize and atomically write a document.
    ///
    /// # Errors
    ///
    /// Returns `Io` (prior document left intact) or `Json`.
    pub fn write<T: Serialize>(&self, rel: &str, doc: &T) -> Result<()> {
        let bytes = to_document_bytes(doc)?;
        self.write_bytes(rel, &bytes)
    }

    /// Atomically write raw document bytes.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the write fails.
    pub fn write_bytes(&self, rel: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(rel);
        debug!(path = %path.display(), bytes = bytes.len(), "writing document");
        atomic_write(&path, bytes)
    }

    /// Remove a document. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns `Io` if removal fails.
    pub fn remove(&self, rel: &str) -> Result<bool> {
        remove_if_exists(&self.path(rel))
    }

    /// Read-modify-write with retry on concurrent modification.
    ///
    /// A missing document starts from `T::default()`. If `mutate` returns an
    /// error nothing is written. Returns the written document and whatever
    /// `mutate` returned.
    ///
    /// # Errors
    ///
    /// Propagates read/parse/mutation/write errors, or `Contention` when the
    /// document kept changing underneath for `MERGE_ATTEMPTS` rounds.
    pub fn merge<T, R, F>(&self, rel: &str, mut mutate: F) -> Result<(T, R)>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnMut(&mut T) -> Result<R>,
    {
        let path = self.path(rel);
        for attempt in 1..=MERGE_ATTEMPTS {
            let before = read_if_exists(&path)?;
            let mut doc: T = match &before {
                Some(bytes) => parse(&path, bytes)?,
                None => T::default(),
            };
            let out = mutate(&mut doc)?;

            let observed = before.as_deref().map(content_hash);
            let current = read_if_exists(&path)?.as_deref().map(content_hash);
            if has_changed(current.as_deref(), observed.as_deref()) {
                debug!(path = %path.display(), attempt, "document changed during merge, retrying");
                continue;
            }

            self.write(rel, &doc)?;
            return Ok((doc, out));
        }
        Err(Error::Contention { path })
    }

    /// Names (without `.json`) of the documents directly under `rel_dir`, sorted.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory exists but cannot be listed.
    pub fn list(&self, rel_dir: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .entries(rel_dir)?
            .into_iter()
            .filter(|(_, is_dir)| !is_dir)
            .filter_map(|(name, _)| name.strip_suffix(".json").map(ToString::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Names of the subdirectories of `rel_dir`, sorted.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory exists but cannot be listed.
    pub fn list_dirs(&self, rel_dir: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .entries(rel_dir)?
            .into_iter()
            .filter(|(name, is_dir)| *is_dir && !name.starts_with('.'))
            .map(|(name, _)| name)
            .collect();
        names.sort();
        Ok(names)
    }

    fn entries(&self, rel_dir: &str) -> Result<Vec<(String, bool)>> {
        let dir = self.path(rel_dir);
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&dir, e)),
        };

        let mut out = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| Error::io(&dir, e))?;
            let is_dir = entry.file_type().map_err(|e| Error::io(entry.path(), e))?.is_dir();
            if let Some(name) = entry.file_name().to_str() {
                out.push((name.to_string(), is_dir));
            }
        }
        Ok(out)
    }
}

/// Canonical on-disk form: pretty JSON with a trailing newline.
///
/// One field per line keeps git diffs and textual merges readable.
///
/// # Errors
///
/// Returns `Json` if serialization fails.
pub fn to_document_bytes<T: Serialize>(doc: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(doc)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse document bytes, reporting failures as `CorruptDocument`.
///
/// # Errors
///
/// Returns `CorruptDocument` with the parser's message.
pub fn parse<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::CorruptDocument {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::cell::Cell;
    use tempfile::TempDir;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u32,
        #[serde(default)]
        notes: Vec<String>,
    }

    fn store() -> (TempDir, DocumentStore) {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let (_dir, store) = store();
        let doc = Counter {
            value: 7,
            notes: vec!["a".into(), "b".into()],
        };

        store.write("team/counter.json", &doc).unwrap();
        let back: Counter = store.read("team/counter.json").unwrap();

        assert_eq!(back, doc);
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.read::<Counter>("nope.json").unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound { .. }));
        assert!(store.read_opt::<Counter>("nope.json").unwrap().is_none());
    }

    #[test]
    fn test_read_corrupt_is_never_defaulted() {
        let (_dir, store) = store();
        fs::write(store.path("bad.json"), "{\"value\": ").unwrap();
        let err = store.read_opt::<Counter>("bad.json").unwrap_err();
        assert!(matches!(err, Error::CorruptDocument { .. }));

        fs::write(store.path("empty.json"), "").unwrap();
        let err = store.read::<Counter>("empty.json").unwrap_err();
        assert!(matches!(err, Error::CorruptDocument { .. }));
    }

    #[test]
    fn test_merge_creates_missing_document() {
        let (_dir, store) = store();
        let (doc, out) = store
            .merge("c.json", |c: &mut Counter| {
                c.value += 1;
                Ok(c.value)
            })
            .unwrap();
        assert_eq!(doc.value, 1);
        assert_eq!(out, 1);
        assert_eq!(store.read::<Counter>("c.json").unwrap().value, 1);
    }

    #[test]
    fn test_merge_failure_writes_nothing() {
        let (_dir, store) = store();
        store.write("c.json", &Counter { value: 3, notes: vec![] }).unwrap();

        let result: Result<(Counter, ())> = store.merge("c.json", |c: &mut Counter| {
            c.value = 99;
            Err(Error::InvalidArgument("nope".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.read::<Counter>("c.json").unwrap().value, 3);
    }

    #[test]
    fn test_merge_retries_after_concurrent_write() {
        let (_dir, store) = store();
        store.write("c.json", &Counter { value: 1, notes: vec![] }).unwrap();

        let calls = Cell::new(0);
        let (doc, ()) = store
            .merge("c.json", |c: &mut Counter| {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    // Another writer lands between our read and our write.
                    store
                        .write("c.json", &Counter { value: 10, notes: vec!["other".into()] })
                        .unwrap();
                }
                c.value += 1;
                Ok(())
            })
            .unwrap();

        assert_eq!(calls.get(), 2);
        assert_eq!(doc.value, 11);
        assert_eq!(doc.notes, vec!["other".to_string()]);
    }

    #[test]
    fn test_merge_gives_up_under_constant_contention() {
        let (_dir, store) = store();
        let counter = Cell::new(0);
        let err = store
            .merge("c.json", |c: &mut Counter| {
                counter.set(counter.get() + 1);
                store
                    .write("c.json", &Counter { value: counter.get(), notes: vec![] })
                    .unwrap();
                c.value = 0;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::Contention { .. }));
        assert_eq!(counter.get(), MERGE_ATTEMPTS as u32);
    }

    #[test]
    fn test_list_documents_and_dirs() {
        let (_dir, store) = store();
        store.write("developers/bo/profile.json", &Counter::default()).unwrap();
        store.write("developers/ana/profile.json", &Counter::default()).unwrap();
        store.write("developers/ana/sessions/history/s2.json", &Counter::default()).unwrap();
        store.write("developers/ana/sessions/history/s1.json", &Counter::default()).unwrap();

        assert_eq!(store.list_dirs("developers").unwrap(), vec!["ana", "bo"]);
        assert_eq!(
            store.list("developers/ana/sessions/history").unwrap(),
            vec!["s1", "s2"]
        );
        assert!(store.list("missing/dir").unwrap().is_empty());
    }
}
