//! Generic merge policies.
//!
//! Each policy is a pure function of the two diverged versions, so the result
//! does not depend on which replica runs it. When a policy cannot pick a
//! winner without guessing it returns [`Tie`] naming the contested key.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Two versions share a key and a timestamp but disagree on content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tie {
    pub key: String,
}

impl Tie {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Which side a last-writer-wins comparison picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Remote,
}

/// Pick the version with the later stamp.
///
/// Identical versions resolve to `Local`. Equal stamps with differing content
/// are a [`Tie`].
///
/// # Errors
///
/// Returns `Tie` carrying `key` when the stamps are equal and the values differ.
pub fn last_writer_wins<T, F>(local: &T, remote: &T, key: &str, stamp: F) -> Result<Winner, Tie>
where
    T: PartialEq,
    F: Fn(&T) -> DateTime<Utc>,
{
    if local == remote {
        return Ok(Winner::Local);
    }
    match stamp(local).cmp(&stamp(remote)) {
        std::cmp::Ordering::Greater => Ok(Winner::Local),
        std::cmp::Ordering::Less => Ok(Winner::Remote),
        std::cmp::Ordering::Equal => Err(Tie::new(key)),
    }
}

/// Union of two append-only lists, de-duplicated by `key`.
///
/// The same key on both sides must carry the same entry; anything else is a
/// [`Tie`] since append-only entries are never edited. The result is sorted by
/// `(stamp, key)`, so both replicas produce the same order.
///
/// # Errors
///
/// Returns `Tie` for the first key whose two copies differ.
pub fn union_by_key<T, K, S>(local: Vec<T>, remote: Vec<T>, key: K, stamp: S) -> Result<Vec<T>, Tie>
where
    T: PartialEq,
    K: Fn(&T) -> String,
    S: Fn(&T) -> DateTime<Utc>,
{
    let mut merged: BTreeMap<String, T> = BTreeMap::new();
    for entry in local.into_iter().chain(remote) {
        let k = key(&entry);
        match merged.get(&k) {
            Some(existing) if *existing != entry => return Err(Tie::new(k)),
            Some(_) => {}
            None => {
                merged.insert(k, entry);
            }
        }
    }

    let mut out: Vec<(String, T)> = merged.into_iter().collect();
    out.sort_by(|(ka, a), (kb, b)| stamp(a).cmp(&stamp(b)).then_with(|| ka.cmp(kb)));
    Ok(out.into_iter().map(|(_, v)| v).collect())
}

/// Like [`union_by_key`], but two copies of the same key are reconciled with
/// [`last_writer_wins`] instead of being required to match. Used for keyed
/// lists whose entries transition state (blockers).
///
/// # Errors
///
/// Returns `Tie` when two copies of a key have equal `updated` stamps but differ.
pub fn union_last_writer_wins<T, K, U, S>(
    local: Vec<T>,
    remote: Vec<T>,
    key: K,
    updated: U,
    order: S,
) -> Result<Vec<T>, Tie>
where
    T: PartialEq,
    K: Fn(&T) -> String,
    U: Fn(&T) -> DateTime<Utc>,
    S: Fn(&T) -> DateTime<Utc>,
{
    let mut merged: BTreeMap<String, T> = local.into_iter().map(|e| (key(&e), e)).collect();
    for entry in remote {
        let k = key(&entry);
        let replace = match merged.get(&k) {
            Some(existing) => last_writer_wins(existing, &entry, &k, &updated)? == Winner::Remote,
            None => true,
        };
        if replace {
            merged.insert(k, entry);
        }
    }

    let mut out: Vec<(String, T)> = merged.into_iter().collect();
    out.sort_by(|(ka, a), (kb, b)| order(a).cmp(&order(b)).then_with(|| ka.cmp(kb)));
    Ok(out.into_iter().map(|(_, v)| v).collect())
}

/// Per-key last-writer-wins over two maps.
///
/// A key present on one side only is kept. Keys present on both sides are
/// decided independently, so an edit to one key never overrides another.
///
/// # Errors
///
/// Returns `Tie` for the first key that cannot be decided.
pub fn merge_keyed<T, F>(
    local: BTreeMap<String, T>,
    remote: BTreeMap<String, T>,
    stamp: F,
) -> Result<BTreeMap<String, T>, Tie>
where
    T: PartialEq,
    F: Fn(&T) -> DateTime<Utc>,
{
    let mut merged = local;
    for (k, theirs) in remote {
        let replace = match merged.get(&k) {
            Some(ours) => last_writer_wins(ours, &theirs, &k, &stamp)? == Winner::Remote,
            None => true,
        };
        if replace {
            merged.insert(k, theirs);
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: &'static str,
        at: DateTime<Utc>,
        body: &'static str,
    }

    fn t(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(min)
    }

    fn item(id: &'static str, min: i64, body: &'static str) -> Item {
        Item { id, at: t(min), body }
    }

    fn key(i: &Item) -> String {
        i.id.to_string()
    }

    fn stamp(i: &Item) -> DateTime<Utc> {
        i.at
    }

    #[test]
    fn test_union_is_order_independent_and_deduplicated() {
        let a = vec![item("x", 2, "x"), item("y", 1, "y")];
        let b = vec![item("z", 0, "z"), item("x", 2, "x")];

        let ab = union_by_key(a.clone(), b.clone(), key, stamp).unwrap();
        let ba = union_by_key(b, a, key, stamp).unwrap();

        assert_eq!(ab, ba);
        let ids: Vec<_> = ab.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["z", "y", "x"]);
    }

    #[test]
    fn test_union_is_idempotent() {
        let a = vec![item("x", 2, "x"), item("y", 1, "y")];
        let once = union_by_key(a.clone(), a.clone(), key, stamp).unwrap();
        let twice = union_by_key(once.clone(), a, key, stamp).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_union_rejects_edited_entry() {
        let a = vec![item("x", 2, "one")];
        let b = vec![item("x", 2, "two")];
        assert_eq!(union_by_key(a, b, key, stamp).unwrap_err(), Tie::new("x"));
    }

    #[test]
    fn test_last_writer_wins() {
        let old = item("p", 1, "old");
        let new = item("p", 5, "new");
        assert_eq!(last_writer_wins(&old, &new, "p", stamp).unwrap(), Winner::Remote);
        assert_eq!(last_writer_wins(&new, &old, "p", stamp).unwrap(), Winner::Local);
        assert_eq!(last_writer_wins(&new, &new.clone(), "p", stamp).unwrap(), Winner::Local);
        assert!(last_writer_wins(&item("p", 1, "a"), &item("p", 1, "b"), "p", stamp).is_err());
    }

    #[test]
    fn test_merge_keyed_decides_each_key_independently() {
        let local: BTreeMap<String, Item> = [
            ("A".to_string(), item("A", 5, "local-newer")),
            ("B".to_string(), item("B", 1, "local-older")),
        ]
        .into();
        let remote: BTreeMap<String, Item> = [
            ("B".to_string(), item("B", 3, "remote-newer")),
            ("C".to_string(), item("C", 0, "remote-only")),
        ]
        .into();

        let merged = merge_keyed(local, remote, stamp).unwrap();
        assert_eq!(merged["A"].body, "local-newer");
        assert_eq!(merged["B"].body, "remote-newer");
        assert_eq!(merged["C"].body, "remote-only");
    }

    #[test]
    fn test_union_last_writer_wins_takes_newer_copy() {
        let local = vec![item("x", 1, "active")];
        let remote = vec![item("x", 4, "resolved"), item("y", 2, "other")];
        let merged = union_last_writer_wins(local, remote, key, stamp, stamp).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.iter().find(|i| i.id == "x").unwrap().body, "resolved");
    }
}
