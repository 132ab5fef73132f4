// src/hash/store.rs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::fs::FileSystem;
use crate::hash::compute_file_hash;

/// Persisted and freshly computed hash of one path.
///
/// `old` comes from the previous run's database; `new` is filled in lazily
/// the first time somebody asks for it during this run. A missing file has
/// no hash, so it never matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashEntry {
    old: Option<String>,
    new: Option<String>,
    computed: bool,
}

impl HashEntry {
    pub fn old(&self) -> Option<&str> {
        self.old.as_deref()
    }

    pub fn current(&self) -> Option<&str> {
        self.new.as_deref()
    }

    pub fn is_computed(&self) -> bool {
        self.computed
    }

    /// Both hashes present and equal.
    pub fn matches(&self) -> bool {
        match (&self.old, &self.new) {
            (Some(old), Some(new)) => old == new,
            _ => false,
        }
    }

    /// Value written to the database: the fresh hash when known, otherwise
    /// whatever was loaded.
    fn persisted(&self) -> Option<String> {
        if self.computed {
            self.new.clone()
        } else {
            self.old.clone()
        }
    }
}

type SharedEntry = Arc<Mutex<HashEntry>>;

/// Path → [`HashEntry`] map shared by all workers.
///
/// The map itself is behind one lock; each entry has its own lock held for
/// the duration of hashing, so different files hash in parallel while two
/// tasks asking for the same file wait for a single computation.
#[derive(Debug)]
pub struct HashStore {
    fs: Arc<dyn FileSystem>,
    entries: Mutex<HashMap<String, SharedEntry>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl HashStore {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Seed `old` hashes from a persisted dictionary.
    pub fn load(&self, dict: &BTreeMap<String, Option<String>>) {
        let mut entries = lock(&self.entries);
        entries.clear();
        for (path, hash) in dict {
            let entry = HashEntry {
                old: hash.clone(),
                new: None,
                computed: false,
            };
            entries.insert(path.clone(), Arc::new(Mutex::new(entry)));
        }
        debug!(entries = entries.len(), "hash store loaded");
    }

    fn entry(&self, path: &str) -> SharedEntry {
        let mut entries = lock(&self.entries);
        Arc::clone(entries.entry(path.to_string()).or_default())
    }

    fn compute(&self, path: &str) -> Option<String> {
        let p = Path::new(path);
        if !self.fs.is_file(p) {
            return None;
        }
        match compute_file_hash(self.fs.as_ref(), p) {
            Ok(hash) => Some(hash),
            Err(err) => {
                warn!(path = %path, error = %err, "failed to hash file");
                None
            }
        }
    }

    /// Snapshot of the entry for `path`, computing the current hash first if
    /// this run has not done so yet.
    pub fn get(&self, path: &str) -> HashEntry {
        let shared = self.entry(path);
        let mut entry = lock(&shared);
        if !entry.computed {
            entry.new = self.compute(path);
            entry.computed = true;
            debug!(path = %path, hash = ?entry.new, "computed hash");
        }
        entry.clone()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.get(path).matches()
    }

    /// Recompute the current hash, e.g. after an action rewrote the file.
    pub fn refresh(&self, path: &str) -> Option<String> {
        let shared = self.entry(path);
        let mut entry = lock(&shared);
        entry.new = self.compute(path);
        entry.computed = true;
        entry.new.clone()
    }

    /// Forget this run's hash of `path` so the next [`get`](Self::get)
    /// recomputes it.
    pub fn invalidate(&self, path: &str) {
        let shared = self.entry(path);
        let mut entry = lock(&shared);
        entry.new = None;
        entry.computed = false;
    }

    /// Drop everything known about `path` (used when the file is cleaned).
    pub fn forget(&self, path: &str) {
        lock(&self.entries).remove(path);
    }

    /// Paths whose hash was computed this run and differs from the
    /// persisted one.
    pub fn changed_paths(&self) -> HashSet<String> {
        let entries = lock(&self.entries);
        entries
            .iter()
            .filter(|(_, shared)| {
                let entry = lock(shared);
                entry.computed && entry.old != entry.new
            })
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Dictionary to persist.
    pub fn snapshot(&self) -> BTreeMap<String, Option<String>> {
        let entries = lock(&self.entries);
        entries
            .iter()
            .map(|(path, shared)| (path.clone(), lock(shared).persisted()))
            .collect()
    }

    /// Start a new run: what was persisted becomes `old`, nothing is
    /// computed.
    pub fn roll_over(&self) {
        let entries = lock(&self.entries);
        for shared in entries.values() {
            let mut entry = lock(shared);
            entry.old = entry.persisted();
            entry.new = None;
            entry.computed = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn store_with(fs: &MockFileSystem) -> HashStore {
        HashStore::new(Arc::new(fs.clone()))
    }

    #[test]
    fn fresh_entry_never_matches() {
        let fs = MockFileSystem::new();
        fs.add_file("a.txt", "a");
        let store = store_with(&fs);

        let entry = store.get("a.txt");
        assert!(entry.is_computed());
        assert!(entry.current().is_some());
        assert!(!entry.matches());
    }

    #[test]
    fn snapshot_round_trip_preserves_verdicts() {
        let fs = MockFileSystem::new();
        fs.add_file("a.txt", "a");
        fs.add_file("b.txt", "b");

        let first = store_with(&fs);
        first.get("a.txt");
        first.get("b.txt");
        first.get("missing.txt");
        let dict = first.snapshot();
        assert_eq!(dict.get("missing.txt"), Some(&None));

        fs.add_file("b.txt", "B");
        let second = store_with(&fs);
        second.load(&dict);
        assert!(second.matches("a.txt"));
        assert!(!second.matches("b.txt"));
        assert!(!second.matches("missing.txt"));
        assert_eq!(
            second.changed_paths(),
            HashSet::from(["b.txt".to_string()])
        );
    }

    #[test]
    fn uncomputed_entries_persist_their_old_hash() {
        let fs = MockFileSystem::new();
        let store = store_with(&fs);
        let dict = BTreeMap::from([("gone.txt".to_string(), Some("abc".to_string()))]);
        store.load(&dict);
        assert_eq!(store.snapshot(), dict);
    }

    #[test]
    fn refresh_and_roll_over_track_rewrites() {
        let fs = MockFileSystem::new();
        fs.add_file("t.txt", "1");
        let store = store_with(&fs);
        let before = store.get("t.txt").current().map(str::to_string);

        fs.add_file("t.txt", "2");
        // Cached until refreshed.
        assert_eq!(store.get("t.txt").current().map(str::to_string), before);
        let after = store.refresh("t.txt");
        assert_ne!(after, before);

        store.roll_over();
        assert!(store.matches("t.txt"));
    }
}
