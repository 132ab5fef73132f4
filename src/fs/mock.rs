// src/fs/mock.rs

use super::FileSystem;
use super::path::{normalize_path, parent_dir};
use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File { content: Vec<u8>, modified: SystemTime },
    Dir,
}

/// In-memory filesystem.
///
/// Modification times come from a logical clock that advances by one second
/// on every write, so timestamp comparisons are deterministic. Clones share
/// the same storage.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    clock: Arc<AtomicU64>,
    writes: Arc<AtomicUsize>,
    locked: Arc<Mutex<HashSet<PathBuf>>>,
}

fn key(path: &Path) -> PathBuf {
    PathBuf::from(normalize_path(&path.to_string_lossy()))
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        // Ensure root exists
        files.insert(PathBuf::from("."), MockEntry::Dir);

        Self {
            files: Arc::new(Mutex::new(files)),
            clock: Arc::new(AtomicU64::new(1)),
            writes: Arc::new(AtomicUsize::new(0)),
            locked: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn tick(&self) -> SystemTime {
        let t = self.clock.fetch_add(1, Ordering::SeqCst);
        SystemTime::UNIX_EPOCH + Duration::from_secs(t)
    }

    /// Create or replace a file, creating parent directories implicitly.
    ///
    /// Unlike [`FileSystem::write`] this does not count as a write.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = key(path.as_ref());
        let modified = self.tick();
        let mut files = self.lock();
        Self::ensure_parent_dirs(&mut files, &path);
        files.insert(path, MockEntry::File { content: content.into(), modified });
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = key(path.as_ref());
        let mut files = self.lock();
        Self::ensure_parent_dirs(&mut files, &path);
        files.entry(path).or_insert(MockEntry::Dir);
    }

    /// Convenience accessor for assertions.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        match self.lock().get(&key(path.as_ref())) {
            Some(MockEntry::File { content, .. }) => String::from_utf8(content.clone()).ok(),
            _ => None,
        }
    }

    /// Bump a file's modification time without changing its content.
    pub fn touch(&self, path: impl AsRef<Path>) {
        let modified_now = self.tick();
        if let Some(MockEntry::File { modified, .. }) = self.lock().get_mut(&key(path.as_ref())) {
            *modified = modified_now;
        }
    }

    /// Make every later `remove` of `path` fail, as for a read-only file.
    pub fn deny_removal(&self, path: impl AsRef<Path>) {
        self.locked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key(path.as_ref()));
    }

    /// Number of [`FileSystem::write`] calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn ensure_parent_dirs(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        let mut current = parent_dir(&path.to_string_lossy());
        while let Some(dir) = current {
            let dir_key = PathBuf::from(&dir);
            if files.contains_key(&dir_key) {
                break;
            }
            files.insert(dir_key, MockEntry::Dir);
            current = parent_dir(&dir);
        }
    }

    fn children(files: &HashMap<PathBuf, MockEntry>, dir: &Path) -> Vec<PathBuf> {
        let dir_str = dir.to_string_lossy();
        let mut out: Vec<PathBuf> = files
            .keys()
            .filter(|p| p.as_path() != dir)
            .filter(|p| parent_dir(&p.to_string_lossy()).as_deref() == Some(dir_str.as_ref()))
            .cloned()
            .collect();
        out.sort();
        out
    }
}

impl FileSystem for MockFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let files = self.lock();
        match files.get(&key(path)) {
            Some(MockEntry::File { content, .. }) => Ok(content.clone()),
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8], make_dirs: bool) -> Result<()> {
        let path = key(path);
        let modified = self.tick();
        let mut files = self.lock();
        if let Some(parent) = parent_dir(&path.to_string_lossy()) {
            match files.get(&PathBuf::from(&parent)) {
                Some(MockEntry::Dir) => {}
                Some(MockEntry::File { .. }) => return Err(anyhow!("Not a directory: {parent}")),
                None if make_dirs => Self::ensure_parent_dirs(&mut files, &path),
                None => return Err(anyhow!("Parent directory missing: {parent}")),
            }
        }
        if matches!(files.get(&path), Some(MockEntry::Dir)) {
            return Err(anyhow!("Is a directory: {:?}", path));
        }
        files.insert(path, MockEntry::File { content: contents.to_vec(), modified });
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(&key(path))
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().get(&key(path)), Some(MockEntry::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().get(&key(path)), Some(MockEntry::Dir))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let path = key(path);
        if self.locked.lock().unwrap_or_else(|p| p.into_inner()).contains(&path) {
            return Err(anyhow!("Permission denied: {:?}", path));
        }
        let mut files = self.lock();
        match files.get(&path) {
            Some(MockEntry::File { .. }) => {
                files.remove(&path);
                Ok(())
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        let path = key(path);
        let mut files = self.lock();
        match files.get(&path) {
            Some(MockEntry::Dir) => {
                if !Self::children(&files, &path).is_empty() {
                    return Err(anyhow!("Directory not empty: {:?}", path));
                }
                files.remove(&path);
                Ok(())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let path = key(path);
        let files = self.lock();
        match files.get(&path) {
            Some(MockEntry::Dir) => Ok(Self::children(&files, &path)),
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }

    fn mod_time(&self, path: &Path) -> Result<SystemTime> {
        match self.lock().get(&key(path)) {
            Some(MockEntry::File { modified, .. }) => Ok(*modified),
            Some(MockEntry::Dir) => Ok(SystemTime::UNIX_EPOCH),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let (from, to) = (key(from), key(to));
        let mut files = self.lock();
        let entry = files
            .remove(&from)
            .ok_or_else(|| anyhow!("File not found: {:?}", from))?;
        Self::ensure_parent_dirs(&mut files, &to);
        files.insert(to, entry);
        Ok(())
    }
}
