// src/fs/mod.rs

//! Filesystem collaborator.
//!
//! The engine never touches storage directly: every read, write, stat and
//! removal goes through a [`FileSystem`] so the same build can run against
//! the real disk or against [`mock::MockFileSystem`] in tests.

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

pub mod mock;
pub mod path;

pub use path::normalize_path;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).with_context(|| format!("decoding {:?} as UTF-8", path))
    }

    /// Write `contents` to `path`, creating missing parent directories when
    /// `make_dirs` is set.
    fn write(&self, path: &Path, contents: &[u8], make_dirs: bool) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn remove(&self, path: &Path) -> Result<()>;

    /// Remove an *empty* directory.
    fn remove_dir(&self, path: &Path) -> Result<()>;

    /// Return a list of entries in a directory.
    /// Returns full paths.
    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
    fn mod_time(&self, path: &Path) -> Result<SystemTime>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
}

/// Implementation that uses `std::fs`, resolving relative paths against a
/// project root.
#[derive(Debug, Clone)]
pub struct RealFileSystem {
    root: PathBuf,
}

impl RealFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Default for RealFileSystem {
    fn default() -> Self {
        Self::new(".")
    }
}

impl FileSystem for RealFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(self.resolve(path)).with_context(|| format!("reading file {:?}", path))
    }

    fn write(&self, path: &Path, contents: &[u8], make_dirs: bool) -> Result<()> {
        let full = self.resolve(path);
        if make_dirs {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
            }
        }
        fs::write(&full, contents).with_context(|| format!("writing to file {:?}", path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.resolve(path).is_dir()
    }

    fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(self.resolve(path)).with_context(|| format!("removing file {:?}", path))
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        fs::remove_dir(self.resolve(path)).with_context(|| format!("removing dir {:?}", path))
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path)).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry?;
            entries.push(path.join(entry.file_name()));
        }
        Ok(entries)
    }

    fn mod_time(&self, path: &Path) -> Result<SystemTime> {
        let meta = fs::metadata(self.resolve(path)).with_context(|| format!("stat {:?}", path))?;
        meta.modified().with_context(|| format!("reading mtime of {:?}", path))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(self.resolve(from), self.resolve(to))
            .with_context(|| format!("renaming {:?} to {:?}", from, to))
    }
}
