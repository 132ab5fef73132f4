// src/hash/mod.rs

//! Content hashing.
//!
//! - [`compute_file_hash`] hashes a single file through the filesystem
//!   collaborator using blake3.
//! - [`store`] holds the per-path (persisted, current) hash pairs used by
//!   the up-to-date checks.

use std::path::Path;

use anyhow::{Context, Result};
use blake3::Hasher;

use crate::fs::FileSystem;

pub mod store;

pub use store::{HashEntry, HashStore};

/// Compute the hash of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let content = fs
        .read(path)
        .with_context(|| format!("reading file for hashing: {:?}", path))?;
    let mut hasher = Hasher::new();
    hasher.update(&content);
    Ok(hasher.finalize().to_hex().to_string())
}
