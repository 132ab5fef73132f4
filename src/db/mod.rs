// src/db/mod.rs

//! Persisted build state.
//!
//! One JSON document per project:
//!
//! ```json
//! {
//!   "version": [1, 0, 0],
//!   "HashDict": { "src/a.txt": "af13…", "gone.txt": null },
//!   "Task": { "out/concat.txt": { "trgs": ["out/concat.txt"], "fDeps": ["src/a.txt"], "meta": {} } },
//!   "FilesToClean": ["tmp/scratch"]
//! }
//! ```
//!
//! Loading never fails: a missing, unreadable or malformed document only
//! produces a warning and an empty state, which means a full rebuild.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::fs::FileSystem;
use crate::graph::{TaskEdges, TaskId};

/// Format version written by this crate. Documents with a different major
/// version are ignored.
pub const DB_VERSION: [u32; 3] = [1, 0, 0];

/// Default location of the document, relative to the project root.
pub const DEFAULT_DB_PATH: &str = ".builddag.json";

/// What a task looked like at the end of its last successful run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "trgs", default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
    #[serde(rename = "fDeps", default, skip_serializing_if = "Vec::is_empty")]
    pub file_deps: Vec<String>,
    #[serde(rename = "dfDeps", default, skip_serializing_if = "Vec::is_empty")]
    pub dyn_file_deps: Vec<String>,
    #[serde(rename = "tDeps", default, skip_serializing_if = "Vec::is_empty")]
    pub task_deps: Vec<TaskId>,
    #[serde(rename = "gFiles", default, skip_serializing_if = "Vec::is_empty")]
    pub generated_files: Vec<String>,
    #[serde(rename = "pFiles", default, skip_serializing_if = "Vec::is_empty")]
    pub provided_files: Vec<String>,
    #[serde(rename = "pTasks", default, skip_serializing_if = "Vec::is_empty")]
    pub provided_tasks: Vec<TaskId>,
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
}

impl TaskRecord {
    pub fn edges(&self) -> TaskEdges {
        TaskEdges {
            name: self.name.clone(),
            targets: self.targets.clone(),
            file_deps: self.file_deps.clone(),
            dyn_file_deps: self.dyn_file_deps.clone(),
            task_deps: self.task_deps.clone(),
            generated_files: self.generated_files.clone(),
            provided_files: self.provided_files.clone(),
            provided_tasks: self.provided_tasks.clone(),
        }
    }

    /// Every file path the record mentions.
    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.targets
            .iter()
            .chain(&self.file_deps)
            .chain(&self.dyn_file_deps)
            .chain(&self.generated_files)
            .chain(&self.provided_files)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbDocument {
    pub version: [u32; 3],
    #[serde(rename = "HashDict")]
    pub hash_dict: BTreeMap<String, Option<String>>,
    #[serde(rename = "Task")]
    pub tasks: BTreeMap<TaskId, TaskRecord>,
    #[serde(rename = "FilesToClean", default)]
    pub files_to_clean: BTreeSet<String>,
}

impl Default for DbDocument {
    fn default() -> Self {
        Self {
            version: DB_VERSION,
            hash_dict: BTreeMap::new(),
            tasks: BTreeMap::new(),
            files_to_clean: BTreeSet::new(),
        }
    }
}

/// Load the document at `path`, falling back to an empty one.
pub fn load_document(fs: &dyn FileSystem, path: &str) -> DbDocument {
    let p = Path::new(path);
    if !fs.exists(p) {
        debug!(path = %path, "no build database yet; starting from scratch");
        return DbDocument::default();
    }

    let text = match fs.read_to_string(p) {
        Ok(text) => text,
        Err(err) => {
            warn!(path = %path, error = %err, "cannot read build database; doing a full rebuild");
            return DbDocument::default();
        }
    };

    match serde_json::from_str::<DbDocument>(&text) {
        Ok(doc) if doc.version[0] == DB_VERSION[0] => {
            info!(
                path = %path,
                tasks = doc.tasks.len(),
                hashes = doc.hash_dict.len(),
                "loaded build database"
            );
            doc
        }
        Ok(doc) => {
            warn!(
                path = %path,
                found = ?doc.version,
                expected = ?DB_VERSION,
                "build database has an incompatible version; doing a full rebuild"
            );
            DbDocument::default()
        }
        Err(err) => {
            warn!(path = %path, error = %err, "malformed build database; doing a full rebuild");
            DbDocument::default()
        }
    }
}

/// Write the document through a temporary file and a rename so a crash
/// never leaves a half-written database behind.
pub fn save_document(fs: &dyn FileSystem, path: &str, doc: &DbDocument) -> Result<()> {
    let text = serde_json::to_string_pretty(doc).context("serialising build database")?;
    let tmp = format!("{path}.tmp");
    fs.write(Path::new(&tmp), text.as_bytes(), true)
        .with_context(|| format!("writing build database to {tmp}"))?;
    fs.rename(Path::new(&tmp), Path::new(path))
        .with_context(|| format!("moving build database into place at {path}"))?;
    debug!(path = %path, tasks = doc.tasks.len(), "saved build database");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn sample() -> DbDocument {
        let mut doc = DbDocument::default();
        doc.hash_dict.insert("src/a.txt".into(), Some("abc".into()));
        doc.hash_dict.insert("gone.txt".into(), None);
        doc.tasks.insert(
            "gen".into(),
            TaskRecord {
                name: Some("gen".into()),
                file_deps: vec!["cfg".into()],
                generated_files: vec!["g/a.c".into()],
                meta: BTreeMap::from([("runs".to_string(), Value::from(2))]),
                ..TaskRecord::default()
            },
        );
        doc.files_to_clean.insert("tmp/x".into());
        doc
    }

    #[test]
    fn save_then_load_returns_same_document() {
        let fs = MockFileSystem::new();
        save_document(&fs, "state/db.json", &sample()).unwrap();
        assert!(!fs.exists(Path::new("state/db.json.tmp")));
        assert_eq!(load_document(&fs, "state/db.json"), sample());
    }

    #[test]
    fn serialised_keys_use_short_names() {
        let text = serde_json::to_string(&sample()).unwrap();
        assert!(text.contains("\"HashDict\""));
        assert!(text.contains("\"fDeps\""));
        assert!(text.contains("\"gFiles\""));
        assert!(!text.contains("\"trgs\""), "empty lists are omitted");
    }

    #[test]
    fn corrupt_or_incomplete_documents_load_as_empty() {
        let fs = MockFileSystem::new();
        fs.add_file("bad.json", "{ not json");
        assert_eq!(load_document(&fs, "bad.json"), DbDocument::default());

        fs.add_file("partial.json", r#"{"version":[1,0,0],"HashDict":{}}"#);
        assert_eq!(load_document(&fs, "partial.json"), DbDocument::default());

        fs.add_file("future.json", r#"{"version":[9,0,0],"HashDict":{},"Task":{}}"#);
        assert_eq!(load_document(&fs, "future.json"), DbDocument::default());

        assert_eq!(load_document(&fs, "missing.json"), DbDocument::default());
    }
}
