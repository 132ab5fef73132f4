// src/engine/clean.rs

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, error, info};

use crate::engine::Builder;
use crate::fs::path::parent_dir;
use crate::graph::select::SelectOptions;
use crate::graph::NodeId;

impl Builder {
    /// Delete the files produced by `ids` (task ids or file paths) and by
    /// everything they exclusively depend on. With no ids, clean every known
    /// task and every file registered for cleaning.
    ///
    /// Source files (files nothing produces) are never touched. Directories
    /// left empty are removed. Returns `true` when every selected file could
    /// be removed.
    pub fn clean(&self, ids: &[&str]) -> bool {
        let mut guard = self.lock();
        let st = &mut *guard;
        let everything = ids.is_empty();

        let start: Vec<String> = if everything {
            st.graph.tasks().map(|t| t.id.clone()).collect()
        } else {
            ids.iter().map(|s| s.to_string()).collect()
        };
        let refs: Vec<&str> = start.iter().map(String::as_str).collect();
        let selected = st.graph.select_right(
            &refs,
            SelectOptions {
                max_depth: None,
                exclusive_childs: true,
                select_top_outputs: true,
                leave_leaves: true,
            },
        );

        let mut files = BTreeSet::new();
        let mut tasks = Vec::new();
        for node in selected {
            match node {
                NodeId::File(path) => {
                    files.insert(path);
                }
                NodeId::Task(id) => tasks.push(id),
            }
        }
        if everything {
            files.extend(st.files_to_clean.iter().cloned());
        }
        info!(files = files.len(), tasks = tasks.len(), "cleaning");

        let mut ok = true;
        let mut dirs = BTreeSet::new();
        for path in &files {
            let p = Path::new(path);
            if self.fs().is_file(p) {
                if let Err(err) = self.fs().remove(p) {
                    error!(path = %path, error = %err, "failed to remove file");
                    ok = false;
                    continue;
                }
                debug!(path = %path, "removed");
                if let Some(parent) = parent_dir(path) {
                    dirs.insert(parent);
                }
            }
            self.hashes().forget(path);
            st.files_to_clean.remove(path);
        }
        self.remove_empty_dirs(dirs);

        for id in &tasks {
            st.records.remove(id);
            st.graph.remove_task(id);
            if let Some(task) = st.tasks.get(id) {
                let edges = task.edges(None);
                st.graph.add_task(id, &edges);
            }
        }

        let doc = self.document(st);
        if let Err(err) = crate::db::save_document(self.fs(), &self.options().db_path, &doc) {
            error!(error = %err, "failed to save build database after cleaning");
            ok = false;
        }
        ok
    }

    /// Remove each directory that became empty, then its parents while they
    /// are empty too. Deepest directories go first.
    fn remove_empty_dirs(&self, dirs: BTreeSet<String>) {
        let mut dirs: Vec<String> = dirs.into_iter().collect();
        dirs.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));

        for dir in dirs {
            let mut current = Some(dir);
            while let Some(d) = current {
                if d == "." || d == "/" {
                    break;
                }
                let p = Path::new(&d);
                let empty = self.fs().is_dir(p)
                    && self.fs().list_dir(p).map(|c| c.is_empty()).unwrap_or(false);
                if !empty || self.fs().remove_dir(p).is_err() {
                    break;
                }
                debug!(dir = %d, "removed empty directory");
                current = parent_dir(&d);
            }
        }
    }
}
