// src/task/context.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::db::TaskRecord;
use crate::fs::normalize_path;
use crate::task::Task;

/// Per-run view of a task handed to its callbacks.
///
/// Generated/provided lists and discovered dynamic dependencies start empty
/// each time the action runs; an up-to-date verdict instead seeds them from
/// the previous run's record so downstream consumers still see them.
#[derive(Debug)]
pub struct TaskContext {
    task: Arc<Task>,
    saved: Option<TaskRecord>,
    meta: BTreeMap<String, Value>,
    generated_files: Vec<String>,
    provided_files: Vec<String>,
    provided_tasks: Vec<String>,
    discovered_deps: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

impl TaskContext {
    pub fn new(task: Arc<Task>, saved: Option<TaskRecord>) -> Self {
        let meta = saved.as_ref().map(|r| r.meta.clone()).unwrap_or_default();
        Self {
            task,
            saved,
            meta,
            generated_files: Vec::new(),
            provided_files: Vec::new(),
            provided_tasks: Vec::new(),
            discovered_deps: Vec::new(),
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn id(&self) -> &str {
        &self.task.id
    }

    pub fn targets(&self) -> &[String] {
        &self.task.targets
    }

    pub fn file_deps(&self) -> &[String] {
        &self.task.file_deps
    }

    /// Record persisted by the last successful run, if any.
    pub fn saved(&self) -> Option<&TaskRecord> {
        self.saved.as_ref()
    }

    /// Free-form data persisted with the task across runs.
    pub fn meta(&self) -> &BTreeMap<String, Value> {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.meta
    }

    pub fn add_generated_file(&mut self, path: impl AsRef<str>) {
        push_unique(&mut self.generated_files, normalize_path(path.as_ref()));
    }

    pub fn add_provided_file(&mut self, path: impl AsRef<str>) {
        push_unique(&mut self.provided_files, normalize_path(path.as_ref()));
    }

    /// Report a file the action read that was not declared up front (for
    /// example a header found while compiling). It is hashed by the next
    /// run's up-to-date check.
    pub fn add_dyn_file_dep(&mut self, path: impl AsRef<str>) {
        push_unique(&mut self.discovered_deps, normalize_path(path.as_ref()));
    }

    pub fn generated_files(&self) -> &[String] {
        &self.generated_files
    }

    pub fn provided_files(&self) -> &[String] {
        &self.provided_files
    }

    pub fn provided_tasks(&self) -> &[String] {
        &self.provided_tasks
    }

    /// Declared dynamic dependencies plus those discovered by the action.
    pub fn dyn_file_deps(&self) -> Vec<String> {
        let mut all = self.task.dyn_file_deps.clone();
        for dep in &self.discovered_deps {
            push_unique(&mut all, dep.clone());
        }
        all
    }

    pub(crate) fn set_provided_tasks(&mut self, ids: Vec<String>) {
        self.provided_tasks.clear();
        for id in ids {
            push_unique(&mut self.provided_tasks, id);
        }
    }

    pub(crate) fn reset_outputs(&mut self) {
        self.generated_files.clear();
        self.provided_files.clear();
        self.provided_tasks.clear();
        self.discovered_deps.clear();
    }

    /// Carry the previous run's outputs forward after an up-to-date verdict.
    pub(crate) fn seed_from_saved(&mut self) {
        self.reset_outputs();
        if let Some(saved) = &self.saved {
            self.generated_files = saved.generated_files.clone();
            self.provided_files = saved.provided_files.clone();
            self.provided_tasks = saved.provided_tasks.clone();
            self.discovered_deps = saved.dyn_file_deps.clone();
        }
    }

    /// Record to persist after this run completed successfully.
    pub fn to_record(&self) -> TaskRecord {
        TaskRecord {
            name: self.task.name.clone(),
            targets: self.task.targets.clone(),
            file_deps: self.task.file_deps.clone(),
            dyn_file_deps: self.dyn_file_deps(),
            task_deps: self.task.task_deps.clone(),
            generated_files: self.generated_files.clone(),
            provided_files: self.provided_files.clone(),
            provided_tasks: self.provided_tasks.clone(),
            meta: self.meta.clone(),
        }
    }
}
