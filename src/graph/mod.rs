// src/graph/mod.rs

//! Bidirectional dependency graph over files and tasks.
//!
//! - [`node`] defines [`FileNode`] / [`TaskNode`].
//! - [`select`] implements the reachability walk used for cleaning.
//! - [`depth`] assigns layered depths for diagnostics.
//! - [`cycle`] finds dependency cycles among tasks.
//!
//! Nodes live in two maps keyed by identifier. An edge is recorded on both
//! ends (a task's `file_deps` entry has a matching `file_dep_of` entry on
//! the file), and every mutation keeps the two sides consistent.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

pub mod cycle;
pub mod depth;
pub mod node;
pub mod select;

pub use node::{Depth, FileNode, NodeId, TaskId, TaskNode};

/// Edge sets of one task, as passed to [`DepGraph::add_task`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdges {
    pub name: Option<String>,
    pub targets: Vec<String>,
    pub file_deps: Vec<String>,
    pub dyn_file_deps: Vec<String>,
    pub task_deps: Vec<TaskId>,
    pub generated_files: Vec<String>,
    pub provided_files: Vec<String>,
    pub provided_tasks: Vec<TaskId>,
}

#[derive(Debug, Clone, Default)]
pub struct DepGraph {
    files: BTreeMap<String, FileNode>,
    tasks: BTreeMap<TaskId, TaskNode>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self, path: &str) -> Option<&FileNode> {
        self.files.get(path)
    }

    pub fn task(&self, id: &str) -> Option<&TaskNode> {
        self.tasks.get(id)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileNode> {
        self.files.values()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.tasks.values()
    }

    pub fn contains_task(&self, id: &str) -> bool {
        self.tasks.get(id).is_some_and(|t| t.declared)
    }

    pub fn producer_of(&self, path: &str) -> Option<&str> {
        self.files.get(path).and_then(FileNode::producer)
    }

    /// Files nothing produces.
    pub fn root_files(&self) -> impl Iterator<Item = &FileNode> {
        self.files.values().filter(|f| f.producer().is_none())
    }

    /// Declared tasks without file or task dependencies.
    pub fn root_tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.tasks.values().filter(|t| {
            t.declared && t.file_deps.is_empty() && t.dyn_file_deps.is_empty() && t.task_deps.is_empty()
        })
    }

    fn ensure_file(&mut self, path: &str) -> &mut FileNode {
        self.files
            .entry(path.to_string())
            .or_insert_with(|| FileNode::new(path))
    }

    fn ensure_task(&mut self, id: &str) -> &mut TaskNode {
        self.tasks
            .entry(id.to_string())
            .or_insert_with(|| TaskNode::placeholder(id))
    }

    /// Register a task, or replace the edge sets of an existing one.
    ///
    /// Referenced files and tasks are created on demand. A file can have a
    /// single producer: declaring it as a target takes it away from any
    /// other task that targeted or generated it.
    pub fn add_task(&mut self, id: &str, edges: &TaskEdges) {
        let mut touched = BTreeSet::new();
        if self.tasks.contains_key(id) {
            touched = self.unlink_outgoing(id);
        }

        {
            let node = self.ensure_task(id);
            node.declared = true;
            node.name = edges.name.clone();
        }

        for target in &edges.targets {
            let file = self.ensure_file(target);
            let prev_target = file.target_of.replace(id.to_string());
            let prev_generated = file.generated_of.take();
            if let Some(other) = prev_target.filter(|o| o != id) {
                debug!(file = %target, from = %other, to = %id, "target changes producer");
                if let Some(t) = self.tasks.get_mut(&other) {
                    t.targets.remove(target);
                }
            }
            if let Some(other) = prev_generated.filter(|o| o != id) {
                if let Some(t) = self.tasks.get_mut(&other) {
                    t.generated_files.remove(target);
                }
            }
            self.ensure_task(id).targets.insert(target.clone());
        }

        for generated in &edges.generated_files {
            let file = self.ensure_file(generated);
            match file.target_of.as_deref() {
                Some(owner) if owner != id => {
                    warn!(file = %generated, task = %id, owner = %owner, "generated file is a declared target of another task; ignoring");
                    continue;
                }
                Some(_) => continue,
                None => {}
            }
            let prev = file.generated_of.replace(id.to_string());
            if let Some(other) = prev.filter(|o| o != id) {
                if let Some(t) = self.tasks.get_mut(&other) {
                    t.generated_files.remove(generated);
                }
            }
            self.ensure_task(id).generated_files.insert(generated.clone());
        }

        for provided in &edges.provided_files {
            let file = self.ensure_file(provided);
            let prev = file.provided_of.replace(id.to_string());
            if let Some(other) = prev.filter(|o| o != id) {
                if let Some(t) = self.tasks.get_mut(&other) {
                    t.provided_files.remove(provided);
                }
            }
            self.ensure_task(id).provided_files.insert(provided.clone());
        }

        for dep in &edges.file_deps {
            self.ensure_file(dep).file_dep_of.insert(id.to_string());
            self.ensure_task(id).file_deps.insert(dep.clone());
        }

        for dep in &edges.dyn_file_deps {
            self.ensure_file(dep).dyn_file_dep_of.insert(id.to_string());
            self.ensure_task(id).dyn_file_deps.insert(dep.clone());
        }

        for dep in &edges.task_deps {
            self.ensure_task(dep).task_dep_of.insert(id.to_string());
            self.ensure_task(id).task_deps.insert(dep.clone());
        }

        for sub in &edges.provided_tasks {
            let prev = self.ensure_task(sub).provided_by.replace(id.to_string());
            if let Some(other) = prev.filter(|o| o != id) {
                if let Some(t) = self.tasks.get_mut(&other) {
                    t.provided_tasks.remove(sub);
                }
            }
            self.ensure_task(id).provided_tasks.insert(sub.clone());
        }

        self.reclaim(touched);
    }

    /// Remove a task and every edge touching it, then drop neighbours that
    /// were left without any edge.
    pub fn remove_task(&mut self, id: &str) -> bool {
        if !self.tasks.contains_key(id) {
            return false;
        }
        let mut touched = self.unlink_outgoing(id);

        if let Some(node) = self.tasks.remove(id) {
            for dependent in &node.task_dep_of {
                if let Some(t) = self.tasks.get_mut(dependent) {
                    t.task_deps.remove(id);
                }
            }
            if let Some(parent) = &node.provided_by {
                if let Some(t) = self.tasks.get_mut(parent) {
                    t.provided_tasks.remove(id);
                }
            }
            touched.extend(node.task_dep_of.iter().cloned().map(NodeId::Task));
        }

        debug!(task = %id, "removed task from graph");
        self.reclaim(touched);
        true
    }

    /// Clear every edge the task declares (targets, dependencies, outputs,
    /// provided tasks) on both ends. Incoming task-dependency edges from
    /// other tasks stay in place.
    fn unlink_outgoing(&mut self, id: &str) -> BTreeSet<NodeId> {
        let mut touched = BTreeSet::new();
        let Some(node) = self.tasks.get_mut(id) else {
            return touched;
        };

        let targets = std::mem::take(&mut node.targets);
        let generated = std::mem::take(&mut node.generated_files);
        let provided = std::mem::take(&mut node.provided_files);
        let file_deps = std::mem::take(&mut node.file_deps);
        let dyn_file_deps = std::mem::take(&mut node.dyn_file_deps);
        let task_deps = std::mem::take(&mut node.task_deps);
        let provided_tasks = std::mem::take(&mut node.provided_tasks);

        let owned = |slot: &mut Option<TaskId>| {
            if slot.as_deref() == Some(id) {
                *slot = None;
            }
        };

        for path in targets.iter().chain(&generated).chain(&provided) {
            if let Some(file) = self.files.get_mut(path) {
                owned(&mut file.target_of);
                owned(&mut file.generated_of);
                owned(&mut file.provided_of);
                touched.insert(NodeId::File(path.clone()));
            }
        }
        for path in &file_deps {
            if let Some(file) = self.files.get_mut(path) {
                file.file_dep_of.remove(id);
                touched.insert(NodeId::File(path.clone()));
            }
        }
        for path in &dyn_file_deps {
            if let Some(file) = self.files.get_mut(path) {
                file.dyn_file_dep_of.remove(id);
                touched.insert(NodeId::File(path.clone()));
            }
        }
        for dep in &task_deps {
            if let Some(t) = self.tasks.get_mut(dep) {
                t.task_dep_of.remove(id);
                touched.insert(NodeId::Task(dep.clone()));
            }
        }
        for sub in &provided_tasks {
            if let Some(t) = self.tasks.get_mut(sub) {
                owned(&mut t.provided_by);
                touched.insert(NodeId::Task(sub.clone()));
            }
        }
        touched
    }

    fn reclaim(&mut self, touched: BTreeSet<NodeId>) {
        for node in touched {
            match node {
                NodeId::File(path) => {
                    if self.files.get(&path).is_some_and(FileNode::is_floating) {
                        self.files.remove(&path);
                    }
                }
                NodeId::Task(id) => {
                    if self.tasks.get(&id).is_some_and(TaskNode::is_floating) {
                        self.tasks.remove(&id);
                    }
                }
            }
        }
    }

    /// Resolve a user-supplied identifier to a node: task ids win over
    /// file paths.
    pub fn resolve(&self, id: &str) -> Option<NodeId> {
        if self.contains_task(id) {
            return Some(NodeId::Task(id.to_string()));
        }
        let path = crate::fs::normalize_path(id);
        if self.files.contains_key(&path) {
            return Some(NodeId::File(path));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(targets: &[&str], deps: &[&str]) -> TaskEdges {
        TaskEdges {
            targets: targets.iter().map(|s| s.to_string()).collect(),
            file_deps: deps.iter().map(|s| s.to_string()).collect(),
            ..TaskEdges::default()
        }
    }

    #[test]
    fn add_task_mirrors_edges_on_both_ends() {
        let mut g = DepGraph::new();
        g.add_task("cc", &edges(&["a.o"], &["a.c"]));

        assert_eq!(g.producer_of("a.o"), Some("cc"));
        assert!(g.file("a.c").unwrap().file_dep_of.contains("cc"));
        assert!(g.task("cc").unwrap().file_deps.contains("a.c"));
        assert_eq!(g.root_files().map(|f| f.path.as_str()).collect::<Vec<_>>(), vec!["a.c"]);
    }

    #[test]
    fn re_adding_replaces_edges_and_reclaims_floating_files() {
        let mut g = DepGraph::new();
        g.add_task("cc", &edges(&["a.o"], &["a.c", "old.h"]));
        g.add_task("cc", &edges(&["a.o"], &["a.c"]));

        assert!(g.file("old.h").is_none());
        assert_eq!(g.task("cc").unwrap().file_deps.len(), 1);
    }

    #[test]
    fn remove_task_unlinks_both_directions() {
        let mut g = DepGraph::new();
        g.add_task("gen", &edges(&["gen.c"], &["cfg"]));
        g.add_task(
            "link",
            &TaskEdges {
                task_deps: vec!["gen".into()],
                ..edges(&["app"], &["gen.c"])
            },
        );

        assert!(g.remove_task("gen"));
        assert!(g.task("gen").is_none());
        assert!(g.file("cfg").is_none(), "cfg only fed gen");
        assert!(g.task("link").unwrap().task_deps.is_empty());
        let gen_c = g.file("gen.c").unwrap();
        assert_eq!(gen_c.producer(), None);
        assert!(gen_c.file_dep_of.contains("link"));
    }

    #[test]
    fn target_declaration_takes_over_generated_file() {
        let mut g = DepGraph::new();
        g.add_task(
            "gen",
            &TaskEdges {
                generated_files: vec!["x.c".into()],
                ..TaskEdges::default()
            },
        );
        g.add_task("explicit", &edges(&["x.c"], &[]));

        let file = g.file("x.c").unwrap();
        assert_eq!(file.target_of.as_deref(), Some("explicit"));
        assert_eq!(file.generated_of, None);
        assert!(g.task("gen").unwrap().generated_files.is_empty());
    }

    #[test]
    fn undeclared_task_dependency_is_a_placeholder() {
        let mut g = DepGraph::new();
        g.add_task(
            "b",
            &TaskEdges {
                task_deps: vec!["a".into()],
                ..TaskEdges::default()
            },
        );
        assert!(!g.contains_task("a"));
        assert!(g.task("a").is_some());

        g.remove_task("b");
        assert!(g.task("a").is_none(), "placeholder reclaimed once unreferenced");
    }
}
