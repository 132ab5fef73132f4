// src/graph/node.rs

//! Node types of the dependency graph.
//!
//! Nodes never own each other: every edge is an identifier stored on both
//! endpoints, and [`super::DepGraph`] keeps the two sides in step.

use std::collections::BTreeSet;

/// Canonical task identity: the explicit name, or the first target path.
pub type TaskId = String;

/// Minimum and maximum distance from a root, filled in by
/// [`super::DepGraph::calc_depths`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Depth {
    pub lower: usize,
    pub higher: usize,
}

/// Identifier of either kind of node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    File(String),
    Task(TaskId),
}

impl NodeId {
    pub fn as_str(&self) -> &str {
        match self {
            NodeId::File(s) | NodeId::Task(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FileNode {
    pub path: String,
    /// Task declaring this file as a target.
    pub target_of: Option<TaskId>,
    /// Task whose action reported this file as generated.
    pub generated_of: Option<TaskId>,
    /// Task whose action provided this file for a further build step.
    pub provided_of: Option<TaskId>,
    pub file_dep_of: BTreeSet<TaskId>,
    pub dyn_file_dep_of: BTreeSet<TaskId>,
    pub depth: Option<Depth>,
}

impl FileNode {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Self::default()
        }
    }

    /// The task that brings this file into existence, if any.
    pub fn producer(&self) -> Option<&str> {
        self.target_of
            .as_deref()
            .or(self.generated_of.as_deref())
            .or(self.provided_of.as_deref())
    }

    pub fn consumers(&self) -> impl Iterator<Item = &TaskId> {
        self.file_dep_of.union(&self.dyn_file_dep_of)
    }

    pub fn is_floating(&self) -> bool {
        self.producer().is_none() && self.file_dep_of.is_empty() && self.dyn_file_dep_of.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskNode {
    pub id: TaskId,
    pub name: Option<String>,
    /// False for placeholders created because another task named this one
    /// as a dependency before it was added.
    pub declared: bool,
    pub targets: BTreeSet<String>,
    pub file_deps: BTreeSet<String>,
    pub dyn_file_deps: BTreeSet<String>,
    pub task_deps: BTreeSet<TaskId>,
    pub task_dep_of: BTreeSet<TaskId>,
    pub generated_files: BTreeSet<String>,
    pub provided_files: BTreeSet<String>,
    pub provided_tasks: BTreeSet<TaskId>,
    pub provided_by: Option<TaskId>,
    pub depth: Option<Depth>,
}

impl TaskNode {
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// Targets, generated and provided files.
    pub fn outputs(&self) -> impl Iterator<Item = &String> {
        self.targets
            .iter()
            .chain(self.generated_files.iter())
            .chain(self.provided_files.iter())
    }

    pub fn is_floating(&self) -> bool {
        !self.declared && self.task_dep_of.is_empty() && self.provided_by.is_none()
    }
}
