// src/graph/select.rs

//! Reachability selection in the dependency direction.

use std::collections::{HashSet, VecDeque};

use super::{DepGraph, NodeId};

/// Options for [`DepGraph::select_right`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectOptions {
    /// Stop descending after this many steps from the start nodes.
    pub max_depth: Option<usize>,
    /// Only select a node once every node that needs it has been selected.
    pub exclusive_childs: bool,
    /// Also select the outputs of start tasks.
    pub select_top_outputs: bool,
    /// Never select files that no task produces (sources).
    pub leave_leaves: bool,
}

impl DepGraph {
    /// Nodes a node depends on: a task's file and task dependencies plus
    /// the tasks its factory provided; a file's producer.
    fn children(&self, node: &NodeId) -> Vec<NodeId> {
        match node {
            NodeId::Task(id) => match self.task(id) {
                Some(t) => t
                    .file_deps
                    .iter()
                    .chain(&t.dyn_file_deps)
                    .map(|p| NodeId::File(p.clone()))
                    .chain(t.task_deps.iter().map(|d| NodeId::Task(d.clone())))
                    .chain(t.provided_tasks.iter().map(|d| NodeId::Task(d.clone())))
                    .collect(),
                None => Vec::new(),
            },
            NodeId::File(path) => self
                .producer_of(path)
                .map(|p| vec![NodeId::Task(p.to_string())])
                .unwrap_or_default(),
        }
    }

    /// Nodes that need `node`: a file's consumers; a task's consumed
    /// outputs, dependent tasks, and the task that provided it.
    fn parents(&self, node: &NodeId) -> Vec<NodeId> {
        match node {
            NodeId::File(path) => match self.file(path) {
                Some(f) => f.consumers().map(|t| NodeId::Task(t.clone())).collect(),
                None => Vec::new(),
            },
            NodeId::Task(id) => match self.task(id) {
                Some(t) => t
                    .outputs()
                    .filter(|o| self.file(o).is_some_and(|f| f.consumers().next().is_some()))
                    .map(|o| NodeId::File(o.clone()))
                    .chain(t.task_dep_of.iter().map(|d| NodeId::Task(d.clone())))
                    .chain(t.provided_by.iter().map(|d| NodeId::Task(d.clone())))
                    .collect(),
                None => Vec::new(),
            },
        }
    }

    fn is_leaf(&self, node: &NodeId) -> bool {
        matches!(node, NodeId::File(path) if self.producer_of(path).is_none())
    }

    /// Breadth-first walk from `start_ids` (task ids or file paths) towards
    /// dependencies.
    ///
    /// Each node is emitted at most once, in selection order. With
    /// `exclusive_childs`, a node reached from one parent waits until all of
    /// its parents have been selected; the last parent to be processed
    /// selects it. Selecting a task also selects its outputs (for start
    /// tasks only when `select_top_outputs` is set). Unknown start ids are
    /// ignored.
    pub fn select_right(&self, start_ids: &[&str], opts: SelectOptions) -> Vec<NodeId> {
        let mut selected: Vec<NodeId> = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();

        let emit = |node: NodeId, selected: &mut Vec<NodeId>, visited: &mut HashSet<NodeId>| {
            if visited.insert(node.clone()) {
                selected.push(node);
                true
            } else {
                false
            }
        };

        for id in start_ids {
            let Some(node) = self.resolve(id) else {
                continue;
            };
            if emit(node.clone(), &mut selected, &mut visited) {
                if opts.select_top_outputs {
                    self.emit_outputs(&node, &mut |o| {
                        emit(o, &mut selected, &mut visited);
                    });
                }
                queue.push_back((node, 0));
            }
        }

        while let Some((node, depth)) = queue.pop_front() {
            if opts.max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            for child in self.children(&node) {
                if visited.contains(&child) {
                    continue;
                }
                if opts.leave_leaves && self.is_leaf(&child) {
                    continue;
                }
                if opts.exclusive_childs
                    && !self.parents(&child).iter().all(|p| visited.contains(p))
                {
                    continue;
                }
                emit(child.clone(), &mut selected, &mut visited);
                self.emit_outputs(&child, &mut |o| {
                    emit(o, &mut selected, &mut visited);
                });
                queue.push_back((child, depth + 1));
            }
        }

        selected
    }

    fn emit_outputs(&self, node: &NodeId, emit: &mut dyn FnMut(NodeId)) {
        if let NodeId::Task(id) = node {
            if let Some(t) = self.task(id) {
                for out in t.outputs() {
                    emit(NodeId::File(out.clone()));
                }
            }
        }
    }
}
