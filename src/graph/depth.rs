// src/graph/depth.rs

//! Layered depth assignment, used for diagnostics and dry-run output.

use std::collections::{HashMap, VecDeque};

use super::{DepGraph, Depth, NodeId};

impl DepGraph {
    /// Nodes that build on `node`.
    fn dependents(&self, node: &NodeId) -> Vec<NodeId> {
        match node {
            NodeId::File(path) => match self.file(path) {
                Some(f) => f.consumers().map(|t| NodeId::Task(t.clone())).collect(),
                None => Vec::new(),
            },
            NodeId::Task(id) => match self.task(id) {
                Some(t) => t
                    .outputs()
                    .map(|o| NodeId::File(o.clone()))
                    .chain(t.task_dep_of.iter().map(|d| NodeId::Task(d.clone())))
                    .chain(t.provided_tasks.iter().map(|d| NodeId::Task(d.clone())))
                    .collect(),
                None => Vec::new(),
            },
        }
    }

    /// Assign every node reachable from a root its shortest (`lower`) and
    /// longest (`higher`) distance from the roots.
    ///
    /// Path lengths are capped at the node count, so a cyclic graph still
    /// terminates. Unreachable nodes get `None`.
    pub fn calc_depths(&mut self) {
        let limit = self.files.len() + self.tasks.len();
        let mut depths: HashMap<NodeId, Depth> = HashMap::new();
        let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();

        let roots: Vec<NodeId> = self
            .root_files()
            .map(|f| NodeId::File(f.path.clone()))
            .chain(self.root_tasks().map(|t| NodeId::Task(t.id.clone())))
            .collect();
        for root in roots {
            depths.insert(root.clone(), Depth::default());
            queue.push_back((root, 0));
        }

        while let Some((node, dist)) = queue.pop_front() {
            if dist >= limit {
                continue;
            }
            for next in self.dependents(&node) {
                let d = dist + 1;
                match depths.get_mut(&next) {
                    None => {
                        depths.insert(next.clone(), Depth { lower: d, higher: d });
                        queue.push_back((next, d));
                    }
                    Some(depth) if depth.higher < d => {
                        depth.higher = d;
                        queue.push_back((next, d));
                    }
                    Some(_) => {}
                }
            }
        }

        for file in self.files.values_mut() {
            file.depth = depths.get(&NodeId::File(file.path.clone())).copied();
        }
        for task in self.tasks.values_mut() {
            task.depth = depths.get(&NodeId::Task(task.id.clone())).copied();
        }
    }
}
