// src/graph/cycle.rs

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

use super::{DepGraph, TaskId};

impl DepGraph {
    /// Find a dependency cycle among declared tasks accepted by `include`.
    ///
    /// Edge direction: dependency -> dependent. A task depends on another
    /// through a task dependency or through a static file dependency that
    /// the other task produces. Returns the members of one cycle, sorted.
    pub fn find_cycle(&self, include: impl Fn(&str) -> bool) -> Option<Vec<TaskId>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for task in self.tasks().filter(|t| t.declared && include(t.id.as_str())) {
            graph.add_node(task.id.as_str());
            for dep in &task.task_deps {
                if self.contains_task(dep) && include(dep.as_str()) {
                    graph.add_edge(dep.as_str(), task.id.as_str(), ());
                }
            }
            for path in &task.file_deps {
                if let Some(producer) = self.producer_of(path) {
                    if include(producer) {
                        graph.add_edge(producer, task.id.as_str(), ());
                    }
                }
            }
        }

        tarjan_scc(&graph).into_iter().find_map(|scc| {
            let cyclic = scc.len() > 1 || scc.iter().any(|n| graph.contains_edge(*n, *n));
            cyclic.then(|| {
                let mut members: Vec<TaskId> = scc.iter().map(|s| s.to_string()).collect();
                members.sort();
                members
            })
        })
    }
}
