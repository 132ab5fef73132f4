// src/config/specs.rs

use std::path::Path;

use crate::config::model::{ConfigFile, TaskConfig};
use crate::exec::shell_action;
use crate::task::{TaskSpec, UpToDate};
use crate::types::UpToDatePolicy;

fn policy(task: &TaskConfig) -> UpToDate {
    if task.always {
        return UpToDate::Never;
    }
    match task.up_to_date {
        None => UpToDate::Default,
        Some(UpToDatePolicy::Hash) => UpToDate::Hash,
        Some(UpToDatePolicy::Timestamp) => UpToDate::Timestamp,
    }
}

/// One [`TaskSpec`] per `[task.<name>]`, named after the section. Commands
/// run in `root`.
pub fn to_task_specs(cfg: &ConfigFile, root: &Path) -> Vec<TaskSpec> {
    cfg.task
        .iter()
        .map(|(name, task)| {
            let mut spec = TaskSpec::named(name.clone())
                .file_deps(task.deps.iter().cloned())
                .priority(task.priority)
                .greedy(task.greedy)
                .up_to_date(policy(task));
            for target in &task.targets {
                spec = spec.target(target.clone());
            }
            for dep in &task.after {
                spec = spec.task_dep(dep.clone());
            }
            if let Some(group) = &task.exclusive {
                spec = spec.exclusive(group.clone());
            }
            if let Some(cmd) = &task.cmd {
                spec = spec.action(shell_action(cmd.clone(), root.to_path_buf()));
            }
            spec
        })
        .collect()
}
