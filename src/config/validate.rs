// src/config/validate.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{BuilddagError, Result};
use crate::fs::normalize_path;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = BuilddagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_dependencies(cfg)?;
    let owners = collect_targets(cfg)?;
    validate_dag(cfg, &owners)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(BuilddagError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.jobs == Some(0) {
        return Err(BuilddagError::ConfigError(
            "[config].jobs must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.db.as_deref().is_some_and(|db| db.trim().is_empty()) {
        return Err(BuilddagError::ConfigError(
            "[config].db must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(BuilddagError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(BuilddagError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

/// Target path → owning task; a path may have one owner only.
fn collect_targets(cfg: &RawConfigFile) -> Result<HashMap<String, &str>> {
    let mut owners: HashMap<String, &str> = HashMap::new();
    for (name, task) in cfg.task.iter() {
        for target in task.targets.iter() {
            let target = normalize_path(target);
            if let Some(existing) = owners.get(&target) {
                if *existing != name.as_str() {
                    return Err(BuilddagError::DuplicateTarget {
                        target,
                        existing: existing.to_string(),
                        task: name.clone(),
                    });
                }
                continue;
            }
            owners.insert(target, name.as_str());
        }
    }
    Ok(owners)
}

fn validate_dag(cfg: &RawConfigFile, owners: &HashMap<String, &str>) -> Result<()> {
    // Edge direction: dependency -> dependent. Both `after` entries and
    // `deps` that are another task's target count.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
        for dep in task.deps.iter() {
            if let Some(producer) = owners.get(&normalize_path(dep)) {
                graph.add_edge(*producer, name.as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(BuilddagError::DagCycle(format!(
            "cycle detected in task DAG involving task '{}'",
            cycle.node_id()
        ))),
    }
}
