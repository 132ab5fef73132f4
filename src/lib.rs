// src/lib.rs

pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod graph;
pub mod hash;
pub mod logging;
pub mod task;
pub mod types;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::config_root_dir;
use crate::config::{load_and_validate, to_task_specs, ConfigFile};
use crate::fs::{FileSystem, RealFileSystem};
use crate::graph::{DepGraph, Depth};
use crate::task::Task;

pub use crate::engine::{BuildOptions, BuildReport, Builder};
pub use crate::task::{TaskContext, TaskError, TaskResult, TaskSpec, UpToDate};

/// High-level entry point used by `main.rs`. Returns the process exit
/// status.
///
/// Paths (targets, the database, command working directory) are relative to
/// the directory holding the config file.
pub fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(0);
    }

    let root = config_root_dir(&config_path);
    let mut options = cfg.build_options();
    if let Some(jobs) = args.jobs {
        options = options.with_jobs(jobs);
    }
    if let Some(db) = &args.db {
        options = options.with_db_path(db.clone());
    }
    info!(root = %root.display(), jobs = options.jobs, db = %options.db_path, "starting builddag");

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem::new(root.clone()));
    let builder = Builder::new(fs, options);
    builder.add_tasks(to_task_specs(&cfg, &root))?;

    let targets: Vec<&str> = args.targets.iter().map(String::as_str).collect();
    if args.clean {
        let ok = builder.clean(&targets);
        return Ok(if ok { 0 } else { 1 });
    }

    let report = if targets.is_empty() {
        builder.build_all()
    } else {
        builder.build(&targets)
    };
    Ok(report.rc)
}

/// Simple dry-run output: print tasks, their depth in the graph, their
/// dependencies and commands.
fn print_dry_run(cfg: &ConfigFile) {
    let depths = dry_run_depths(cfg);
    println!("builddag dry-run");
    println!("  config.jobs = {:?}", cfg.config.jobs);
    println!("  config.db = {:?}", cfg.config.db);
    println!("  config.up_to_date = {:?}", cfg.config.up_to_date);
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in cfg.task.iter() {
        match depths.get(name) {
            Some(d) if d.lower == d.higher => println!("  - {name} (depth {})", d.lower),
            Some(d) => println!("  - {name} (depth {}..{})", d.lower, d.higher),
            None => println!("  - {name}"),
        }
        if let Some(cmd) = &task.cmd {
            println!("      cmd: {cmd}");
        }
        if !task.targets.is_empty() {
            println!("      targets: {:?}", task.targets);
        }
        if !task.deps.is_empty() {
            println!("      deps: {:?}", task.deps);
        }
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if task.priority != 0 {
            println!("      priority: {}", task.priority);
        }
        if let Some(group) = &task.exclusive {
            println!("      exclusive: {group}");
        }
        if task.greedy {
            println!("      greedy: true");
        }
        if let Some(policy) = task.up_to_date {
            println!("      up_to_date: {policy:?}");
        }
    }

    debug!("dry-run complete (no execution)");
}

/// Depth of every configured task in the graph its declared edges form.
fn dry_run_depths(cfg: &ConfigFile) -> BTreeMap<String, Depth> {
    let mut graph = DepGraph::new();
    let tasks: Vec<Task> = to_task_specs(cfg, Path::new("."))
        .into_iter()
        .filter_map(|spec| Task::from_spec(spec, None))
        .collect();
    for task in &tasks {
        graph.add_task(&task.id, &task.edges(None));
    }
    graph.calc_depths();
    tasks
        .iter()
        .filter_map(|t| Some((t.id.clone(), graph.task(&t.id)?.depth?)))
        .collect()
}
