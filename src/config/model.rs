// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::engine::BuildOptions;
use crate::types::UpToDatePolicy;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// jobs = 4
/// db = ".builddag.json"
/// up_to_date = "hash"
///
/// [task.concat]
/// cmd = "cat src/a.txt src/b.txt > out/concat.txt"
/// targets = ["out/concat.txt"]
/// deps = ["src/a.txt", "src/b.txt"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(config: ConfigSection, task: BTreeMap<String, TaskConfig>) -> Self {
        Self { config, task }
    }

    /// Builder options implied by `[config]`; unset keys keep their
    /// defaults.
    pub fn build_options(&self) -> BuildOptions {
        let mut options = BuildOptions::default().with_default_policy(self.config.up_to_date);
        if let Some(jobs) = self.config.jobs {
            options = options.with_jobs(jobs);
        }
        if let Some(db) = &self.config.db {
            options = options.with_db_path(db.clone());
        }
        options
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigSection {
    /// Worker threads. Defaults to the number of cores plus one.
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Build database path, relative to the directory of the config file.
    #[serde(default)]
    pub db: Option<String>,

    /// Policy for tasks without their own `up_to_date`.
    #[serde(default)]
    pub up_to_date: UpToDatePolicy,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Shell command. A task without one only groups its dependencies.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Files the command produces.
    #[serde(default)]
    pub targets: Vec<String>,

    /// Files the command reads. A dependency that is another task's target
    /// makes that task run first.
    #[serde(default)]
    pub deps: Vec<String>,

    /// Tasks that must be built first.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub priority: i64,

    /// Tasks sharing an exclusive group never run at the same time.
    #[serde(default)]
    pub exclusive: Option<String>,

    #[serde(default)]
    pub greedy: bool,

    /// `"hash"` or `"timestamp"`; falls back to `[config].up_to_date`.
    #[serde(default)]
    pub up_to_date: Option<UpToDatePolicy>,

    /// Run the command on every build.
    #[serde(default)]
    pub always: bool,
}
