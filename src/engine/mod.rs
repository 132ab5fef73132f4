// src/engine/mod.rs

//! Build engine.
//!
//! - [`Builder`] owns the task registry, the dependency graph, the hash
//!   store and the persisted records, and drives a build.
//! - [`queue`] is the ready queue the worker threads pull from.
//! - `state` holds the per-build request/completion bookkeeping.
//! - `worker` runs one task: up-to-date check, action, task factory.
//! - `clean` removes produced files.

use std::time::Duration;

use crate::db::DEFAULT_DB_PATH;
use crate::graph::TaskId;
use crate::types::UpToDatePolicy;

pub mod builder;
mod clean;
pub mod queue;
mod state;
mod worker;

pub use builder::Builder;
pub use queue::{BuildQueue, QueueEntry};

/// Number of workers used when none is configured: one more than the
/// available cores, so a worker blocked on I/O does not leave a core idle.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        + 1
}

/// Knobs for a [`Builder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Worker threads.
    pub jobs: usize,
    /// Path of the build database, relative to the file system root.
    pub db_path: String,
    /// Policy for tasks that do not pick one.
    pub default_policy: UpToDatePolicy,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            db_path: DEFAULT_DB_PATH.to_string(),
            default_policy: UpToDatePolicy::default(),
        }
    }
}

impl BuildOptions {
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_db_path(mut self, path: impl Into<String>) -> Self {
        self.db_path = path.into();
        self
    }

    pub fn with_default_policy(mut self, policy: UpToDatePolicy) -> Self {
        self.default_policy = policy;
        self
    }
}

/// Outcome of one [`Builder::build`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// 0 on success, otherwise the first failure code.
    pub rc: i32,
    /// Tasks whose action ran (or that had no action and were stale), in
    /// completion order.
    pub executed: Vec<TaskId>,
    /// Tasks found up to date.
    pub up_to_date: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    pub elapsed: Duration,
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.rc == 0
    }

    pub fn ran(&self, id: &str) -> bool {
        self.executed.iter().any(|t| t == id)
    }
}

/// Public view of where a task is in the current (or last) build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// Not requested by the current build.
    NotInRun,
    Requested,
    Queued,
    Running,
    AwaitingProvided,
    Built,
    Failed,
}
