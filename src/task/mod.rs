// src/task/mod.rs

//! Units of work.
//!
//! - [`TaskSpec`] is the descriptor callers (and task factories) hand to the
//!   [`Builder`](crate::engine::Builder).
//! - [`Task`] is the registered, immutable form shared with workers.
//! - [`TaskContext`] is what callbacks see while a task runs: declared
//!   inputs, the previous run's record, and the lists the action fills in.
//! - [`uptodate`] implements the built-in staleness policies.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::db::TaskRecord;
use crate::engine::Builder;
use crate::fs::normalize_path;
use crate::graph::{TaskEdges, TaskId};

pub mod context;
pub mod uptodate;

pub use context::TaskContext;

/// Failure reported by an up-to-date check, action or task factory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The callback reported failure with a non-zero code.
    #[error("failed with code {0}")]
    Failed(i32),
    /// The callback raised an error or panicked.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Return code this failure contributes to the build status.
    pub fn code(&self) -> i32 {
        match self {
            TaskError::Failed(0) => 1,
            TaskError::Failed(code) => *code,
            TaskError::Internal(_) => 1,
        }
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        TaskError::Internal(format!("{err:#}"))
    }
}

pub type TaskResult<T> = std::result::Result<T, TaskError>;

pub type ActionFn = dyn Fn(&Builder, &mut TaskContext) -> TaskResult<()> + Send + Sync;
pub type CheckFn = dyn Fn(&Builder, &mut TaskContext) -> TaskResult<bool> + Send + Sync;
pub type FactoryFn = dyn Fn(&Builder, &TaskContext) -> TaskResult<Vec<TaskSpec>> + Send + Sync;

/// How a task decides it can skip its action.
#[derive(Clone, Default)]
pub enum UpToDate {
    /// Use the builder's default policy.
    #[default]
    Default,
    Hash,
    Timestamp,
    /// Always current; the action never runs. Useful for tasks that only
    /// exist to feed a factory.
    Always,
    /// Never current; the action runs on every build.
    Never,
    Custom(Arc<CheckFn>),
}

impl fmt::Debug for UpToDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpToDate::Default => f.write_str("Default"),
            UpToDate::Hash => f.write_str("Hash"),
            UpToDate::Timestamp => f.write_str("Timestamp"),
            UpToDate::Always => f.write_str("Always"),
            UpToDate::Never => f.write_str("Never"),
            UpToDate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Declaration of a task.
///
/// Identity is the explicit name or, without one, the first target.
#[derive(Clone, Default)]
pub struct TaskSpec {
    pub name: Option<String>,
    pub targets: Vec<String>,
    pub file_deps: Vec<String>,
    pub dyn_file_deps: Vec<String>,
    pub task_deps: Vec<String>,
    pub priority: i64,
    pub exclusive_group: Option<String>,
    pub greedy: bool,
    pub up_to_date: UpToDate,
    pub action: Option<Arc<ActionFn>>,
    pub factory: Option<Arc<FactoryFn>>,
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("targets", &self.targets)
            .field("file_deps", &self.file_deps)
            .field("task_deps", &self.task_deps)
            .field("priority", &self.priority)
            .field("exclusive_group", &self.exclusive_group)
            .field("greedy", &self.greedy)
            .field("up_to_date", &self.up_to_date)
            .finish_non_exhaustive()
    }
}

impl TaskSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn target(mut self, path: impl Into<String>) -> Self {
        self.targets.push(path.into());
        self
    }

    pub fn file_dep(mut self, path: impl Into<String>) -> Self {
        self.file_deps.push(path.into());
        self
    }

    pub fn file_deps<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_deps.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn dyn_file_dep(mut self, path: impl Into<String>) -> Self {
        self.dyn_file_deps.push(path.into());
        self
    }

    pub fn task_dep(mut self, id: impl Into<String>) -> Self {
        self.task_deps.push(id.into());
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn exclusive(mut self, group: impl Into<String>) -> Self {
        self.exclusive_group = Some(group.into());
        self
    }

    pub fn greedy(mut self, greedy: bool) -> Self {
        self.greedy = greedy;
        self
    }

    pub fn up_to_date(mut self, policy: UpToDate) -> Self {
        self.up_to_date = policy;
        self
    }

    pub fn check<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder, &mut TaskContext) -> TaskResult<bool> + Send + Sync + 'static,
    {
        self.up_to_date = UpToDate::Custom(Arc::new(f));
        self
    }

    pub fn action<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder, &mut TaskContext) -> TaskResult<()> + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(f));
        self
    }

    pub fn factory<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder, &TaskContext) -> TaskResult<Vec<TaskSpec>> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(f));
        self
    }

    /// Identity this spec registers under, if it has one.
    pub fn id(&self) -> Option<TaskId> {
        self.name
            .clone()
            .or_else(|| self.targets.first().map(|t| normalize_path(t)))
    }
}

/// A registered task. Immutable once registered; per-run state lives in
/// the builder and in [`TaskContext`].
pub struct Task {
    pub id: TaskId,
    pub name: Option<String>,
    pub targets: Vec<String>,
    pub file_deps: Vec<String>,
    pub dyn_file_deps: Vec<String>,
    pub task_deps: Vec<TaskId>,
    pub priority: i64,
    pub exclusive_group: Option<String>,
    pub greedy: bool,
    pub up_to_date: UpToDate,
    pub action: Option<Arc<ActionFn>>,
    pub factory: Option<Arc<FactoryFn>>,
    /// Task whose factory produced this one.
    pub provided_by: Option<TaskId>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("targets", &self.targets)
            .field("priority", &self.priority)
            .field("provided_by", &self.provided_by)
            .finish_non_exhaustive()
    }
}

fn dedup_paths(paths: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(paths.len());
    for p in paths {
        let p = normalize_path(p);
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

fn dedup(ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

impl Task {
    /// Build the registered form of `spec`; `None` when the spec has
    /// neither a name nor a target.
    pub fn from_spec(spec: TaskSpec, provided_by: Option<TaskId>) -> Option<Self> {
        let id = spec.id()?;
        Some(Self {
            id,
            name: spec.name,
            targets: dedup_paths(&spec.targets),
            file_deps: dedup_paths(&spec.file_deps),
            dyn_file_deps: dedup_paths(&spec.dyn_file_deps),
            task_deps: dedup(&spec.task_deps),
            priority: spec.priority,
            exclusive_group: spec.exclusive_group,
            greedy: spec.greedy,
            up_to_date: spec.up_to_date,
            action: spec.action,
            factory: spec.factory,
            provided_by,
        })
    }

    /// Declared edges plus outputs remembered from the previous run.
    pub fn edges(&self, saved: Option<&TaskRecord>) -> TaskEdges {
        TaskEdges {
            name: self.name.clone(),
            targets: self.targets.clone(),
            file_deps: self.file_deps.clone(),
            dyn_file_deps: self.dyn_file_deps.clone(),
            task_deps: self.task_deps.clone(),
            generated_files: saved.map(|r| r.generated_files.clone()).unwrap_or_default(),
            provided_files: saved.map(|r| r.provided_files.clone()).unwrap_or_default(),
            provided_tasks: saved.map(|r| r.provided_tasks.clone()).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_name_or_first_target() {
        assert_eq!(TaskSpec::named("gen").target("x").id().as_deref(), Some("gen"));
        assert_eq!(TaskSpec::new().target("./out//a.o").id().as_deref(), Some("out/a.o"));
        assert_eq!(TaskSpec::new().file_dep("a.c").id(), None);
    }

    #[test]
    fn registration_normalises_and_dedups_paths() {
        let spec = TaskSpec::new()
            .target("out/a.o")
            .file_dep("src/a.c")
            .file_dep("./src/a.c")
            .task_dep("gen")
            .task_dep("gen");
        let task = Task::from_spec(spec, None).unwrap();
        assert_eq!(task.file_deps, vec!["src/a.c".to_string()]);
        assert_eq!(task.task_deps, vec!["gen".to_string()]);
    }

    #[test]
    fn failure_codes() {
        assert_eq!(TaskError::Failed(3).code(), 3);
        assert_eq!(TaskError::Failed(0).code(), 1);
        assert_eq!(TaskError::from(anyhow::anyhow!("boom")).code(), 1);
    }
}
