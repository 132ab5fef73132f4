// src/engine/state.rs

//! Registry and per-build bookkeeping behind the builder's lock.
//!
//! Admission is depth-first: requesting a task first requests everything it
//! depends on, recording which producers it still waits for. A task enters
//! the ready queue the moment it waits for nothing. Completion walks the
//! other way: the finished task is removed from the wait lists of the tasks
//! that requested it, which may in turn become ready.
//!
//! A task whose factory provided sub-tasks sits in `AwaitingProvided` until
//! all of them are built, so its dependents wait for the sub-tasks too. Its
//! own outputs already exist at that point; the sub-tasks themselves may
//! consume them without waiting.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error};

use crate::db::TaskRecord;
use crate::engine::queue::BuildQueue;
use crate::engine::TaskRunState;
use crate::errors::{BuilddagError, Result};
use crate::fs::{normalize_path, FileSystem};
use crate::graph::{DepGraph, TaskId};
use crate::task::{Task, TaskSpec};

/// Pseudo task id used when a top-level target cannot be resolved.
pub(crate) const TOP_LEVEL: &str = "<build>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunState {
    /// Requested this build, waiting for dependencies.
    Requested,
    Queued,
    Running,
    /// Action done, waiting for the tasks its factory provided.
    AwaitingProvided,
    Built,
    Failed,
}

impl RunState {
    fn view(self) -> TaskRunState {
        match self {
            RunState::Requested => TaskRunState::Requested,
            RunState::Queued => TaskRunState::Queued,
            RunState::Running => TaskRunState::Running,
            RunState::AwaitingProvided => TaskRunState::AwaitingProvided,
            RunState::Built => TaskRunState::Built,
            RunState::Failed => TaskRunState::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TaskRun {
    pub state: RunState,
    pub priority: Vec<i64>,
    /// Dependency file → task expected to produce it.
    pub pending_files: BTreeMap<String, TaskId>,
    pub pending_tasks: BTreeSet<TaskId>,
    /// Tasks to notify on completion.
    pub parents: BTreeSet<TaskId>,
}

impl TaskRun {
    fn new(priority: Vec<i64>) -> Self {
        Self {
            state: RunState::Requested,
            priority,
            pending_files: BTreeMap::new(),
            pending_tasks: BTreeSet::new(),
            parents: BTreeSet::new(),
        }
    }

    fn is_free(&self) -> bool {
        self.pending_files.is_empty() && self.pending_tasks.is_empty()
    }
}

#[derive(Debug, Default)]
pub(crate) struct BuildState {
    pub tasks: BTreeMap<TaskId, Arc<Task>>,
    /// Declared target path → owning task.
    pub targets: HashMap<String, TaskId>,
    pub graph: DepGraph,
    /// Records from the last successful run of each task.
    pub records: BTreeMap<TaskId, TaskRecord>,
    pub files_to_clean: BTreeSet<String>,
    pub runs: HashMap<TaskId, TaskRun>,
    pub executed: Vec<TaskId>,
    pub up_to_date: Vec<TaskId>,
    pub failed: Vec<TaskId>,
}

impl BuildState {
    /// Forget everything about the previous build.
    pub fn reset_run(&mut self) {
        self.runs.clear();
        self.executed.clear();
        self.up_to_date.clear();
        self.failed.clear();
    }

    pub fn run_state(&self, id: &str) -> TaskRunState {
        self.runs
            .get(id)
            .map_or(TaskRunState::NotInRun, |r| r.state.view())
    }

    /// Register a task. Factory-provided tasks may replace a task the same
    /// factory provided before.
    pub fn register(&mut self, spec: TaskSpec, provided_by: Option<&str>) -> Result<TaskId> {
        let task = Task::from_spec(spec, provided_by.map(str::to_string)).ok_or_else(|| {
            BuilddagError::ConfigError("task declares neither a name nor a target".into())
        })?;
        let id = task.id.clone();

        if let Some(existing) = self.tasks.get(&id) {
            let same_origin = provided_by.is_some() && existing.provided_by.as_deref() == provided_by;
            if !same_origin {
                return Err(BuilddagError::DuplicateTask(id).into());
            }
        }
        for target in &task.targets {
            if let Some(owner) = self.targets.get(target) {
                if owner != &id {
                    return Err(BuilddagError::DuplicateTarget {
                        target: target.clone(),
                        existing: owner.clone(),
                        task: id,
                    }
                    .into());
                }
            }
        }

        if let Some(old) = self.tasks.remove(&id) {
            for target in &old.targets {
                self.targets.remove(target);
            }
        }
        for target in &task.targets {
            self.targets.insert(target.clone(), id.clone());
        }
        self.graph.add_task(&id, &task.edges(self.records.get(&id)));
        debug!(task = %id, provided_by = ?task.provided_by, "task registered");
        self.tasks.insert(id.clone(), Arc::new(task));
        Ok(id)
    }

    /// Registered task that has to run for `path` to be current: its
    /// declared owner, or the task that generated or provided it last time.
    /// A file produced by a factory-provided task that is not registered yet
    /// resolves to the nearest registered provider above that task, whose
    /// factory registers it again.
    pub fn producer_for(&self, path: &str) -> Option<TaskId> {
        if let Some(owner) = self.targets.get(path) {
            return Some(owner.clone());
        }
        let producer = self.graph.producer_of(path)?;
        let resolved = self.registered_provider(producer);
        if resolved.is_none() {
            debug!(path = %path, producer = %producer, "last producer is gone; treating file as a source");
        }
        resolved
    }

    /// `id` if it is registered, else the first registered task up its
    /// `provided_by` chain in the graph.
    fn registered_provider(&self, id: &str) -> Option<TaskId> {
        let limit = self.graph.tasks().count();
        let mut current = Some(id.to_string());
        let mut hops = 0;
        while let Some(candidate) = current {
            if self.tasks.contains_key(&candidate) {
                return Some(candidate);
            }
            hops += 1;
            if hops > limit {
                return None;
            }
            current = self.graph.task(&candidate).and_then(|t| t.provided_by.clone());
        }
        None
    }

    /// Resolve a task dependency given either as a task id or as a target
    /// path.
    pub fn resolve_task(&self, name: &str) -> Option<TaskId> {
        if self.tasks.contains_key(name) {
            return Some(name.to_string());
        }
        self.targets.get(&normalize_path(name)).cloned()
    }

    /// Whether `requester` may consume what `dep` produces. A task waiting
    /// for the tasks its factory provided only counts as ready for those
    /// tasks; everybody else waits until it is built.
    fn ready_for(&self, dep: &str, requester: &str) -> bool {
        match self.runs.get(dep).map(|r| r.state) {
            Some(RunState::Built) => true,
            Some(RunState::AwaitingProvided) => self.is_provided_by(requester, dep),
            _ => false,
        }
    }

    fn is_provided_by(&self, id: &str, ancestor: &str) -> bool {
        let mut current = self.tasks.get(id).and_then(|t| t.provided_by.clone());
        let mut hops = 0;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.tasks.len() {
                return false;
            }
            current = self.tasks.get(&parent).and_then(|t| t.provided_by.clone());
        }
        false
    }

    /// Resolve a top-level target and request it.
    pub fn request_target(
        &mut self,
        name: &str,
        fs: &dyn FileSystem,
        queue: &BuildQueue,
    ) -> Result<()> {
        if let Some(id) = self.resolve_task(name) {
            return self.request(&id, &[], fs, queue);
        }
        let path = normalize_path(name);
        if let Some(id) = self.producer_for(&path) {
            return self.request(&id, &[], fs, queue);
        }
        if fs.exists(Path::new(&path)) {
            debug!(path = %path, "requested file exists and has no producer");
            return Ok(());
        }
        Err(BuilddagError::UnknownDependency {
            task: TOP_LEVEL.into(),
            dep: name.into(),
        }
        .into())
    }

    /// Request `id` and, first, everything it depends on.
    ///
    /// A task provided by a factory also waits for its provider, which may
    /// redefine or drop it. The priority path is fixed by whichever requester
    /// reaches a task first; later requesters never raise it.
    pub fn request(
        &mut self,
        id: &str,
        parent_priority: &[i64],
        fs: &dyn FileSystem,
        queue: &BuildQueue,
    ) -> Result<()> {
        if self.runs.contains_key(id) {
            return Ok(());
        }
        let task = self
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| BuilddagError::UnknownDependency {
                task: TOP_LEVEL.into(),
                dep: id.into(),
            })?;

        let mut priority = parent_priority.to_vec();
        priority.push(task.priority);
        self.runs.insert(id.to_string(), TaskRun::new(priority.clone()));
        debug!(task = %id, ?priority, "task requested");

        if let Some(provider) = task.provided_by.as_deref() {
            if provider != id && self.tasks.contains_key(provider) {
                self.request(provider, &priority, fs, queue)?;
                if !self.ready_for(provider, id) {
                    self.wait_for_task(id, provider);
                }
            }
        }

        for dep in &task.task_deps {
            let dep_id = self
                .resolve_task(dep)
                .ok_or_else(|| BuilddagError::UnknownDependency {
                    task: id.into(),
                    dep: dep.clone(),
                })?;
            if dep_id == id {
                continue;
            }
            self.request(&dep_id, &priority, fs, queue)?;
            if !self.ready_for(&dep_id, id) {
                self.wait_for_task(id, &dep_id);
            }
        }

        for path in &task.file_deps {
            match self.producer_for(path) {
                Some(producer) if producer != id => {
                    self.request(&producer, &priority, fs, queue)?;
                    if !self.ready_for(&producer, id) {
                        self.wait_for_file(id, path, &producer);
                    }
                }
                _ if fs.exists(Path::new(path)) => {}
                _ => {
                    return Err(BuilddagError::UnknownDependency {
                        task: id.into(),
                        dep: path.clone(),
                    }
                    .into());
                }
            }
        }

        self.admit_if_free(id, queue);
        Ok(())
    }

    fn wait_for_task(&mut self, id: &str, dep: &str) {
        if let Some(run) = self.runs.get_mut(id) {
            run.pending_tasks.insert(dep.to_string());
        }
        if let Some(run) = self.runs.get_mut(dep) {
            run.parents.insert(id.to_string());
        }
    }

    fn wait_for_file(&mut self, id: &str, path: &str, producer: &str) {
        if let Some(run) = self.runs.get_mut(id) {
            run.pending_files.insert(path.to_string(), producer.to_string());
        }
        if let Some(run) = self.runs.get_mut(producer) {
            run.parents.insert(id.to_string());
        }
    }

    fn admit_if_free(&mut self, id: &str, queue: &BuildQueue) {
        let Some(run) = self.runs.get_mut(id) else {
            return;
        };
        if run.state != RunState::Requested || !run.is_free() {
            return;
        }
        let Some(task) = self.tasks.get(id) else {
            return;
        };
        run.state = RunState::Queued;
        queue.add(Arc::clone(task), run.priority.clone());
    }

    pub fn mark_running(&mut self, id: &str) {
        if let Some(run) = self.runs.get_mut(id) {
            run.state = RunState::Running;
        }
    }

    /// Store the outcome of a successful run and request what its factory
    /// provided; the task is built once those are.
    pub fn finish(
        &mut self,
        id: &str,
        record: TaskRecord,
        provided: Vec<TaskId>,
        fs: &dyn FileSystem,
        queue: &BuildQueue,
    ) -> Result<()> {
        self.forget_dropped_provided(id, &provided);
        self.graph.add_task(id, &record.edges());
        self.records.insert(id.to_string(), record);

        if provided.is_empty() {
            self.complete(id, queue);
            return Ok(());
        }

        let priority = match self.runs.get_mut(id) {
            Some(run) => {
                run.state = RunState::AwaitingProvided;
                run.priority.clone()
            }
            None => Vec::new(),
        };
        debug!(task = %id, provided = ?provided, "waiting for provided tasks");
        for sub in &provided {
            self.request(sub, &priority, fs, queue)?;
            self.release_from_providers(sub, queue);
            if !matches!(self.runs.get(sub.as_str()).map(|r| r.state), Some(RunState::Built)) {
                self.wait_for_task(id, sub);
            }
        }
        if self.runs.get(id).is_some_and(TaskRun::is_free) {
            self.complete(id, queue);
        }
        Ok(())
    }

    /// Drop waits of `sub` on providers that are now ready for it. A task
    /// requested before its provider ran recorded those waits while the
    /// provider was not yet ready.
    fn release_from_providers(&mut self, sub: &str, queue: &BuildQueue) {
        let Some(run) = self.runs.get(sub) else {
            return;
        };
        let released: BTreeSet<TaskId> = run
            .pending_tasks
            .iter()
            .chain(run.pending_files.values())
            .filter(|producer| self.ready_for(producer, sub))
            .cloned()
            .collect();
        if released.is_empty() {
            return;
        }
        for producer in &released {
            if let Some(p) = self.runs.get_mut(producer) {
                p.parents.remove(sub);
            }
        }
        if let Some(run) = self.runs.get_mut(sub) {
            run.pending_tasks.retain(|t| !released.contains(t));
            run.pending_files.retain(|_, p| !released.contains(p));
        }
        debug!(task = %sub, released = ?released, "provider ready for its task");
        self.admit_if_free(sub, queue);
    }

    /// Tasks a factory provided last time but not this time.
    fn forget_dropped_provided(&mut self, id: &str, provided: &[TaskId]) {
        let Some(previous) = self.records.get(id) else {
            return;
        };
        let dropped: Vec<TaskId> = previous
            .provided_tasks
            .iter()
            .filter(|t| !provided.contains(t))
            .cloned()
            .collect();
        for sub in dropped {
            // Not registered this session: only the record is left.
            let owned = self
                .tasks
                .get(&sub)
                .map_or(true, |t| t.provided_by.as_deref() == Some(id));
            if owned && !self.runs.contains_key(&sub) {
                if let Some(task) = self.tasks.remove(&sub) {
                    for target in &task.targets {
                        self.targets.remove(target);
                    }
                }
                self.records.remove(&sub);
                self.graph.remove_task(&sub);
                debug!(task = %sub, provider = %id, "dropped task no longer provided");
            }
        }
    }

    /// Mark `id` built and release whoever waited for it.
    fn complete(&mut self, id: &str, queue: &BuildQueue) {
        let mut done = vec![id.to_string()];
        while let Some(current) = done.pop() {
            let parents = match self.runs.get_mut(&current) {
                Some(run) => {
                    run.state = RunState::Built;
                    std::mem::take(&mut run.parents)
                }
                None => continue,
            };
            debug!(task = %current, "task built");
            for parent in parents {
                let Some(run) = self.runs.get_mut(&parent) else {
                    continue;
                };
                run.pending_tasks.remove(&current);
                run.pending_files.retain(|_, producer| producer != &current);
                if !run.is_free() {
                    continue;
                }
                let state = run.state;
                match state {
                    RunState::Requested => self.admit_if_free(&parent, queue),
                    RunState::AwaitingProvided => done.push(parent),
                    _ => {}
                }
            }
        }
    }

    /// Record a failed task: its record goes away so the next build retries.
    pub fn fail(&mut self, id: &str) {
        if let Some(run) = self.runs.get_mut(id) {
            run.state = RunState::Failed;
        }
        self.failed.push(id.to_string());
        self.records.remove(id);
    }

    /// Requested tasks that never got built, with what they still wait for.
    pub fn unresolved(&self) -> Vec<(TaskId, Vec<String>)> {
        let mut out: Vec<(TaskId, Vec<String>)> = self
            .runs
            .iter()
            .filter(|(_, run)| run.state != RunState::Built)
            .map(|(id, run)| {
                let waits = run
                    .pending_tasks
                    .iter()
                    .cloned()
                    .chain(run.pending_files.keys().cloned())
                    .collect();
                (id.clone(), waits)
            })
            .collect();
        out.sort();
        out
    }

    /// Cycle among the registered tasks, if any, reported as an error.
    pub fn check_cycles(&self) -> Result<()> {
        match self.graph.find_cycle(|id| self.tasks.contains_key(id)) {
            Some(members) => {
                let joined = members.join(" -> ");
                error!(cycle = %joined, "dependency cycle detected");
                Err(BuilddagError::DagCycle(joined).into())
            }
            None => Ok(()),
        }
    }
}
