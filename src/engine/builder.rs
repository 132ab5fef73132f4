// src/engine/builder.rs

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tracing::{debug, error, info};

use crate::db::{self, DbDocument, TaskRecord, DB_VERSION};
use crate::engine::queue::BuildQueue;
use crate::engine::state::{BuildState, RunState};
use crate::engine::{BuildOptions, BuildReport, TaskRunState};
use crate::errors::Result;
use crate::fs::{normalize_path, FileSystem};
use crate::graph::{DepGraph, TaskId};
use crate::hash::HashStore;
use crate::task::{Task, TaskSpec};

/// Incremental build driver.
///
/// All methods take `&self`: actions and task factories receive the builder
/// while a build is running and may register tasks or query state from
/// worker threads.
pub struct Builder {
    fs: Arc<dyn FileSystem>,
    options: BuildOptions,
    hashes: HashStore,
    state: Mutex<BuildState>,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Builder {
    /// Create a builder and load the build database named in `options`.
    pub fn new(fs: Arc<dyn FileSystem>, options: BuildOptions) -> Self {
        let doc = db::load_document(fs.as_ref(), &options.db_path);
        let hashes = HashStore::new(Arc::clone(&fs));
        hashes.load(&doc.hash_dict);

        let mut state = BuildState::default();
        for (id, record) in &doc.tasks {
            state.graph.add_task(id, &record.edges());
        }
        state.records = doc.tasks;
        state.files_to_clean = doc.files_to_clean;

        Self {
            fs,
            options,
            hashes,
            state: Mutex::new(state),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, BuildState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub fn hashes(&self) -> &HashStore {
        &self.hashes
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Register a task. Fails on a task without identity, a duplicate id, or
    /// a target another task already declares.
    pub fn add_task(&self, spec: TaskSpec) -> Result<TaskId> {
        self.lock().register(spec, None)
    }

    pub fn add_tasks(&self, specs: impl IntoIterator<Item = TaskSpec>) -> Result<Vec<TaskId>> {
        let mut st = self.lock();
        specs
            .into_iter()
            .map(|spec| st.register(spec, None))
            .collect()
    }

    pub fn task(&self, id: &str) -> Option<Arc<Task>> {
        self.lock().tasks.get(id).cloned()
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.lock().tasks.keys().cloned().collect()
    }

    /// Record of the task's last successful run.
    pub fn record(&self, id: &str) -> Option<TaskRecord> {
        self.lock().records.get(id).cloned()
    }

    pub fn run_state(&self, id: &str) -> TaskRunState {
        self.lock().run_state(id)
    }

    /// Copy of the dependency graph, including edges remembered from
    /// previous runs.
    pub fn graph(&self) -> DepGraph {
        self.lock().graph.clone()
    }

    /// Remember a file to delete on a full clean, e.g. a scratch file an
    /// action created outside its declared outputs.
    pub fn register_file_to_clean(&self, path: &str) {
        self.lock().files_to_clean.insert(normalize_path(path));
    }

    pub fn files_to_clean(&self) -> Vec<String> {
        self.lock().files_to_clean.iter().cloned().collect()
    }

    /// Build every registered task that was not provided by a factory.
    pub fn build_all(&self) -> BuildReport {
        let roots: Vec<TaskId> = self
            .lock()
            .tasks
            .values()
            .filter(|t| t.provided_by.is_none())
            .map(|t| t.id.clone())
            .collect();
        let refs: Vec<&str> = roots.iter().map(String::as_str).collect();
        self.build(&refs)
    }

    /// Bring `targets` (task ids or file paths) up to date.
    ///
    /// Blocks until the build is over, then saves the build database. The
    /// first failing task stops the build; its code is the report's `rc`.
    pub fn build(&self, targets: &[&str]) -> BuildReport {
        let started = Instant::now();
        let queue = BuildQueue::new(self.options.jobs);
        info!(targets = ?targets, jobs = queue.workers(), "build started");

        {
            let mut st = self.lock();
            st.reset_run();
            match st.check_cycles() {
                Err(err) => {
                    error!(error = %err, "cannot start build");
                    queue.stop(1);
                }
                Ok(()) => {
                    for target in targets {
                        if let Err(err) = st.request_target(target, self.fs(), &queue) {
                            error!(target = %target, error = %err, "cannot resolve build target");
                            queue.stop(1);
                            break;
                        }
                    }
                }
            }
        }

        if !queue.is_finished() {
            std::thread::scope(|scope| {
                for worker in 0..queue.workers() {
                    let queue = &queue;
                    scope.spawn(move || self.work(worker, queue));
                }
            });
        }

        let mut rc = queue.rc();
        let mut guard = self.lock();
        let st = &mut *guard;
        if rc == 0 {
            let unresolved = st.unresolved();
            for (task, waiting_for) in &unresolved {
                error!(
                    task = %task,
                    waiting_for = ?waiting_for,
                    "task was never built; its dependencies did not become available"
                );
            }
            if !unresolved.is_empty() {
                rc = 1;
            }
        }

        self.persist(st);

        let report = BuildReport {
            rc,
            executed: std::mem::take(&mut st.executed),
            up_to_date: std::mem::take(&mut st.up_to_date),
            failed: std::mem::take(&mut st.failed),
            elapsed: started.elapsed(),
        };
        info!(
            rc = report.rc,
            executed = report.executed.len(),
            up_to_date = report.up_to_date.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "build finished"
        );
        report
    }

    /// Save the build database now.
    pub fn save(&self) -> Result<()> {
        let st = self.lock();
        db::save_document(self.fs(), &self.options.db_path, &self.document(&st))?;
        Ok(())
    }

    pub(crate) fn document(&self, st: &BuildState) -> DbDocument {
        DbDocument {
            version: DB_VERSION,
            hash_dict: self.hashes.snapshot(),
            tasks: st.records.clone(),
            files_to_clean: st.files_to_clean.clone(),
        }
    }

    /// End-of-build save.
    ///
    /// The hash store is shared by all tasks, so a hash refreshed for one
    /// task would make another task that was not built this time look
    /// current next time. Records of such tasks are dropped.
    pub(crate) fn persist(&self, st: &mut BuildState) {
        let changed = self.hashes.changed_paths();
        let built: HashSet<&str> = st
            .runs
            .iter()
            .filter(|(_, run)| run.state == RunState::Built)
            .map(|(id, _)| id.as_str())
            .collect();
        st.records.retain(|id, record| {
            if built.contains(id.as_str()) {
                return true;
            }
            match record.paths().find(|p| changed.contains(p.as_str())) {
                Some(path) => {
                    debug!(task = %id, path = %path, "dropping record: input changed while the task was not built");
                    false
                }
                None => true,
            }
        });

        let doc = self.document(st);
        if let Err(err) = db::save_document(self.fs(), &self.options.db_path, &doc) {
            error!(path = %self.options.db_path, error = %err, "failed to save build database");
        }
        self.hashes.roll_over();
    }
}
