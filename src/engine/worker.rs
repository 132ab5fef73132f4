// src/engine/worker.rs

//! Running one task on a worker thread.
//!
//! Callbacks run without the builder lock held. Panics in a callback are
//! caught and reported as an internal error of that task.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::engine::queue::{BuildQueue, QueueEntry};
use crate::engine::state::BuildState;
use crate::engine::Builder;
use crate::task::uptodate::{hash_up_to_date, timestamp_up_to_date};
use crate::task::{Task, TaskContext, TaskError, TaskResult, UpToDate};
use crate::types::UpToDatePolicy;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

fn guarded<T>(f: impl FnOnce() -> TaskResult<T>) -> TaskResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(TaskError::Internal(format!(
            "panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn fail_locked(st: &mut BuildState, id: &str, phase: &str, err: &TaskError, queue: &BuildQueue) {
    error!(task = %id, phase, code = err.code(), error = %err, "task failed");
    st.fail(id);
    queue.stop(err.code());
}

impl Builder {
    pub(crate) fn work(&self, worker: usize, queue: &BuildQueue) {
        debug!(worker, "worker started");
        while let Some(entry) = queue.get() {
            self.execute(&entry, queue);
            queue.done(&entry);
        }
        debug!(worker, "worker stopped");
    }

    fn policy_of(&self, task: &Task) -> Option<UpToDatePolicy> {
        match task.up_to_date {
            UpToDate::Default => Some(self.options().default_policy),
            UpToDate::Hash => Some(UpToDatePolicy::Hash),
            UpToDate::Timestamp => Some(UpToDatePolicy::Timestamp),
            _ => None,
        }
    }

    fn check_up_to_date(&self, task: &Task, ctx: &mut TaskContext) -> TaskResult<bool> {
        match &task.up_to_date {
            UpToDate::Always => {
                ctx.seed_from_saved();
                Ok(true)
            }
            UpToDate::Never => Ok(false),
            UpToDate::Custom(check) => {
                let current = check(self, ctx)?;
                if current && ctx.generated_files().is_empty() && ctx.provided_files().is_empty() {
                    ctx.seed_from_saved();
                }
                Ok(current)
            }
            _ => match self.policy_of(task) {
                Some(UpToDatePolicy::Timestamp) => timestamp_up_to_date(self, ctx),
                _ => hash_up_to_date(self, ctx),
            },
        }
    }

    /// Make sure the inputs of a hash-checked task have a hash this run, so
    /// the next run has something to compare against.
    fn record_inputs<'a>(&self, task: &Task, inputs: impl Iterator<Item = &'a String>) {
        if self.policy_of(task) == Some(UpToDatePolicy::Timestamp) {
            return;
        }
        for path in inputs {
            self.hashes().get(path);
        }
    }

    /// Bring the hash store in line with what the action wrote. Timestamp
    /// tasks only drop the cached hash so nothing is hashed on their behalf.
    fn refresh_outputs(&self, task: &Task, ctx: &TaskContext) {
        let hashing = self.policy_of(task) != Some(UpToDatePolicy::Timestamp);
        let outputs = task
            .targets
            .iter()
            .chain(ctx.generated_files())
            .chain(ctx.provided_files());
        for path in outputs {
            if hashing {
                self.hashes().refresh(path);
            } else {
                self.hashes().invalidate(path);
            }
        }
    }

    fn abort(&self, id: &str, phase: &str, err: &TaskError, queue: &BuildQueue) {
        let mut st = self.lock();
        fail_locked(&mut st, id, phase, err, queue);
    }

    pub(crate) fn execute(&self, entry: &QueueEntry, queue: &BuildQueue) {
        let task = Arc::clone(&entry.task);
        let id = task.id.as_str();
        let saved = {
            let mut st = self.lock();
            st.mark_running(id);
            st.records.get(id).cloned()
        };
        let mut ctx = TaskContext::new(Arc::clone(&task), saved);

        let current = match guarded(|| self.check_up_to_date(&task, &mut ctx)) {
            Ok(current) => current,
            Err(err) => return self.abort(id, "up-to-date check", &err, queue),
        };

        if current {
            debug!(task = %id, "up to date");
        } else {
            ctx.reset_outputs();
            self.record_inputs(&task, task.file_deps.iter());
            if let Some(action) = &task.action {
                info!(task = %id, priority = ?entry.priority, "running task");
                if let Err(err) = guarded(|| action(self, &mut ctx)) {
                    return self.abort(id, "action", &err, queue);
                }
            }
            self.record_inputs(&task, ctx.dyn_file_deps().iter());
            self.refresh_outputs(&task, &ctx);
        }

        let specs = match &task.factory {
            Some(factory) => match guarded(|| factory(self, &ctx)) {
                Ok(specs) => specs,
                Err(err) => return self.abort(id, "task factory", &err, queue),
            },
            None => Vec::new(),
        };

        let mut guard = self.lock();
        let st = &mut *guard;
        if current {
            st.up_to_date.push(id.to_string());
        } else {
            st.executed.push(id.to_string());
        }

        let mut provided = Vec::with_capacity(specs.len());
        for spec in specs {
            match st.register(spec, Some(id)) {
                Ok(sub) => provided.push(sub),
                Err(err) => {
                    let err = TaskError::Internal(err.to_string());
                    return fail_locked(st, id, "task factory", &err, queue);
                }
            }
        }
        if !provided.is_empty() {
            if let Err(err) = st.check_cycles() {
                let err = TaskError::Internal(err.to_string());
                return fail_locked(st, id, "task factory", &err, queue);
            }
        }

        ctx.set_provided_tasks(provided.clone());
        let record = ctx.to_record();
        if let Err(err) = st.finish(id, record, provided, self.fs(), queue) {
            let err = TaskError::Internal(err.to_string());
            fail_locked(st, id, "provided tasks", &err, queue);
        }
    }
}
