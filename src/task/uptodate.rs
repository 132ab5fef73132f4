// src/task/uptodate.rs

//! Built-in staleness policies.
//!
//! Both policies refuse to call a task current without a record from a
//! previous successful run, and both treat any change in the declared
//! targets or dependencies as a reason to run. On an up-to-date verdict the
//! context is seeded from the saved record.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::SystemTime;

use tracing::debug;

use crate::db::TaskRecord;
use crate::engine::Builder;
use crate::task::{TaskContext, TaskResult};

fn stale(ctx: &TaskContext, reason: &str) -> TaskResult<bool> {
    debug!(task = %ctx.id(), reason, "task is not up to date");
    Ok(false)
}

fn set(v: &[String]) -> BTreeSet<&str> {
    v.iter().map(String::as_str).collect()
}

/// Declared targets, static dependencies and task dependencies equal those
/// of the previous run, and every declared dynamic dependency was known
/// then.
fn declaration_unchanged(ctx: &TaskContext, saved: &TaskRecord) -> Option<&'static str> {
    let task = ctx.task();
    if set(&task.targets) != set(&saved.targets) {
        return Some("declared targets changed");
    }
    if set(&task.file_deps) != set(&saved.file_deps) {
        return Some("declared file dependencies changed");
    }
    if set(&task.task_deps) != set(&saved.task_deps) {
        return Some("declared task dependencies changed");
    }
    let known = set(&saved.dyn_file_deps);
    if !task.dyn_file_deps.iter().all(|d| known.contains(d.as_str())) {
        return Some("dynamic file dependencies changed");
    }
    None
}

/// Content-hash policy.
pub fn hash_up_to_date(builder: &Builder, ctx: &mut TaskContext) -> TaskResult<bool> {
    let Some(saved) = ctx.saved().cloned() else {
        return stale(ctx, "no record of a previous run");
    };
    let fs = builder.fs();

    if let Some(missing) = ctx.targets().iter().find(|t| !fs.exists(Path::new(t))) {
        debug!(task = %ctx.id(), target = %missing, "target missing");
        return stale(ctx, "target missing");
    }
    if let Some(reason) = declaration_unchanged(ctx, &saved) {
        return stale(ctx, reason);
    }

    let hashes = builder.hashes();
    let inputs = ctx.file_deps().iter().chain(&saved.dyn_file_deps);
    if let Some(changed) = inputs.into_iter().find(|p| !hashes.matches(p)) {
        debug!(task = %ctx.id(), path = %changed, "dependency hash changed");
        return stale(ctx, "dependency changed");
    }
    let outputs = ctx.targets().iter().chain(&saved.generated_files);
    if let Some(changed) = outputs.into_iter().find(|p| !hashes.matches(p)) {
        debug!(task = %ctx.id(), path = %changed, "output hash changed");
        return stale(ctx, "output changed");
    }

    ctx.seed_from_saved();
    Ok(true)
}

/// Modification-time policy: the oldest output must be no older than the
/// newest input.
pub fn timestamp_up_to_date(builder: &Builder, ctx: &mut TaskContext) -> TaskResult<bool> {
    let Some(saved) = ctx.saved().cloned() else {
        return stale(ctx, "no record of a previous run");
    };
    if let Some(reason) = declaration_unchanged(ctx, &saved) {
        return stale(ctx, reason);
    }
    let fs = builder.fs();
    let mtime = |p: &String| -> Option<SystemTime> {
        if !fs.exists(Path::new(p)) {
            return None;
        }
        fs.mod_time(Path::new(p)).ok()
    };

    let mut oldest_output: Option<SystemTime> = None;
    for out in ctx.targets().iter().chain(&saved.generated_files) {
        let Some(t) = mtime(out) else {
            debug!(task = %ctx.id(), path = %out, "output missing");
            return stale(ctx, "output missing");
        };
        oldest_output = Some(oldest_output.map_or(t, |o| o.min(t)));
    }

    let mut newest_input: Option<SystemTime> = None;
    for dep in ctx.file_deps().iter().chain(&saved.dyn_file_deps) {
        let Some(t) = mtime(dep) else {
            debug!(task = %ctx.id(), path = %dep, "dependency missing");
            return stale(ctx, "dependency missing");
        };
        newest_input = Some(newest_input.map_or(t, |n| n.max(t)));
    }

    if let (Some(out), Some(input)) = (oldest_output, newest_input) {
        if out < input {
            return stale(ctx, "dependency newer than output");
        }
    }

    ctx.seed_from_saved();
    Ok(true)
}
