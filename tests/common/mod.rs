#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use builddag::fs::mock::MockFileSystem;
use builddag::fs::FileSystem;
use builddag::{BuildOptions, Builder, TaskContext, TaskSpec};
use builddag_test_utils::ActionLog;

/// Builder over `fs` with `jobs` workers and the default database path.
pub fn mock_builder(fs: &MockFileSystem, jobs: usize) -> Builder {
    Builder::new(Arc::new(fs.clone()), BuildOptions::default().with_jobs(jobs))
}

/// Task writing the concatenation of its file dependencies to `out`,
/// logging its id to `log` every time the action runs.
pub fn concat_task(log: &ActionLog, out: &str, inputs: &[&str]) -> TaskSpec {
    let log = log.clone();
    let out_path = out.to_string();
    TaskSpec::new()
        .target(out)
        .file_deps(inputs.iter().copied())
        .action(move |b: &Builder, ctx: &mut TaskContext| {
            log.push(ctx.id());
            let mut data = Vec::new();
            for dep in ctx.file_deps() {
                data.extend(b.fs().read(Path::new(dep))?);
            }
            b.fs().write(Path::new(&out_path), &data, true)?;
            Ok(())
        })
}

/// Named task without outputs that only logs.
pub fn logging_task(log: &ActionLog, name: &str) -> TaskSpec {
    let log = log.clone();
    TaskSpec::named(name).action(move |_b: &Builder, ctx: &mut TaskContext| {
        log.push(ctx.id());
        Ok(())
    })
}

pub fn mtime(fs: &MockFileSystem, path: &str) -> SystemTime {
    fs.mod_time(Path::new(path)).unwrap()
}
