// src/exec/command.rs

//! Running a task's shell command.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::engine::Builder;
use crate::task::{TaskContext, TaskError, TaskResult};

fn shell(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

/// Run `cmd` through the platform shell in `cwd` and wait for it.
///
/// Stdout lines are logged at `info`, stderr at `debug` (at `warn` when the
/// command fails). A non-zero exit becomes [`TaskError::Failed`].
pub fn run_shell(task: &str, cmd: &str, cwd: &Path) -> TaskResult<()> {
    info!(task = %task, cmd = %cmd, "starting task process");

    let output = shell(cmd)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| TaskError::Internal(format!("spawning process for task '{task}': {e}")))?;

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        info!(task = %task, "stdout: {}", line);
    }
    let failed = !output.status.success();
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        if failed {
            warn!(task = %task, "stderr: {}", line);
        } else {
            debug!(task = %task, "stderr: {}", line);
        }
    }

    match output.status.code() {
        Some(0) => {
            debug!(task = %task, "task process exited");
            Ok(())
        }
        Some(code) => Err(TaskError::Failed(code)),
        None => Err(TaskError::Internal(format!(
            "process for task '{task}' was terminated by a signal"
        ))),
    }
}

/// Task action running `cmd` in `cwd`.
pub fn shell_action(
    cmd: impl Into<String>,
    cwd: impl Into<PathBuf>,
) -> impl Fn(&Builder, &mut TaskContext) -> TaskResult<()> + Send + Sync + 'static {
    let cmd = cmd.into();
    let cwd = cwd.into();
    move |_builder: &Builder, ctx: &mut TaskContext| run_shell(ctx.id(), &cmd, &cwd)
}
