mod common;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use builddag::errors::BuilddagError;
use builddag::fs::mock::MockFileSystem;
use builddag::{Builder, TaskContext, TaskError, TaskSpec};
use builddag_test_utils::{init_tracing, ActionLog};

use crate::common::{concat_task, logging_task, mock_builder};

/// `out` copies `in`, failing with code 3 while `broken` is set.
fn flaky(log: &ActionLog, broken: &Arc<AtomicBool>) -> TaskSpec {
    let log = log.clone();
    let broken = Arc::clone(broken);
    TaskSpec::new()
        .target("out")
        .file_dep("in")
        .action(move |b: &Builder, ctx: &mut TaskContext| {
            log.push(ctx.id());
            if broken.load(Ordering::SeqCst) {
                return Err(TaskError::Failed(3));
            }
            let data = b.fs().read(Path::new("in"))?;
            b.fs().write(Path::new("out"), &data, false)?;
            Ok(())
        })
}

#[test]
fn failing_task_stops_the_build_and_is_retried_later() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("in", "1");
    let log = ActionLog::new();
    let broken = Arc::new(AtomicBool::new(false));
    let setup = |log: &ActionLog| {
        let b = mock_builder(&fs, 1);
        b.add_task(flaky(log, &broken)).unwrap();
        b.add_task(concat_task(log, "final", &["out"])).unwrap();
        b
    };

    assert!(setup(&log).build(&["final"]).success());

    fs.add_file("in", "2");
    broken.store(true, Ordering::SeqCst);
    log.clear();
    let b = setup(&log);
    let report = b.build(&["final"]);
    assert_eq!(report.rc, 3);
    assert_eq!(report.failed, ["out"]);
    assert_eq!(log.entries(), ["out"]);
    assert!(b.record("out").is_none());
    assert!(b.record("final").is_some());

    broken.store(false, Ordering::SeqCst);
    log.clear();
    let report = setup(&log).build(&["final"]);
    assert!(report.success(), "{report:?}");
    assert_eq!(log.entries(), ["out", "final"]);
    assert_eq!(fs.contents("final").as_deref(), Some("2"));
}

#[test]
fn panicking_action_is_reported_as_failure() {
    init_tracing();
    let fs = MockFileSystem::new();
    let b = mock_builder(&fs, 2);
    b.add_task(
        TaskSpec::named("boom").action(|_b: &Builder, _ctx: &mut TaskContext| panic!("kaboom")),
    )
    .unwrap();
    let report = b.build(&["boom"]);
    assert_eq!(report.rc, 1);
    assert_eq!(report.failed, ["boom"]);
}

#[test]
fn failing_check_skips_the_action() {
    init_tracing();
    let fs = MockFileSystem::new();
    let log = ActionLog::new();
    let b = mock_builder(&fs, 1);
    b.add_task(
        logging_task(&log, "checked").check(|_b: &Builder, _ctx: &mut TaskContext| {
            Err(TaskError::Internal("cannot decide".into()))
        }),
    )
    .unwrap();
    let report = b.build(&["checked"]);
    assert_eq!(report.rc, 1);
    assert!(log.is_empty());
}

#[test]
fn custom_check_decides_whether_the_action_runs() {
    init_tracing();
    let fs = MockFileSystem::new();
    let log = ActionLog::new();
    let current = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&current);
    let b = mock_builder(&fs, 1);
    b.add_task(logging_task(&log, "custom").check(move |_b: &Builder, _ctx: &mut TaskContext| {
        Ok(flag.load(Ordering::SeqCst))
    }))
    .unwrap();

    assert!(b.build(&["custom"]).success());
    current.store(true, Ordering::SeqCst);
    let report = b.build(&["custom"]);
    assert!(report.success());
    assert_eq!(report.up_to_date, ["custom"]);
    assert_eq!(log.count("custom"), 1);
}

#[test]
fn missing_source_fails_before_anything_runs() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("a.txt", "a");
    let log = ActionLog::new();
    let b = mock_builder(&fs, 2);
    b.add_task(concat_task(&log, "ok.txt", &["a.txt"])).unwrap();
    b.add_task(concat_task(&log, "bad.txt", &["ok.txt", "nowhere.txt"])).unwrap();

    let report = b.build(&["bad.txt"]);
    assert_eq!(report.rc, 1);
    assert!(report.executed.is_empty());
    assert!(log.is_empty());
}

#[test]
fn unknown_task_dependency_fails() {
    init_tracing();
    let fs = MockFileSystem::new();
    let log = ActionLog::new();
    let b = mock_builder(&fs, 1);
    b.add_task(logging_task(&log, "lonely").task_dep("ghost")).unwrap();
    assert_eq!(b.build(&["lonely"]).rc, 1);
    assert!(log.is_empty());
}

#[test]
fn dependency_cycle_fails_without_running_anything() {
    init_tracing();
    let fs = MockFileSystem::new();
    let log = ActionLog::new();
    let b = mock_builder(&fs, 2);
    b.add_task(logging_task(&log, "a").task_dep("b")).unwrap();
    b.add_task(logging_task(&log, "b").task_dep("a")).unwrap();

    let report = b.build(&["a"]);
    assert_eq!(report.rc, 1);
    assert!(log.is_empty());
}

#[test]
fn duplicate_declarations_are_rejected() {
    init_tracing();
    let fs = MockFileSystem::new();
    let log = ActionLog::new();
    let b = mock_builder(&fs, 1);
    b.add_task(logging_task(&log, "same")).unwrap();
    let err = b.add_task(logging_task(&log, "same")).unwrap_err();
    assert!(matches!(err, BuilddagError::DuplicateTask(ref id) if id == "same"));

    b.add_task(TaskSpec::named("first").target("shared.o")).unwrap();
    let err = b
        .add_task(TaskSpec::named("second").target("shared.o"))
        .unwrap_err();
    assert!(matches!(
        err,
        BuilddagError::DuplicateTarget { ref existing, .. } if existing == "first"
    ));

    let err = b.add_task(TaskSpec::new()).unwrap_err();
    assert!(matches!(err, BuilddagError::ConfigError(_)));
}

#[test]
fn corrupt_database_means_a_full_rebuild() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("a.txt", "a");
    let log = ActionLog::new();
    let setup = || {
        let b = mock_builder(&fs, 1);
        b.add_task(concat_task(&log, "out.txt", &["a.txt"])).unwrap();
        b
    };
    assert!(setup().build(&["out.txt"]).success());

    fs.add_file(".builddag.json", "{ not json");
    log.clear();
    let report = setup().build(&["out.txt"]);
    assert!(report.success());
    assert_eq!(log.entries(), ["out.txt"]);

    log.clear();
    assert!(setup().build(&["out.txt"]).executed.is_empty());
}
