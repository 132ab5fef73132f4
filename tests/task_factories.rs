mod common;

use std::path::Path;

use builddag::fs::mock::MockFileSystem;
use builddag::{Builder, TaskContext, TaskError, TaskSpec, UpToDate};
use builddag_test_utils::{init_tracing, ActionLog};

use crate::common::mock_builder;

fn obj(src: &str) -> String {
    format!("obj/{src}.o")
}

fn compile(log: &ActionLog, src: &str) -> TaskSpec {
    let log = log.clone();
    let (src_path, out_path) = (src.to_string(), obj(src));
    TaskSpec::new()
        .target(obj(src))
        .file_dep(src)
        .file_dep("gen/config.h")
        .action(move |b: &Builder, ctx: &mut TaskContext| {
            log.push(ctx.id());
            let header = b.fs().read_to_string(Path::new("gen/config.h"))?;
            let body = b.fs().read_to_string(Path::new(&src_path))?;
            let out = format!("{header}{}", body.to_uppercase());
            b.fs().write(Path::new(&out_path), out.as_bytes(), true)?;
            Ok(())
        })
}

/// Reads `srcs.list`, writes a generated header and provides one compile
/// task per listed source.
fn generator(log: &ActionLog) -> TaskSpec {
    let action_log = log.clone();
    let factory_log = log.clone();
    TaskSpec::named("gen")
        .file_dep("srcs.list")
        .action(move |b: &Builder, ctx: &mut TaskContext| {
            action_log.push(ctx.id());
            b.fs().write(Path::new("gen/config.h"), b"// generated\n", true)?;
            ctx.add_generated_file("gen/config.h");
            let list = b.fs().read_to_string(Path::new("srcs.list"))?;
            for src in list.lines().filter(|l| !l.trim().is_empty()) {
                ctx.add_provided_file(src.trim());
            }
            Ok(())
        })
        .factory(move |_b: &Builder, ctx: &TaskContext| {
            Ok(ctx
                .provided_files()
                .iter()
                .map(|src| compile(&factory_log, src))
                .collect())
        })
}

/// Links every object the generator's list names.
fn link(log: &ActionLog) -> TaskSpec {
    let log = log.clone();
    TaskSpec::new()
        .target("app")
        .file_dep("srcs.list")
        .task_dep("gen")
        .action(move |b: &Builder, ctx: &mut TaskContext| {
            log.push(ctx.id());
            let list = b.fs().read_to_string(Path::new("srcs.list"))?;
            let mut out = String::new();
            for src in list.lines().filter(|l| !l.trim().is_empty()) {
                let o = obj(src.trim());
                ctx.add_dyn_file_dep(&o);
                out.push_str(&b.fs().read_to_string(Path::new(&o))?);
            }
            b.fs().write(Path::new("app"), out.as_bytes(), true)?;
            Ok(())
        })
}

fn project() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_file("srcs.list", "a.c\nb.c\nc.c\n");
    fs.add_file("a.c", "a\n");
    fs.add_file("b.c", "b\n");
    fs.add_file("c.c", "c\n");
    fs
}

fn setup(fs: &MockFileSystem, log: &ActionLog) -> Builder {
    let b = mock_builder(fs, 3);
    b.add_task(generator(log)).unwrap();
    b.add_task(link(log)).unwrap();
    b
}

#[test]
fn provided_tasks_run_before_dependents_of_the_generator() {
    init_tracing();
    let fs = project();
    let log = ActionLog::new();

    let b = setup(&fs, &log);
    let report = b.build(&["app"]);
    assert!(report.success(), "{report:?}");

    let gen_pos = log.position("gen").unwrap();
    let app_pos = log.position("app").unwrap();
    for src in ["a.c", "b.c", "c.c"] {
        let pos = log.position(&obj(src)).unwrap();
        assert!(gen_pos < pos && pos < app_pos, "{:?}", log.entries());
    }
    assert_eq!(
        fs.contents("app").as_deref(),
        Some("// generated\nA\n// generated\nB\n// generated\nC\n")
    );
    let record = b.record("gen").unwrap();
    assert_eq!(record.provided_tasks, ["obj/a.c.o", "obj/b.c.o", "obj/c.c.o"]);
    assert_eq!(
        b.task("obj/b.c.o").unwrap().provided_by.as_deref(),
        Some("gen")
    );
}

#[test]
fn only_the_affected_provided_task_is_rebuilt() {
    init_tracing();
    let fs = project();
    let log = ActionLog::new();
    assert!(setup(&fs, &log).build(&["app"]).success());

    fs.add_file("b.c", "b changed\n");
    log.clear();
    let report = setup(&fs, &log).build(&["app"]);
    assert!(report.success(), "{report:?}");

    assert_eq!(log.entries(), ["obj/b.c.o", "app"]);
    for current in ["gen", "obj/a.c.o", "obj/c.c.o"] {
        assert!(report.up_to_date.iter().any(|t| t == current), "{report:?}");
    }
    assert!(fs.contents("app").unwrap().contains("B CHANGED"));

    log.clear();
    let report = setup(&fs, &log).build(&["app"]);
    assert!(report.executed.is_empty(), "{report:?}");
    assert_eq!(report.up_to_date.len(), 5);
}

#[test]
fn provided_target_requested_on_the_same_builder_waits_for_its_provider() {
    init_tracing();
    let fs = project();
    let log = ActionLog::new();
    let b = setup(&fs, &log);
    assert!(b.build(&["app"]).success());
    let app_before = fs.contents("app");

    fs.add_file("b.c", "b changed\n");
    log.clear();
    let report = b.build(&["obj/b.c.o"]);
    assert!(report.success(), "{report:?}");

    assert_eq!(log.entries(), ["obj/b.c.o"]);
    assert!(report.up_to_date.iter().any(|t| t == "gen"), "{report:?}");
    assert_eq!(fs.contents("obj/b.c.o").as_deref(), Some("// generated\nB CHANGED\n"));
    assert_eq!(fs.contents("app"), app_before);
}

#[test]
fn fresh_builder_rebuilds_a_stale_provided_target() {
    init_tracing();
    let fs = project();
    let log = ActionLog::new();
    assert!(setup(&fs, &log).build(&["app"]).success());

    fs.add_file("b.c", "b changed\n");
    log.clear();
    let report = setup(&fs, &log).build(&["obj/b.c.o"]);
    assert_eq!(report.rc, 0, "{report:?}");

    assert!(report.ran("obj/b.c.o"), "{report:?}");
    assert_eq!(log.entries(), ["obj/b.c.o"]);
    assert_eq!(fs.contents("obj/b.c.o").as_deref(), Some("// generated\nB CHANGED\n"));
}

#[test]
fn tasks_no_longer_provided_are_dropped() {
    init_tracing();
    let fs = project();
    let log = ActionLog::new();
    assert!(setup(&fs, &log).build(&["app"]).success());

    fs.add_file("srcs.list", "a.c\nb.c\n");
    let b = setup(&fs, &log);
    let report = b.build(&["app"]);
    assert!(report.success(), "{report:?}");
    assert!(report.ran("gen"));
    assert!(b.task("obj/c.c.o").is_none());
    assert!(b.record("obj/c.c.o").is_none());
    assert_eq!(b.record("gen").unwrap().provided_tasks.len(), 2);
}

#[test]
fn failing_factory_fails_the_build() {
    init_tracing();
    let fs = MockFileSystem::new();
    let b = mock_builder(&fs, 2);
    b.add_task(
        TaskSpec::named("gen")
            .factory(|_b: &Builder, _ctx: &TaskContext| Err(TaskError::Failed(4))),
    )
    .unwrap();
    let report = b.build(&["gen"]);
    assert_eq!(report.rc, 4);
    assert_eq!(report.failed, ["gen"]);
    assert!(b.record("gen").is_none());
}

#[test]
fn provided_target_clashing_with_a_declared_one_fails() {
    init_tracing();
    let fs = MockFileSystem::new();
    let b = mock_builder(&fs, 2);
    b.add_task(TaskSpec::new().target("out/a")).unwrap();
    b.add_task(TaskSpec::named("gen").factory(|_b: &Builder, _ctx: &TaskContext| {
        Ok(vec![TaskSpec::named("sub").target("out/a")])
    }))
    .unwrap();
    let report = b.build(&["gen"]);
    assert_eq!(report.rc, 1);
    assert!(b.task("sub").is_none());
}

#[test]
fn nested_factories_complete_bottom_up() {
    init_tracing();
    let fs = MockFileSystem::new();
    let log = ActionLog::new();
    let b = mock_builder(&fs, 2);

    let leaf_log = log.clone();
    let mid_log = log.clone();
    b.add_task(
        TaskSpec::named("root")
            .up_to_date(UpToDate::Always)
            .factory(move |_b: &Builder, _ctx: &TaskContext| {
                let leaf_log = leaf_log.clone();
                let mid_log = mid_log.clone();
                Ok(vec![TaskSpec::named("mid")
                    .action(move |_b: &Builder, ctx: &mut TaskContext| {
                        mid_log.push(ctx.id());
                        Ok(())
                    })
                    .factory(move |_b: &Builder, _ctx: &TaskContext| {
                        let leaf_log = leaf_log.clone();
                        Ok(vec![TaskSpec::named("leaf").action(
                            move |_b: &Builder, ctx: &mut TaskContext| {
                                leaf_log.push(ctx.id());
                                Ok(())
                            },
                        )])
                    })])
            }),
    )
    .unwrap();
    let after_log = log.clone();
    b.add_task(
        TaskSpec::named("after")
            .task_dep("root")
            .action(move |_b: &Builder, ctx: &mut TaskContext| {
                after_log.push(ctx.id());
                Ok(())
            }),
    )
    .unwrap();

    let report = b.build(&["after"]);
    assert!(report.success(), "{report:?}");
    assert_eq!(log.entries(), ["mid", "leaf", "after"]);
    assert!(report.up_to_date.iter().any(|t| t == "root"));
}
