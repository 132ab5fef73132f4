mod common;

use std::path::Path;

use builddag::fs::mock::MockFileSystem;
use builddag::fs::FileSystem;
use builddag_test_utils::{init_tracing, ActionLog};

use crate::common::{concat_task, mock_builder, mtime};

const OUT: &str = "out/concat.txt";

fn setup() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_file("src/a.txt", "aFile\n");
    fs.add_file("src/b.txt", "bFile\n");
    fs
}

#[test]
fn concat_builds_skips_and_rebuilds() {
    init_tracing();
    let fs = setup();
    let log = ActionLog::new();

    let b = mock_builder(&fs, 2);
    b.add_task(concat_task(&log, OUT, &["src/a.txt", "src/b.txt"])).unwrap();
    let report = b.build(&[OUT]);
    assert!(report.success());
    assert_eq!(log.count(OUT), 1);
    assert_eq!(fs.contents(OUT).as_deref(), Some("aFile\nbFile\n"));
    let first_mtime = mtime(&fs, OUT);

    // Fresh builder: state comes from the database.
    let b = mock_builder(&fs, 2);
    b.add_task(concat_task(&log, OUT, &["src/a.txt", "src/b.txt"])).unwrap();
    let report = b.build(&[OUT]);
    assert!(report.success());
    assert_eq!(report.up_to_date, [OUT]);
    assert_eq!(log.count(OUT), 1, "no rerun when nothing changed");
    assert_eq!(mtime(&fs, OUT), first_mtime, "target not rewritten");

    fs.add_file("src/b.txt", "__bFile\n");
    let b = mock_builder(&fs, 2);
    b.add_task(concat_task(&log, OUT, &["src/a.txt", "src/b.txt"])).unwrap();
    let report = b.build(&[OUT]);
    assert!(report.success());
    assert_eq!(report.executed, [OUT]);
    assert_eq!(fs.contents(OUT).as_deref(), Some("aFile\n__bFile\n"));
}

#[test]
fn repeated_builds_on_one_builder_are_idempotent() {
    init_tracing();
    let fs = setup();
    let log = ActionLog::new();
    let b = mock_builder(&fs, 3);
    b.add_task(concat_task(&log, OUT, &["src/a.txt", "src/b.txt"])).unwrap();

    assert!(b.build(&[OUT]).success());
    let content = fs.contents(OUT);
    for _ in 0..3 {
        let report = b.build(&[OUT]);
        assert!(report.success());
        assert!(report.executed.is_empty());
    }
    assert_eq!(log.count(OUT), 1);
    assert_eq!(fs.contents(OUT), content);
}

#[test]
fn deleting_the_target_triggers_a_rebuild() {
    init_tracing();
    let fs = setup();
    let log = ActionLog::new();
    let b = mock_builder(&fs, 1);
    b.add_task(concat_task(&log, OUT, &["src/a.txt", "src/b.txt"])).unwrap();
    assert!(b.build(&[OUT]).success());

    fs.remove(Path::new(OUT)).unwrap();
    assert!(b.build(&[OUT]).success());
    assert_eq!(log.count(OUT), 2);
    assert_eq!(fs.contents(OUT).as_deref(), Some("aFile\nbFile\n"));
}

#[test]
fn tampering_with_the_target_triggers_a_rebuild() {
    init_tracing();
    let fs = setup();
    let log = ActionLog::new();
    let b = mock_builder(&fs, 1);
    b.add_task(concat_task(&log, OUT, &["src/a.txt", "src/b.txt"])).unwrap();
    assert!(b.build(&[OUT]).success());

    fs.add_file(OUT, "edited by hand");
    assert!(b.build(&[OUT]).success());
    assert_eq!(log.count(OUT), 2);
    assert_eq!(fs.contents(OUT).as_deref(), Some("aFile\nbFile\n"));
}
