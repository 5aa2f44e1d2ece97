//! Emitter → stream → Aggregator round trips
//!
//! Tests registered in a `Registry` are run, their Z output captured, and the
//! captured stream aggregated.

use anyhow::{bail, ensure};
use zharness::aggregator::aggregate;
use zharness::emitter::Emitter;
use zharness::grammar::Status;
use zharness::registry::{skip, split_set, Registry, Settings, TestDef};
use zharness::report::ErrorKind;

fn settings() -> Settings {
    Settings {
        tag_skip: split_set("slow"),
        modes: split_set(""),
        program: "./zchk-demo".to_string(),
    }
}

fn emit(registry: &Registry, settings: &Settings) -> String {
    let mut emitter = Emitter::new(Vec::new());
    registry.run(settings, &mut emitter).unwrap();
    String::from_utf8(emitter.into_inner()).unwrap()
}

fn demo_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .group("str")
        .test("concat", |_| {
            ensure!(format!("{}{}", "a", "b") == "ab", "concat broken");
            Ok(())
        })
        .test("compare", |_| {
            let (lhs, rhs) = (1, 2);
            ensure!(lhs == rhs, "AssertionError: {} != {}", lhs, rhs);
            Ok(())
        })
        .add(TestDef::new("huge", |_| Ok(())).flags(["slow"]));
    registry
        .group("iop")
        .add(TestDef::new("pack", |_| bail!("unsupported type")).todo("iop#12"))
        .test("network", |_| Err(skip("no network in CI")));
    registry
}

#[test]
fn test_registry_stream_aggregates() {
    let stream = emit(&demo_registry(), &settings());
    let report = aggregate(&stream);

    assert_eq!(report.success_count, 1);
    assert_eq!(report.skipped_count, 2);
    assert_eq!(report.failed_count, 2);

    let kinds: Vec<_> = report.errors.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ErrorKind::Fail, ErrorKind::TodoFail]);
    assert_eq!(report.errors[0].qualified_name, "str.compare");
    assert_eq!(
        report.errors[0].context,
        "$ ./zchk-demo str.compare\n\nAssertionError: 1 != 2"
    );
    assert_eq!(report.errors[1].qualified_name, "iop.pack");
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_registry_stream_shape() {
    let stream = emit(&demo_registry(), &settings());
    let lines: Vec<&str> = stream.lines().collect();

    assert_eq!(lines[0], "1..3 str");
    assert_eq!(lines[1], "1 pass concat");
    assert_eq!(lines[2], "2 fail compare");
    assert_eq!(lines[3], ": $ ./zchk-demo str.compare");
    assert_eq!(lines[4], ":");
    assert!(lines.contains(&"3 skip huge # skipping tests flagged with slow"));
    assert!(lines.contains(&"1..2 iop"));
    assert!(lines.contains(&"1 todo-fail pack # iop#12"));
    assert!(lines.contains(&"2 skip network # no network in CI"));
}

#[test]
fn test_only_tolerated_failures_exit_zero() {
    let mut registry = Registry::new();
    registry
        .group("G")
        .test("ok", |_| Ok(()))
        .add(TestDef::new("known", |_| panic!("still broken")).todo("bug"));

    let report = aggregate(&emit(&registry, &settings()));
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ErrorKind::TodoFail);
    assert!(report.errors[0].context.contains("panicked: still broken"));
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_unexpected_success_is_fatal() {
    let mut registry = Registry::new();
    registry
        .group("G")
        .add(TestDef::new("fixed", |_| Ok(())).todo("bug"));

    let report = aggregate(&emit(&registry, &settings()));
    assert_eq!(report.errors[0].kind, ErrorKind::TodoPass);
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_truncated_stream_reports_missing() {
    // A group that crashed after its first result
    let mut emitter = Emitter::new(Vec::new());
    emitter.group("crashy", 3).unwrap();
    emitter.result(Status::Pass, "first", None).unwrap();
    let stream = String::from_utf8(emitter.into_inner()).unwrap();

    let report = aggregate(&stream);
    assert_eq!(report.success_count, 1);
    assert_eq!(report.failed_count, 2);
    assert!(report
        .errors
        .iter()
        .all(|e| e.kind == ErrorKind::Missing && e.qualified_name.starts_with("crashy.")));
}

#[test]
fn test_labels_with_hash_lose_comment_tail() {
    let mut emitter = Emitter::new(Vec::new());
    emitter.group("G", 1).unwrap();
    emitter.result(Status::Fail, "case#3", None).unwrap();
    let stream = String::from_utf8(emitter.into_inner()).unwrap();

    let report = aggregate(&stream);
    assert_eq!(report.errors[0].qualified_name, "G.case");
}
