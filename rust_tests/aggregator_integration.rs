//! Integration tests for stream reconciliation
//!
//! Each test feeds a complete Z stream and checks the counters, the error
//! list, the rendered summary and the exit code.

use std::cell::RefCell;
use std::rc::Rc;
use zharness::aggregator::{aggregate, Aggregator};
use zharness::report::{ErrorKind, Report};
use zharness::reporter::{JsonReporter, Outcome, Reporter, TestEvent};

const DEMO: &str = "1..2 Demo\n1 pass test_a\n2 fail test_b\n: AssertionError: x != y\n";

/// Records outcomes as strings for assertions
#[derive(Default, Clone)]
struct Recorder(Rc<RefCell<Vec<String>>>);

impl Reporter for Recorder {
    fn on_group_start(&mut self, name: &str, declared: u32) {
        self.0.borrow_mut().push(format!("group {} {}", name, declared));
    }

    fn on_test_finished(&mut self, event: &TestEvent<'_>) {
        self.0.borrow_mut().push(format!(
            "{} {} {}",
            event.ordinal,
            event.outcome.as_str(),
            event.label.unwrap_or("-")
        ));
    }

    fn on_context(&mut self, text: &str) {
        self.0.borrow_mut().push(format!(": {}", text));
    }

    fn on_run_finished(&mut self, report: &Report) {
        self.0.borrow_mut().push(format!("done {}", report.total()));
    }
}

#[test]
fn test_end_to_end_demo_stream() {
    let report = aggregate(DEMO);

    assert_eq!(report.success_count, 1);
    assert_eq!(report.failed_count, 1);
    assert_eq!(report.skipped_count, 0);
    assert_eq!(report.errors.len(), 1);
    let entry = &report.errors[0];
    assert_eq!(entry.kind, ErrorKind::Fail);
    assert_eq!(entry.qualified_name, "Demo.test_b");
    assert_eq!(entry.context, "AssertionError: x != y");
    assert_ne!(report.exit_code(), 0);
}

#[test]
fn test_end_to_end_rendering() {
    let text = aggregate(DEMO).render_to_string();
    assert_eq!(
        text,
        "\n# TOTAL\n# Skipped 0 (0%)\n# Failed  1 (50%)\n# Success 1 (50%)\n\
         \n: ERRORS\n: - Demo.test_b: fail\n:   AssertionError: x != y\n"
    );
}

#[test]
fn test_totals_equal_reconciled_ordinals() {
    let input = "\
1..4 A
1 pass a
3 skip c
3 pass again
1..3 B
2 todo-fail b # known
: ctx
1..2 C
";
    let report = aggregate(input);
    // A: 1,2(missing),3,4(missing) plus one bad-number; B: 1(missing),2,3(missing); C: 1,2 missing
    assert_eq!(report.total(), 4 + 1 + 3 + 2);
    assert_eq!(report.success_count, 1);
    assert_eq!(report.skipped_count, 1);
    assert_eq!(report.failed_count, 8);
}

#[test]
fn test_clean_groups_have_no_errors() {
    let input = "1..2 A\n1 pass a\n2 skip b\n1..1 B\n1 pass c\n";
    let report = aggregate(input);
    assert!(report.errors.is_empty());
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_skip_context_is_discarded() {
    let report = aggregate("1..2 G\n1 skip a # later\n: nothing\n: here\n2 fail b\n: one\n: two\n");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].context, "one\ntwo");
}

#[test]
fn test_leading_blank_context_line_is_kept() {
    let report = aggregate("1..1 G\n1 fail a\n:\n: x\n");
    assert_eq!(report.errors[0].context, "\nx");
    assert!(report.render_to_string().ends_with(": - G.a: fail\n:   \n:   x\n"));
}

#[test]
fn test_todo_pass_counts_as_success_but_fails_run() {
    let report = aggregate("1..2 G\n1 todo-pass a\n2 pass b\n");
    assert_eq!(report.success_count, 2);
    assert_eq!(report.failed_count, 0);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ErrorKind::TodoPass);
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_context_before_any_result_is_discarded() {
    let report = aggregate(": stray\n1..1 G\n: stray too\n1 pass a\n");
    assert!(report.errors.is_empty());
    assert_eq!(report.success_count, 1);
}

#[test]
fn test_group_header_stops_context_attachment() {
    let report = aggregate("1..1 A\n1 fail a\n1..1 B\n: late\n1 pass b\n");
    assert_eq!(report.errors[0].context, "");
}

#[test]
fn test_bad_number_does_not_advance() {
    let report = aggregate("1..3 G\n1 pass a\n2 pass b\n1 pass dup\n3 pass c\n");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ErrorKind::BadNumber);
    assert_eq!(report.errors[0].qualified_name, "G.dup");
    assert_eq!(report.success_count, 3);
}

#[test]
fn test_tolerated_and_hard_todo() {
    let tolerated = aggregate("1..2 G\n1 pass a\n2 todo-fail b # bug 1\n");
    assert_eq!(tolerated.errors.len(), 1);
    assert_eq!(tolerated.exit_code(), 0);
    assert!(tolerated.render_to_string().contains(": - G.b: todo-fail"));

    let hard = aggregate("1..1 G\n1 todo-pass b\n");
    assert_ne!(hard.exit_code(), 0);
}

#[test]
fn test_no_tests_found() {
    let report = aggregate("# nothing to see\nrandom noise\n");
    assert_eq!(report.render_to_string(), "NO TESTS FOUND\n");
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_zero_declared_group_is_not_an_error() {
    let report = aggregate("1..0 Empty\n");
    assert_eq!(report.total(), 0);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_reporter_sees_every_ordinal_in_order() {
    let recorder = Recorder::default();
    let log = recorder.0.clone();

    let mut agg = Aggregator::with_reporter(Box::new(recorder));
    for line in "1..3 G\n1 pass a\n3 fail c\n: why\n3 pass dup\n".lines() {
        agg.feed(line);
    }
    agg.finish();

    assert_eq!(
        *log.borrow(),
        vec![
            "group G 3",
            "1 pass a",
            "2 missing -",
            "3 fail c",
            ": why",
            "3 bad-number dup",
            "done 4",
        ]
    );
}

#[test]
fn test_json_reporter_through_aggregator() {
    let mut buf = Vec::new();
    {
        let reporter = JsonReporter::new(&mut buf);
        let report = Aggregator::with_reporter(Box::new(reporter))
            .scan(DEMO.as_bytes())
            .unwrap();
        assert_eq!(report.failed_count, 1);
    }

    let out = String::from_utf8(buf).unwrap();
    let events: Vec<serde_json::Value> = out
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 5);
    assert_eq!(events[0]["event"], "group_start");
    assert_eq!(events[2]["status"], "fail");
    assert_eq!(events[3]["text"], "AssertionError: x != y");
    assert_eq!(events[4]["event"], "run_finished");
    assert_eq!(events[4]["errors"][0]["qualified_name"], "Demo.test_b");
}

#[test]
fn test_outcome_variants_exported() {
    assert_eq!(Outcome::Missing.as_str(), "missing");
}
