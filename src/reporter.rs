//! Reporter Module: Trait-based output for Human (CLI) and Machine (JSON) formats
//!
//! The aggregator drives a `Reporter` with every reconciled ordinal, so
//! structured outputs never need the aggregator itself to buffer results.
//!
//! ## Architecture
//!
//! - `Reporter` trait defines the event callbacks
//! - `HumanReporter` prints the totals block once the stream is reconciled
//! - `JsonReporter` outputs NDJSON (for --format=json)
//! - `MultiReporter` broadcasts to several reporters
//!
//! When JsonReporter is active, ONLY valid JSON goes to stdout. Diagnostics
//! always go through `tracing`, which writes to stderr.

use crate::grammar::Status;
use crate::report::{ErrorEntry, Report};
use serde::Serialize;
use std::io::{self, Write};

/// What became of one ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Reported(Status),
    /// Declared but never seen; synthesized by the aggregator
    Missing,
    /// Ordinal regression; the ordinal is the one written on the line
    BadNumber,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Reported(status) => status.as_str(),
            Outcome::Missing => "missing",
            Outcome::BadNumber => "bad-number",
        }
    }
}

/// One reconciled ordinal
#[derive(Debug, Clone, Copy)]
pub struct TestEvent<'a> {
    pub group: &'a str,
    pub ordinal: u32,
    /// `None` for missing ordinals
    pub label: Option<&'a str>,
    pub outcome: Outcome,
}

/// Machine-readable events for JSON output
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MachineEvent<'a> {
    /// Emitted when a group header opens a new group
    GroupStart { group: &'a str, declared: u32 },
    /// Emitted for every reconciled ordinal
    TestFinished {
        group: &'a str,
        ordinal: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<&'a str>,
        status: &'a str,
    },
    /// Emitted for a context line kept by the last failing test
    Context { text: &'a str },
    /// Emitted once at end of stream
    RunFinished {
        passed: u64,
        failed: u64,
        skipped: u64,
        exit_code: i32,
        errors: &'a [ErrorEntry],
    },
}

/// Reporter trait for output abstraction
pub trait Reporter {
    /// Called when a group header is accepted
    fn on_group_start(&mut self, name: &str, declared: u32);

    /// Called for every ordinal folded into the counters
    fn on_test_finished(&mut self, event: &TestEvent<'_>);

    /// Called for a context line attached to the last failing test
    fn on_context(&mut self, text: &str);

    /// Called once, after end-of-stream reconciliation
    fn on_run_finished(&mut self, report: &Report);
}

/// Reporter that ignores every event
pub struct NullReporter;

impl Reporter for NullReporter {
    fn on_group_start(&mut self, _name: &str, _declared: u32) {}
    fn on_test_finished(&mut self, _event: &TestEvent<'_>) {}
    fn on_context(&mut self, _text: &str) {}
    fn on_run_finished(&mut self, _report: &Report) {}
}

// =============================================================================
// HumanReporter
// =============================================================================

/// Human Reporter - prints the totals and error list when the run finishes
pub struct HumanReporter<W: Write = io::Stdout> {
    out: W,
}

impl HumanReporter {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> HumanReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for HumanReporter<W> {
    fn on_group_start(&mut self, name: &str, declared: u32) {
        tracing::debug!(group = name, declared, "group started");
    }

    fn on_test_finished(&mut self, _event: &TestEvent<'_>) {}

    fn on_context(&mut self, _text: &str) {}

    fn on_run_finished(&mut self, report: &Report) {
        if let Err(e) = report.render(&mut self.out).and_then(|_| self.out.flush()) {
            tracing::error!("failed to write report: {}", e);
        }
    }
}

// =============================================================================
// JsonReporter
// =============================================================================

/// JSON Reporter - outputs NDJSON, one event per line
pub struct JsonReporter<W: Write = io::Stdout> {
    out: W,
}

impl JsonReporter {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, event: &MachineEvent<'_>) {
        let res = serde_json::to_writer(&mut self.out, event)
            .map_err(io::Error::from)
            .and_then(|_| self.out.write_all(b"\n"))
            .and_then(|_| self.out.flush());
        if let Err(e) = res {
            tracing::error!("failed to write JSON event: {}", e);
        }
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn on_group_start(&mut self, name: &str, declared: u32) {
        self.emit(&MachineEvent::GroupStart {
            group: name,
            declared,
        });
    }

    fn on_test_finished(&mut self, event: &TestEvent<'_>) {
        self.emit(&MachineEvent::TestFinished {
            group: event.group,
            ordinal: event.ordinal,
            label: event.label,
            status: event.outcome.as_str(),
        });
    }

    fn on_context(&mut self, text: &str) {
        self.emit(&MachineEvent::Context { text });
    }

    fn on_run_finished(&mut self, report: &Report) {
        self.emit(&MachineEvent::RunFinished {
            passed: report.success_count,
            failed: report.failed_count,
            skipped: report.skipped_count,
            exit_code: report.exit_code(),
            errors: &report.errors,
        });
    }
}

// =============================================================================
// MultiReporter
// =============================================================================

/// MultiReporter - broadcasts events to multiple reporters
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }
}

impl Reporter for MultiReporter {
    fn on_group_start(&mut self, name: &str, declared: u32) {
        for r in &mut self.reporters {
            r.on_group_start(name, declared);
        }
    }

    fn on_test_finished(&mut self, event: &TestEvent<'_>) {
        for r in &mut self.reporters {
            r.on_test_finished(event);
        }
    }

    fn on_context(&mut self, text: &str) {
        for r in &mut self.reporters {
            r.on_context(text);
        }
    }

    fn on_run_finished(&mut self, report: &Report) {
        for r in &mut self.reporters {
            r.on_run_finished(report);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ErrorKind;

    #[test]
    fn test_json_event_serialization() {
        let event = MachineEvent::TestFinished {
            group: "Demo",
            ordinal: 1,
            label: Some("test_foo"),
            status: "pass",
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"test_finished\""));
        assert!(json.contains("\"label\":\"test_foo\""));
        assert!(json.contains("\"status\":\"pass\""));
    }

    #[test]
    fn test_json_missing_has_no_label() {
        let event = MachineEvent::TestFinished {
            group: "Demo",
            ordinal: 2,
            label: None,
            status: "missing",
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("label")); // skip_serializing_if = None
    }

    #[test]
    fn test_json_reporter_writes_ndjson() {
        let mut reporter = JsonReporter::new(Vec::new());
        reporter.on_group_start("Demo", 1);
        reporter.on_test_finished(&TestEvent {
            group: "Demo",
            ordinal: 1,
            label: Some("a"),
            outcome: Outcome::Reported(Status::Fail),
        });
        reporter.on_context("boom");
        let report = Report {
            failed_count: 1,
            errors: vec![ErrorEntry::new(ErrorKind::Fail, "Demo", "a")],
            ..Report::default()
        };
        reporter.on_run_finished(&report);

        let out = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        for line in &lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
        assert!(lines[3].contains("\"exit_code\":1"));
        assert!(lines[3].contains("\"kind\":\"fail\""));
    }

    #[test]
    fn test_human_reporter_renders_on_finish() {
        let mut reporter = HumanReporter::new(Vec::new());
        reporter.on_run_finished(&Report::default());
        let out = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(out, "NO TESTS FOUND\n");
    }

    #[test]
    fn test_outcome_names() {
        assert_eq!(Outcome::Missing.as_str(), "missing");
        assert_eq!(Outcome::BadNumber.as_str(), "bad-number");
        assert_eq!(Outcome::Reported(Status::TodoPass).as_str(), "todo-pass");
    }
}
