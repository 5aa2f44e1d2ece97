//! JUnit XML Reporter for CI Integration
//!
//! Generates JUnit-compatible XML for Jenkins, GitLab CI, and GitHub Actions.
//! One `<testsuite>` per Z group; synthesized `missing` and `bad-number`
//! ordinals appear as failed cases so the XML agrees with the exit code.

use crate::grammar::Status;
use crate::report::Report;
use crate::reporter::{Outcome, Reporter, TestEvent};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Strip ANSI color codes from strings
fn strip_ansi_codes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            // Skip escape sequence
            if chars.peek() == Some(&'[') {
                chars.next();
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
        } else if c != '\0' {
            result.push(c);
        }
    }
    result
}

// =============================================================================
// XML Schema Structs (JUnit Format)
// =============================================================================

#[derive(Serialize)]
#[serde(rename = "testsuites")]
struct TestSuites {
    #[serde(rename = "@tests")]
    tests: u64,
    #[serde(rename = "@failures")]
    failures: u64,
    #[serde(rename = "@skipped")]
    skipped: u64,
    #[serde(rename = "testsuite")]
    suites: Vec<TestSuite>,
}

#[derive(Serialize)]
struct TestSuite {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@tests")]
    tests: usize,
    #[serde(rename = "@failures")]
    failures: usize,
    #[serde(rename = "@errors")]
    errors: usize,
    #[serde(rename = "@skipped")]
    skipped: usize,
    #[serde(rename = "testcase")]
    cases: Vec<TestCase>,
}

#[derive(Serialize)]
struct TestCase {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@classname")]
    classname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<Failure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<Skipped>,
}

#[derive(Serialize)]
struct Failure {
    #[serde(rename = "@message")]
    message: String,
    #[serde(rename = "$text")]
    body: String,
}

#[derive(Serialize)]
struct Skipped {
    #[serde(rename = "@message")]
    message: String,
}

impl TestSuite {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tests: 0,
            failures: 0,
            errors: 0,
            skipped: 0,
            cases: Vec::new(),
        }
    }
}

// =============================================================================
// JunitReporter
// =============================================================================

/// Reporter that buffers results and writes JUnit XML on completion
pub struct JunitReporter {
    output_path: PathBuf,
    suites: Vec<TestSuite>,
    /// Whether context lines belong to the last case
    collecting_context: bool,
}

impl JunitReporter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            output_path: path,
            suites: Vec::new(),
            collecting_context: false,
        }
    }

    fn render(&mut self, report: &Report) -> Result<String, quick_xml::de::DeError> {
        let root = TestSuites {
            tests: report.total(),
            failures: report.failed_count,
            skipped: report.skipped_count,
            suites: std::mem::take(&mut self.suites),
        };
        quick_xml::se::to_string(&root)
    }

    fn write(&self, xml: &str) -> std::io::Result<()> {
        let file = File::create(&self.output_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n")?;
        writer.write_all(xml.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl Reporter for JunitReporter {
    fn on_group_start(&mut self, name: &str, _declared: u32) {
        self.suites.push(TestSuite::new(name));
        self.collecting_context = false;
    }

    fn on_test_finished(&mut self, event: &TestEvent<'_>) {
        if self.suites.is_empty() {
            self.suites.push(TestSuite::new(event.group));
        }
        let Some(suite) = self.suites.last_mut() else {
            return;
        };

        let name = match event.label {
            Some(label) => label.to_string(),
            None => format!("({})(unknown)", event.ordinal),
        };

        let (failure, skipped) = match event.outcome {
            Outcome::Reported(Status::Pass) => (None, None),
            Outcome::Reported(Status::Skip) => (
                None,
                Some(Skipped {
                    message: "skipped".to_string(),
                }),
            ),
            Outcome::Reported(Status::TodoFail) => (
                None,
                Some(Skipped {
                    message: "todo-fail".to_string(),
                }),
            ),
            outcome => (
                Some(Failure {
                    message: outcome.as_str().to_string(),
                    body: String::new(),
                }),
                None,
            ),
        };

        suite.tests += 1;
        if failure.is_some() {
            suite.failures += 1;
        }
        if skipped.is_some() {
            suite.skipped += 1;
        }
        // Context only follows fail/todo-fail/todo-pass results
        self.collecting_context = matches!(event.outcome, Outcome::Reported(s) if s.accepts_context());

        suite.cases.push(TestCase {
            name,
            classname: suite.name.clone(),
            failure,
            skipped,
        });
    }

    fn on_context(&mut self, text: &str) {
        if !self.collecting_context {
            return;
        }
        let Some(case) = self.suites.last_mut().and_then(|s| s.cases.last_mut()) else {
            return;
        };
        // todo-fail keeps its context out of the XML; it is tolerated
        if let Some(failure) = case.failure.as_mut() {
            if !failure.body.is_empty() {
                failure.body.push('\n');
            }
            failure.body.push_str(&strip_ansi_codes(text));
        }
    }

    fn on_run_finished(&mut self, report: &Report) {
        let xml = match self.render(report) {
            Ok(xml) => xml,
            Err(e) => {
                tracing::error!("failed to serialize JUnit report: {}", e);
                return;
            }
        };
        match self.write(&xml) {
            Ok(()) => tracing::info!(
                "JUnit report written to {}",
                self.output_path.display()
            ),
            Err(e) => tracing::error!(
                "failed to write JUnit report to {}: {}",
                self.output_path.display(),
                e
            ),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use tempfile::TempDir;

    fn event<'a>(group: &'a str, ordinal: u32, label: Option<&'a str>, outcome: Outcome) -> TestEvent<'a> {
        TestEvent {
            group,
            ordinal,
            label,
            outcome,
        }
    }

    #[test]
    fn test_strip_ansi_codes() {
        assert_eq!(strip_ansi_codes("\x1b[31mRed text\x1b[0m"), "Red text");
        assert_eq!(strip_ansi_codes("plain text"), "plain text");
        assert_eq!(strip_ansi_codes("\x1b[1m\x1b[31mBold Red\x1b[0m"), "Bold Red");
        assert_eq!(strip_ansi_codes("text\0with\0nulls"), "textwithnulls");
    }

    #[test]
    fn test_junit_reporter_buffers_cases_per_group() {
        let mut reporter = JunitReporter::new(PathBuf::from("/tmp/unused.xml"));
        reporter.on_group_start("A", 2);
        reporter.on_test_finished(&event("A", 1, Some("a1"), Outcome::Reported(Status::Pass)));
        reporter.on_test_finished(&event("A", 2, None, Outcome::Missing));
        reporter.on_group_start("B", 1);
        reporter.on_test_finished(&event("B", 1, Some("b1"), Outcome::Reported(Status::Skip)));

        assert_eq!(reporter.suites.len(), 2);
        assert_eq!(reporter.suites[0].failures, 1);
        assert_eq!(reporter.suites[0].cases[1].name, "(2)(unknown)");
        assert_eq!(reporter.suites[1].skipped, 1);
        assert_eq!(reporter.suites[1].cases[0].classname, "B");
    }

    #[test]
    fn test_junit_failure_collects_context_without_ansi() {
        let mut reporter = JunitReporter::new(PathBuf::from("/tmp/unused.xml"));
        reporter.on_group_start("G", 1);
        reporter.on_test_finished(&event("G", 1, Some("t"), Outcome::Reported(Status::Fail)));
        reporter.on_context("\x1b[31mAssertionError\x1b[0m");
        reporter.on_context("second");

        let failure = reporter.suites[0].cases[0].failure.as_ref().unwrap();
        assert_eq!(failure.message, "fail");
        assert_eq!(failure.body, "AssertionError\nsecond");
    }

    #[test]
    fn test_junit_file_written_from_aggregator() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.xml");
        let reporter = JunitReporter::new(path.clone());

        let mut agg = Aggregator::with_reporter(Box::new(reporter));
        for line in ["1..2 Demo", "1 pass test_a", "2 fail test_b", ": x != y"] {
            agg.feed(line);
        }
        let report = agg.finish();
        assert_eq!(report.exit_code(), 1);

        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<testsuite name=\"Demo\""));
        assert!(xml.contains("name=\"test_b\""));
        assert!(xml.contains("x != y"));
    }
}
