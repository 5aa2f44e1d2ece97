//! Aggregator: reconciles a Z stream into a [`Report`]
//!
//! A single forward pass over the input. The only state kept between lines is
//! the open group (name, declared count, last accepted ordinal), whether the
//! previous line was a failing result, and the report being built. Each
//! `Aggregator` is independent; nothing is process-wide.
//!
//! ## Reconciliation
//!
//! - ordinal <= last accepted: `bad-number`, ordinal not advanced
//! - ordinal jumps ahead: one `missing` per skipped ordinal
//! - new header or end of stream: one `missing` per undeclared-yet-unseen
//!   ordinal of the previous group

use crate::grammar::{classify, Line, Status};
use crate::report::{ErrorEntry, ErrorKind, Report};
use crate::reporter::{NullReporter, Outcome, Reporter, TestEvent};
use std::io::{self, BufRead};

struct GroupState {
    name: String,
    declared: u32,
    observed: u32,
}

pub struct Aggregator<'r> {
    group: Option<GroupState>,
    last_failing: bool,
    report: Report,
    reporter: Box<dyn Reporter + 'r>,
}

impl Default for Aggregator<'_> {
    fn default() -> Self {
        Self::with_reporter(Box::new(NullReporter))
    }
}

impl Aggregator<'static> {
    pub fn new() -> Self {
        Self::with_reporter(Box::new(NullReporter))
    }
}

impl<'r> Aggregator<'r> {
    pub fn with_reporter(reporter: Box<dyn Reporter + 'r>) -> Self {
        Self {
            group: None,
            last_failing: false,
            report: Report::default(),
            reporter,
        }
    }

    /// Counters and errors so far; missing ordinals of the open group are
    /// only added by [`Aggregator::finish`].
    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Last ordinal accepted in the open group
    pub fn observed_ordinal(&self) -> u32 {
        self.group.as_ref().map_or(0, |g| g.observed)
    }

    /// Process one physical line.
    pub fn feed(&mut self, raw: &str) {
        match classify(raw) {
            Line::Context(text) => self.on_context(text),
            Line::Group { declared, name } => self.on_group(declared, name),
            Line::Result {
                ordinal,
                status,
                label,
            } => self.on_result(ordinal, status, label),
            Line::Ignored => {
                if !raw.trim().is_empty() {
                    tracing::trace!(line = raw, "ignored line");
                }
            }
        }
    }

    /// Feed every line of `input` and return how many were read. Invalid
    /// UTF-8 is replaced rather than rejected.
    pub fn read_from<R: BufRead>(&mut self, mut input: R) -> io::Result<usize> {
        self.read_from_with(&mut input, |_| {})
    }

    /// Like [`Aggregator::read_from`], handing each line to `tap` first.
    pub fn read_from_with<R, F>(&mut self, mut input: R, mut tap: F) -> io::Result<usize>
    where
        R: BufRead,
        F: FnMut(&str),
    {
        let mut buf = Vec::new();
        let mut lines = 0;
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            let line = String::from_utf8_lossy(&buf);
            tap(&line);
            self.feed(&line);
            lines += 1;
        }
        Ok(lines)
    }

    /// Read `input` to end of stream, then reconcile and report.
    pub fn scan<R: BufRead>(mut self, input: R) -> io::Result<Report> {
        self.read_from(input)?;
        Ok(self.finish())
    }

    /// End of stream: reconcile the last group and hand out the report.
    pub fn finish(mut self) -> Report {
        self.close_group();
        self.reporter.on_run_finished(&self.report);
        tracing::debug!(
            passed = self.report.success_count,
            failed = self.report.failed_count,
            skipped = self.report.skipped_count,
            errors = self.report.errors.len(),
            "stream reconciled"
        );
        self.report
    }

    fn on_context(&mut self, text: &str) {
        if !self.last_failing {
            return;
        }
        if let Some(entry) = self.report.errors.last_mut() {
            entry.push_context(text);
            self.reporter.on_context(text);
        }
    }

    fn on_group(&mut self, declared: u32, name: &str) {
        self.close_group();
        self.last_failing = false;
        self.group = Some(GroupState {
            name: name.to_string(),
            declared,
            observed: 0,
        });
        self.reporter.on_group_start(name, declared);
    }

    fn on_result(&mut self, ordinal: u32, status: Status, label: &str) {
        self.last_failing = false;

        // Results before any header belong to an unnamed group
        let group = self.group.get_or_insert_with(|| GroupState {
            name: String::new(),
            declared: 0,
            observed: 0,
        });

        if ordinal <= group.observed {
            tracing::debug!(
                group = %group.name,
                ordinal,
                last = group.observed,
                "ordinal did not advance"
            );
            self.report
                .errors
                .push(ErrorEntry::new(ErrorKind::BadNumber, &group.name, label));
            self.report.failed_count += 1;
            self.reporter.on_test_finished(&TestEvent {
                group: &group.name,
                ordinal,
                label: Some(label),
                outcome: Outcome::BadNumber,
            });
            return;
        }

        let first_missing = group.observed + 1;
        if ordinal > first_missing {
            tracing::debug!(group = %group.name, from = first_missing, to = ordinal - 1, "gap in ordinals");
        }
        for missing in first_missing..ordinal {
            Self::push_missing(&mut self.report, self.reporter.as_mut(), &group.name, missing);
        }

        match status {
            Status::Fail | Status::TodoFail => {
                let kind = match status {
                    Status::Fail => ErrorKind::Fail,
                    _ => ErrorKind::TodoFail,
                };
                self.report
                    .errors
                    .push(ErrorEntry::new(kind, &group.name, label));
                self.report.failed_count += 1;
                self.last_failing = true;
            }
            // Counted as a success; the error entry alone makes the exit fatal
            Status::TodoPass => {
                self.report
                    .errors
                    .push(ErrorEntry::new(ErrorKind::TodoPass, &group.name, label));
                self.report.success_count += 1;
                self.last_failing = true;
            }
            Status::Skip => self.report.skipped_count += 1,
            Status::Pass => self.report.success_count += 1,
        }
        group.observed = ordinal;

        self.reporter.on_test_finished(&TestEvent {
            group: &group.name,
            ordinal,
            label: Some(label),
            outcome: Outcome::Reported(status),
        });
    }

    /// Synthesize `missing` entries for an under-reported group.
    fn close_group(&mut self) {
        let Some(group) = self.group.take() else {
            return;
        };
        if group.observed >= group.declared {
            return;
        }
        tracing::debug!(
            group = %group.name,
            declared = group.declared,
            observed = group.observed,
            "group under-reported"
        );
        for missing in group.observed + 1..=group.declared {
            Self::push_missing(&mut self.report, self.reporter.as_mut(), &group.name, missing);
        }
    }

    fn push_missing(report: &mut Report, reporter: &mut dyn Reporter, group: &str, ordinal: u32) {
        report.errors.push(ErrorEntry::missing(group, ordinal));
        report.failed_count += 1;
        reporter.on_test_finished(&TestEvent {
            group,
            ordinal,
            label: None,
            outcome: Outcome::Missing,
        });
    }
}

/// Aggregate a complete in-memory stream.
pub fn aggregate(input: &str) -> Report {
    let mut aggregator = Aggregator::new();
    for line in input.lines() {
        aggregator.feed(line);
    }
    aggregator.finish()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(report: &Report) -> Vec<(ErrorKind, &str)> {
        report
            .errors
            .iter()
            .map(|e| (e.kind, e.qualified_name.as_str()))
            .collect()
    }

    #[test]
    fn test_complete_group_has_no_errors() {
        let report = aggregate("1..3 G\n1 pass a\n2 pass b\n3 skip c # later\n");
        assert_eq!(report.success_count, 2);
        assert_eq!(report.skipped_count, 1);
        assert_eq!(report.failed_count, 0);
        assert!(report.errors.is_empty());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_gap_yields_one_missing() {
        let report = aggregate("1..3 G\n1 pass a\n3 pass c\n");
        assert_eq!(kinds(&report), vec![(ErrorKind::Missing, "G.(2)(unknown)")]);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.total(), 3);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_repeated_ordinal_is_bad_number() {
        let mut agg = Aggregator::new();
        for line in ["1..2 G", "1 pass a", "1 pass again"] {
            agg.feed(line);
        }
        assert_eq!(agg.observed_ordinal(), 1);
        agg.feed("2 pass b");
        let report = agg.finish();
        assert_eq!(kinds(&report), vec![(ErrorKind::BadNumber, "G.again")]);
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failed_count, 1);
    }

    #[test]
    fn test_context_not_attached_after_bad_number() {
        let report = aggregate("1..2 G\n1 fail a\n1 fail a\n: ignored\n2 pass b\n");
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].context, "");
        assert_eq!(report.errors[1].kind, ErrorKind::BadNumber);
        assert_eq!(report.errors[1].context, "");
    }

    #[test]
    fn test_context_attaches_to_failure_only() {
        let report = aggregate("1..2 G\n1 fail a\n: one\n: two\n2 skip b\n: dropped\n");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].context, "one\ntwo");
    }

    #[test]
    fn test_comment_line_does_not_break_context() {
        let report = aggregate("1..1 G\n1 fail a\n# noise\n: kept\n");
        assert_eq!(report.errors[0].context, "kept");
    }

    #[test]
    fn test_under_reported_group_closed_by_header() {
        let report = aggregate("1..3 A\n1 pass a\n1..1 B\n1 pass b\n");
        assert_eq!(
            kinds(&report),
            vec![
                (ErrorKind::Missing, "A.(2)(unknown)"),
                (ErrorKind::Missing, "A.(3)(unknown)"),
            ]
        );
        assert_eq!(report.failed_count, 2);
        assert_eq!(report.success_count, 2);
    }

    #[test]
    fn test_under_reported_group_closed_at_eof() {
        let report = aggregate("1..2 Crash\n");
        assert_eq!(report.failed_count, 2);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().all(|e| e.kind == ErrorKind::Missing));
    }

    #[test]
    fn test_todo_fail_is_tolerated() {
        let report = aggregate("1..2 G\n1 pass a\n2 todo-fail b # known\n: trace\n");
        assert_eq!(kinds(&report), vec![(ErrorKind::TodoFail, "G.b")]);
        assert_eq!(report.errors[0].context, "trace");
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_todo_pass_is_hard_error() {
        let report = aggregate("1..1 G\n1 todo-pass b\n");
        assert_eq!(kinds(&report), vec![(ErrorKind::TodoPass, "G.b")]);
        assert_eq!(report.success_count, 1);
        assert_eq!(report.failed_count, 0);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_empty_and_noise_only_input() {
        for input in ["", "\n\n", "# just a comment\nrandom noise\n"] {
            let report = aggregate(input);
            assert_eq!(report.total(), 0);
            assert_eq!(report.render_to_string(), "NO TESTS FOUND\n");
            assert_eq!(report.exit_code(), 0);
        }
    }

    #[test]
    fn test_result_before_header() {
        let report = aggregate("1 pass orphan\n");
        assert_eq!(report.success_count, 1);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_scan_handles_invalid_utf8() {
        let input: &[u8] = b"1..1 G\n1 fail \xff\n: ctx\n";
        let report = Aggregator::new().scan(input).unwrap();
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.errors[0].context, "ctx");
    }

    #[test]
    fn test_independent_aggregators() {
        let mut a = Aggregator::new();
        let mut b = Aggregator::new();
        a.feed("1..1 A");
        b.feed("1..1 B");
        a.feed("1 pass x");
        assert_eq!(a.finish().errors.len(), 0);
        assert_eq!(b.finish().errors.len(), 1);
    }
}
