//! Aggregate report and verdict
//!
//! Counters, the ordered error list, and the text block printed once the
//! stream has been fully reconciled.

use serde::Serialize;
use std::fmt;
use std::io::{self, Write};

/// Why an ordinal ended up in the error list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Ordinal did not advance past the last accepted one
    BadNumber,
    /// Declared but never reported
    Missing,
    Fail,
    TodoFail,
    /// Expected failure that passed
    TodoPass,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BadNumber => "bad-number",
            ErrorKind::Missing => "missing",
            ErrorKind::Fail => "fail",
            ErrorKind::TodoFail => "todo-fail",
            ErrorKind::TodoPass => "todo-pass",
        }
    }

    /// Tolerated kinds are reported but do not force a nonzero exit.
    pub fn is_tolerated(self) -> bool {
        self == ErrorKind::TodoFail
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub kind: ErrorKind,
    /// `group.label`
    pub qualified_name: String,
    /// Context lines joined with `\n`
    pub context: String,
    /// Lines pushed so far; a lone blank line leaves `context` empty
    #[serde(skip)]
    context_lines: usize,
}

impl ErrorEntry {
    pub fn new(kind: ErrorKind, group: &str, label: &str) -> Self {
        Self {
            kind,
            qualified_name: format!("{}.{}", group, label),
            context: String::new(),
            context_lines: 0,
        }
    }

    pub fn missing(group: &str, ordinal: u32) -> Self {
        Self::new(ErrorKind::Missing, group, &format!("({})(unknown)", ordinal))
    }

    pub fn push_context(&mut self, text: &str) {
        if self.context_lines > 0 {
            self.context.push('\n');
        }
        self.context.push_str(text);
        self.context_lines += 1;
    }

    /// Number of context lines attached, blank ones included
    pub fn context_lines(&self) -> usize {
        self.context_lines
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub success_count: u64,
    pub failed_count: u64,
    pub skipped_count: u64,
    pub errors: Vec<ErrorEntry>,
}

impl Report {
    pub fn total(&self) -> u64 {
        self.success_count + self.failed_count + self.skipped_count
    }

    /// Truncating integer percentage of the total; 0 when there are no tests.
    pub fn percent(&self, count: u64) -> u64 {
        match self.total() {
            0 => 0,
            total => count * 100 / total,
        }
    }

    pub fn has_hard_errors(&self) -> bool {
        self.errors.iter().any(|e| !e.kind.is_tolerated())
    }

    /// Process exit code for this verdict
    pub fn exit_code(&self) -> i32 {
        if self.has_hard_errors() {
            1
        } else {
            0
        }
    }

    /// Write the human-readable summary.
    pub fn render<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.total() == 0 {
            writeln!(out, "NO TESTS FOUND")?;
            return Ok(());
        }

        writeln!(out)?;
        writeln!(out, "# TOTAL")?;
        writeln!(
            out,
            "# Skipped {} ({}%)",
            self.skipped_count,
            self.percent(self.skipped_count)
        )?;
        writeln!(
            out,
            "# Failed  {} ({}%)",
            self.failed_count,
            self.percent(self.failed_count)
        )?;
        writeln!(
            out,
            "# Success {} ({}%)",
            self.success_count,
            self.percent(self.success_count)
        )?;

        if !self.errors.is_empty() {
            writeln!(out)?;
            writeln!(out, ": ERRORS")?;
            for entry in &self.errors {
                writeln!(out, ": - {}: {}", entry.qualified_name, entry.kind)?;
                if entry.context_lines > 0 {
                    for line in entry.context.split('\n') {
                        writeln!(out, ":   {}", line)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn render_to_string(&self) -> String {
        let mut buf = Vec::new();
        // Writing to a Vec cannot fail
        let _ = self.render(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report() {
        let report = Report::default();
        assert_eq!(report.render_to_string(), "NO TESTS FOUND\n");
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_percentages_truncate() {
        let report = Report {
            success_count: 1,
            failed_count: 1,
            skipped_count: 1,
            errors: vec![],
        };
        assert_eq!(report.percent(1), 33);
        let text = report.render_to_string();
        assert!(text.contains("# Skipped 1 (33%)"));
        assert!(text.contains("# Failed  1 (33%)"));
        assert!(text.contains("# Success 1 (33%)"));
        assert!(!text.contains("ERRORS"));
    }

    #[test]
    fn test_errors_section_with_context() {
        let mut entry = ErrorEntry::new(ErrorKind::Fail, "Demo", "test_b");
        entry.push_context("line one");
        entry.push_context("line two");
        let report = Report {
            success_count: 1,
            failed_count: 1,
            skipped_count: 0,
            errors: vec![entry, ErrorEntry::missing("Demo", 3)],
        };
        let text = report.render_to_string();
        assert!(text.contains(
            ": ERRORS\n: - Demo.test_b: fail\n:   line one\n:   line two\n: - Demo.(3)(unknown): missing\n"
        ));
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_blank_context_lines_are_kept() {
        let mut entry = ErrorEntry::new(ErrorKind::Fail, "G", "t");
        entry.push_context("");
        entry.push_context("x");
        assert_eq!(entry.context, "\nx");
        assert_eq!(entry.context_lines(), 2);

        let mut blank = ErrorEntry::new(ErrorKind::Fail, "G", "u");
        blank.push_context("");
        let report = Report {
            failed_count: 2,
            errors: vec![entry, blank],
            ..Report::default()
        };
        assert!(report
            .render_to_string()
            .ends_with(": - G.t: fail\n:   \n:   x\n: - G.u: fail\n:   \n"));
    }

    #[test]
    fn test_todo_fail_is_tolerated() {
        let report = Report {
            failed_count: 1,
            errors: vec![ErrorEntry::new(ErrorKind::TodoFail, "G", "t")],
            ..Report::default()
        };
        assert!(!report.has_hard_errors());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_todo_pass_is_hard() {
        let report = Report {
            success_count: 1,
            errors: vec![ErrorEntry::new(ErrorKind::TodoPass, "G", "t")],
            ..Report::default()
        };
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_error_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorKind::BadNumber).unwrap();
        assert_eq!(json, "\"bad-number\"");
    }
}
