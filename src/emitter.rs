//! Emitter: writes grammar-conformant Z output
//!
//! One group header per suite, one result line per test, and optional
//! `:`-prefixed context after a failure. Every line is flushed as soon as it is
//! written so a crashing process still leaves a usable prefix on the stream.

use crate::errors::EmitError;
use crate::grammar::{GroupHeader, ResultLine, Status};
use std::borrow::Cow;
use std::io::Write;

struct OpenGroup {
    name: String,
    declared: u32,
    ordinal: u32,
}

pub struct Emitter<W: Write> {
    out: W,
    group: Option<OpenGroup>,
    last_status: Option<Status>,
}

impl<W: Write> Emitter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            group: None,
            last_status: None,
        }
    }

    /// Open a group of `declared` tests. Any previous group is closed as is;
    /// under-reporting is the aggregator's business.
    pub fn group(&mut self, name: &str, declared: u32) -> Result<(), EmitError> {
        let name = single_line(name);
        self.write_line(format_args!(
            "{}",
            GroupHeader {
                declared,
                name: &name
            }
        ))?;
        self.group = Some(OpenGroup {
            name: name.into_owned(),
            declared,
            ordinal: 0,
        });
        self.last_status = None;
        Ok(())
    }

    /// Write the next result of the open group and return its ordinal.
    pub fn result(
        &mut self,
        status: Status,
        label: &str,
        reason: Option<&str>,
    ) -> Result<u32, EmitError> {
        let Some(group) = self.group.as_mut() else {
            return Err(EmitError::NoGroup {
                label: label.to_string(),
            });
        };
        let ordinal = group.ordinal + 1;
        if ordinal > group.declared {
            return Err(EmitError::TooManyResults {
                group: group.name.clone(),
                declared: group.declared,
                ordinal,
                label: label.to_string(),
            });
        }
        group.ordinal = ordinal;

        let label = single_line(label);
        let reason = reason.map(single_line);
        self.write_line(format_args!(
            "{}",
            ResultLine {
                ordinal,
                status,
                label: &label,
                reason: reason.as_deref(),
            }
        ))?;
        self.last_status = Some(status);
        Ok(ordinal)
    }

    /// Attach diagnostic text to the result just written. Each physical line
    /// of `text` becomes one `: ` line.
    pub fn context(&mut self, text: &str) -> Result<(), EmitError> {
        if !self.last_status.is_some_and(Status::accepts_context) {
            return Err(EmitError::DetachedContext);
        }
        if text.is_empty() {
            return self.write_line(format_args!(":"));
        }
        for line in text.lines() {
            if line.is_empty() {
                self.write_line(format_args!(":"))?;
            } else {
                self.write_line(format_args!(": {}", line))?;
            }
        }
        Ok(())
    }

    /// Results written so far in the open group
    pub fn ordinal(&self) -> u32 {
        self.group.as_ref().map_or(0, |g| g.ordinal)
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, args: std::fmt::Arguments<'_>) -> Result<(), EmitError> {
        self.out.write_fmt(args)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Newlines inside a record would split it; fold them into spaces.
fn single_line(s: &str) -> Cow<'_, str> {
    if s.contains(['\n', '\r']) {
        Cow::Owned(s.replace(['\n', '\r'], " "))
    } else {
        Cow::Borrowed(s)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn output(emitter: Emitter<Vec<u8>>) -> String {
        String::from_utf8(emitter.into_inner()).unwrap()
    }

    #[test]
    fn test_group_and_results() {
        let mut e = Emitter::new(Vec::new());
        e.group("Demo", 2).unwrap();
        assert_eq!(e.result(Status::Pass, "test_a", None).unwrap(), 1);
        assert_eq!(e.result(Status::Fail, "test_b", None).unwrap(), 2);
        e.context("AssertionError: x != y").unwrap();

        assert_eq!(
            output(e),
            "1..2 Demo\n1 pass test_a\n2 fail test_b\n: AssertionError: x != y\n"
        );
    }

    #[test]
    fn test_ordinal_resets_per_group() {
        let mut e = Emitter::new(Vec::new());
        e.group("A", 1).unwrap();
        e.result(Status::Pass, "a", None).unwrap();
        e.group("B", 1).unwrap();
        assert_eq!(e.ordinal(), 0);
        assert_eq!(e.result(Status::Skip, "b", Some("why")).unwrap(), 1);
        assert!(output(e).ends_with("1 skip b # why\n"));
    }

    #[test]
    fn test_result_without_group() {
        let mut e = Emitter::new(Vec::new());
        let err = e.result(Status::Pass, "orphan", None).unwrap_err();
        assert!(matches!(err, EmitError::NoGroup { .. }));
    }

    #[test]
    fn test_too_many_results() {
        let mut e = Emitter::new(Vec::new());
        e.group("G", 1).unwrap();
        e.result(Status::Pass, "a", None).unwrap();
        let err = e.result(Status::Pass, "b", None).unwrap_err();
        assert!(matches!(
            err,
            EmitError::TooManyResults {
                declared: 1,
                ordinal: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_context_after_skip_is_rejected() {
        let mut e = Emitter::new(Vec::new());
        e.group("G", 1).unwrap();
        e.result(Status::Skip, "a", None).unwrap();
        assert!(matches!(e.context("x"), Err(EmitError::DetachedContext)));
    }

    #[test]
    fn test_multiline_context_and_blank_lines() {
        let mut e = Emitter::new(Vec::new());
        e.group("G", 1).unwrap();
        e.result(Status::TodoFail, "a", Some("known bug")).unwrap();
        e.context("first\n\nthird").unwrap();
        assert_eq!(
            output(e),
            "1..1 G\n1 todo-fail a # known bug\n: first\n:\n: third\n"
        );
    }

    #[test]
    fn test_newlines_in_label_are_folded() {
        let mut e = Emitter::new(Vec::new());
        e.group("G", 1).unwrap();
        e.result(Status::Pass, "two\nlines", None).unwrap();
        assert!(output(e).ends_with("1 pass two lines\n"));
    }
}
