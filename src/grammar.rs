//! Z Protocol Grammar
//!
//! Line-oriented wire format shared by the emitter and the aggregator.
//!
//! ## Line shapes
//!
//! - `1..N name`            group header, N tests declared
//! - `N status label`       result line, `status` in [`Status`]
//! - `: text`               context attached to the preceding failure
//!
//! Anything after the first `#` of a non-context line is a comment. Lines that
//! match none of the shapes are ignored, never rejected.

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^1\.\.(\d+) (.*)$").expect("group regex is valid"));

static RESULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+) (pass|fail|skip|todo-pass|todo-fail) (.*)$")
        .expect("result regex is valid")
});

/// Outcome of a single test as written on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pass,
    Fail,
    Skip,
    /// Expected to fail, but passed
    TodoPass,
    /// Expected to fail, and did
    TodoFail,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Pass,
        Status::Fail,
        Status::Skip,
        Status::TodoPass,
        Status::TodoFail,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pass => "pass",
            Status::Fail => "fail",
            Status::Skip => "skip",
            Status::TodoPass => "todo-pass",
            Status::TodoFail => "todo-fail",
        }
    }

    /// Whether context lines following this result are kept
    pub fn accepts_context(self) -> bool {
        matches!(self, Status::Fail | Status::TodoFail | Status::TodoPass)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown test status `{}`", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A classified input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    /// `:`-prefixed diagnostic text, prefix removed
    Context(&'a str),
    Group { declared: u32, name: &'a str },
    Result {
        ordinal: u32,
        status: Status,
        label: &'a str,
    },
    /// Blank, comment-only, or unrecognized
    Ignored,
}

/// Classify one physical line (without its trailing newline).
pub fn classify(raw: &str) -> Line<'_> {
    let raw = raw.strip_suffix('\r').unwrap_or(raw);

    if let Some(text) = raw.strip_prefix(':') {
        return Line::Context(text.strip_prefix(' ').unwrap_or(text));
    }

    let body = match raw.find('#') {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    let body = body.trim();
    if body.is_empty() {
        return Line::Ignored;
    }

    if let Some(caps) = GROUP_RE.captures(body) {
        // Counts that do not fit fall through as noise
        return match caps[1].parse() {
            Ok(declared) => Line::Group {
                declared,
                name: caps.get(2).map_or("", |m| m.as_str()),
            },
            Err(_) => Line::Ignored,
        };
    }

    if let Some(caps) = RESULT_RE.captures(body) {
        let (Ok(ordinal), Ok(status)) = (caps[1].parse(), caps[2].parse()) else {
            return Line::Ignored;
        };
        return Line::Result {
            ordinal,
            status,
            label: caps.get(3).map_or("", |m| m.as_str()),
        };
    }

    Line::Ignored
}

// =============================================================================
// Encoding
// =============================================================================

/// `1..N name`
#[derive(Debug, Clone, Copy)]
pub struct GroupHeader<'a> {
    pub declared: u32,
    pub name: &'a str,
}

impl fmt::Display for GroupHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1..{} {}", self.declared, self.name)
    }
}

/// `N status label[ # reason]`
#[derive(Debug, Clone, Copy)]
pub struct ResultLine<'a> {
    pub ordinal: u32,
    pub status: Status,
    pub label: &'a str,
    pub reason: Option<&'a str>,
}

impl fmt::Display for ResultLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.ordinal, self.status, self.label)?;
        match self.reason {
            Some(reason) if !reason.is_empty() => write!(f, " # {}", reason),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
