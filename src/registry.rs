//! Test Registry: explicit registration of groups for Z emission
//!
//! Groups and tests are registered by calling into a [`Registry`], never by
//! side effect, so the emission order is the registration order.
//!
//! ## Environment
//!
//! - `Z_TAG_SKIP`: whitespace-separated flags; flagged tests are skipped
//! - `Z_MODE`: whitespace-separated modes, queried with [`Settings::has_mode`]
//!
//! A test body returns `anyhow::Result<()>`. Returning [`skip`] marks the test
//! skipped; any other error or a panic marks it failed.

use crate::emitter::Emitter;
use crate::errors::EmitError;
use crate::grammar::Status;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

pub type TestBody = Box<dyn Fn(&Settings) -> anyhow::Result<()>>;

/// Error value a test body returns to skip itself
#[derive(Debug, Clone)]
pub struct Skipped(pub String);

impl fmt::Display for Skipped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Skipped {}

/// Skip the running test: `return Err(skip("needs network"))`
pub fn skip(reason: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(Skipped(reason.into()))
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub tag_skip: BTreeSet<String>,
    pub modes: BTreeSet<String>,
    /// Shown in rerun hints
    pub program: String,
}

impl Settings {
    pub fn from_env() -> Self {
        let program = std::env::args()
            .next()
            .unwrap_or_else(|| "zharness".to_string());
        Self {
            tag_skip: split_set(&std::env::var("Z_TAG_SKIP").unwrap_or_default()),
            modes: split_set(&std::env::var("Z_MODE").unwrap_or_default()),
            program,
        }
    }

    pub fn has_mode(&self, mode: &str) -> bool {
        self.modes.contains(mode)
    }

    /// Flags of `flags` that are listed in `Z_TAG_SKIP`
    fn skipped_flags<'a>(&self, flags: impl IntoIterator<Item = &'a String>) -> Vec<&'a str> {
        flags
            .into_iter()
            .filter(|f| self.tag_skip.contains(f.as_str()))
            .map(String::as_str)
            .collect()
    }
}

pub fn split_set(s: &str) -> BTreeSet<String> {
    s.split_whitespace().map(str::to_string).collect()
}

// =============================================================================
// Definitions
// =============================================================================

pub struct TestDef {
    pub name: String,
    pub flags: Vec<String>,
    /// Expected to fail, with the reason
    pub todo: Option<String>,
    body: TestBody,
}

impl TestDef {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Settings) -> anyhow::Result<()> + 'static,
    {
        Self {
            name: name.into(),
            flags: Vec::new(),
            todo: None,
            body: Box::new(body),
        }
    }

    pub fn flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn todo(mut self, reason: impl Into<String>) -> Self {
        self.todo = Some(reason.into());
        self
    }
}

pub struct GroupDef {
    pub name: String,
    /// Applied to every test of the group
    pub flags: Vec<String>,
    pub tests: Vec<TestDef>,
}

impl GroupDef {
    pub fn test<F>(&mut self, name: impl Into<String>, body: F) -> &mut Self
    where
        F: Fn(&Settings) -> anyhow::Result<()> + 'static,
    {
        self.tests.push(TestDef::new(name, body));
        self
    }

    pub fn add(&mut self, test: TestDef) -> &mut Self {
        self.tests.push(test);
        self
    }

    pub fn flags<I, S>(&mut self, flags: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }
}

#[derive(Default)]
pub struct Registry {
    groups: Vec<GroupDef>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new group and return it for test registration.
    pub fn group(&mut self, name: impl Into<String>) -> &mut GroupDef {
        self.groups.push(GroupDef {
            name: name.into(),
            flags: Vec::new(),
            tests: Vec::new(),
        });
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    pub fn groups(&self) -> &[GroupDef] {
        &self.groups
    }

    pub fn test_count(&self) -> usize {
        self.groups.iter().map(|g| g.tests.len()).sum()
    }

    /// Run every registered test and emit the Z stream.
    pub fn run<W: Write>(
        &self,
        settings: &Settings,
        emitter: &mut Emitter<W>,
    ) -> Result<RunSummary, EmitError> {
        let mut summary = RunSummary::default();

        for group in &self.groups {
            emitter.group(&group.name, declared_count(&group.name, group.tests.len())?)?;
            for test in &group.tests {
                let status = run_test(settings, group, test, emitter)?;
                summary.record(status);
            }
        }
        Ok(summary)
    }
}

fn declared_count(group: &str, count: usize) -> Result<u32, EmitError> {
    u32::try_from(count).map_err(|_| EmitError::GroupTooLarge {
        group: group.to_string(),
        count,
    })
}

fn run_test<W: Write>(
    settings: &Settings,
    group: &GroupDef,
    test: &TestDef,
    emitter: &mut Emitter<W>,
) -> Result<Status, EmitError> {
    let flagged = settings.skipped_flags(group.flags.iter().chain(&test.flags));
    if !flagged.is_empty() {
        let reason = format!("skipping tests flagged with {}", flagged.join(" "));
        emitter.result(Status::Skip, &test.name, Some(&reason))?;
        return Ok(Status::Skip);
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (test.body)(settings)));
    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => match err.downcast_ref::<Skipped>() {
            Some(Skipped(reason)) => {
                emitter.result(Status::Skip, &test.name, Some(reason.as_str()))?;
                return Ok(Status::Skip);
            }
            None => Some(format!("{:#}", err)),
        },
        Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
    };

    let (status, reason) = match (&failure, &test.todo) {
        (None, None) => (Status::Pass, None),
        (None, Some(_)) => (Status::TodoPass, None),
        (Some(_), None) => (Status::Fail, None),
        (Some(_), Some(reason)) => (Status::TodoFail, Some(reason.as_str())),
    };
    emitter.result(status, &test.name, reason)?;

    if let Some(message) = failure {
        emitter.context(&format!(
            "$ {} {}.{}",
            settings.program, group.name, test.name
        ))?;
        emitter.context("")?;
        emitter.context(&message)?;
    }
    Ok(status)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Box<dyn Any>"
    }
}

/// Per-status tallies of an emitter-side run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub todo_passed: u32,
    pub todo_failed: u32,
}

impl RunSummary {
    fn record(&mut self, status: Status) {
        match status {
            Status::Pass => self.passed += 1,
            Status::Fail => self.failed += 1,
            Status::Skip => self.skipped += 1,
            Status::TodoPass => self.todo_passed += 1,
            Status::TodoFail => self.todo_failed += 1,
        }
    }

    /// No hard failure was emitted
    pub fn success(&self) -> bool {
        self.failed == 0 && self.todo_passed == 0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    fn settings(tag_skip: &str) -> Settings {
        Settings {
            tag_skip: split_set(tag_skip),
            modes: split_set("fast"),
            program: "ztest".to_string(),
        }
    }

    fn run(registry: &Registry, settings: &Settings) -> (RunSummary, String) {
        let mut emitter = Emitter::new(Vec::new());
        let summary = registry.run(settings, &mut emitter).unwrap();
        (summary, String::from_utf8(emitter.into_inner()).unwrap())
    }

    #[test]
    fn test_registration_order_is_emission_order() {
        let mut registry = Registry::new();
        registry.group("B").test("b1", |_| Ok(()));
        registry.group("A").test("a1", |_| Ok(())).test("a2", |_| Ok(()));
        assert_eq!(registry.test_count(), 3);

        let (summary, out) = run(&registry, &settings(""));
        assert_eq!(out, "1..1 B\n1 pass b1\n1..2 A\n1 pass a1\n2 pass a2\n");
        assert_eq!(summary.passed, 3);
        assert!(summary.success());
    }

    #[test]
    fn test_failure_emits_rerun_hint_and_error() {
        let mut registry = Registry::new();
        registry.group("G").test("broken", |_| bail!("x != y"));

        let (summary, out) = run(&registry, &settings(""));
        assert_eq!(out, "1..1 G\n1 fail broken\n: $ ztest G.broken\n:\n: x != y\n");
        assert!(!summary.success());
    }

    #[test]
    fn test_panic_is_a_failure() {
        let mut registry = Registry::new();
        registry.group("G").test("panics", |_| panic!("kaboom"));

        let (summary, out) = run(&registry, &settings(""));
        assert_eq!(summary.failed, 1);
        assert!(out.contains(": panicked: kaboom\n"));
    }

    #[test]
    fn test_skip_from_body() {
        let mut registry = Registry::new();
        registry
            .group("G")
            .test("later", |_| Err(skip("needs network")));

        let (summary, out) = run(&registry, &settings(""));
        assert_eq!(summary.skipped, 1);
        assert!(out.ends_with("1 skip later # needs network\n"));
    }

    #[test]
    fn test_flagged_tests_are_skipped() {
        let mut registry = Registry::new();
        registry
            .group("G")
            .add(TestDef::new("slow", |_| bail!("should not run")).flags(["slow", "net"]))
            .test("fast", |_| Ok(()));

        let (summary, out) = run(&registry, &settings("slow"));
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.passed, 1);
        assert!(out.contains("1 skip slow # skipping tests flagged with slow\n"));
    }

    #[test]
    fn test_group_flags_apply_to_all_tests() {
        let mut registry = Registry::new();
        registry
            .group("G")
            .flags(["db"])
            .test("a", |_| Ok(()))
            .test("b", |_| Ok(()));

        let (summary, _) = run(&registry, &settings("db"));
        assert_eq!(summary.skipped, 2);
    }

    #[test]
    fn test_todo_outcomes() {
        let mut registry = Registry::new();
        registry
            .group("G")
            .add(TestDef::new("known", |_| bail!("still broken")).todo("bug 12"))
            .add(TestDef::new("fixed", |_| Ok(())).todo("bug 13"));

        let (summary, out) = run(&registry, &settings(""));
        assert_eq!(summary.todo_failed, 1);
        assert_eq!(summary.todo_passed, 1);
        assert!(!summary.success());
        assert!(out.contains("1 todo-fail known # bug 12\n: $ ztest G.known\n"));
        assert!(out.contains("2 todo-pass fixed\n"));
    }

    #[test]
    fn test_declared_count_rejects_oversized_groups() {
        assert_eq!(declared_count("G", 3).unwrap(), 3);
        assert_eq!(declared_count("G", u32::MAX as usize).unwrap(), u32::MAX);

        #[cfg(target_pointer_width = "64")]
        {
            let err = declared_count("G", u32::MAX as usize + 1).unwrap_err();
            assert!(matches!(err, EmitError::GroupTooLarge { count, .. } if count == u32::MAX as usize + 1));
        }
    }

    #[test]
    fn test_modes() {
        let mut registry = Registry::new();
        registry.group("G").test("mode", |s| {
            if s.has_mode("fast") {
                Err(skip("fast mode"))
            } else {
                Ok(())
            }
        });
        let (summary, _) = run(&registry, &settings(""));
        assert_eq!(summary.skipped, 1);
    }
}
