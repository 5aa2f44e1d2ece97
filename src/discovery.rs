//! ZFile Discovery
//!
//! Walks a tree for files named `ZFile`. Each non-comment line names a test
//! relative to the ZFile's folder, optionally followed by `@tag` tokens:
//!
//! ```text
//! # core checks
//! zchk-str
//! tests/behave        @slow
//! tests/test_iop.py   @python @slow
//! ```
//!
//! Filters:
//! - `Z_SKIP_PATH`: regex; directories whose path matches are not searched
//! - `Z_TAG_SKIP`: entries carrying one of these tags are dropped
//! - `Z_LIST_SKIP`: kinds (`behave`, `python`, `exec`) to drop

use crate::errors::DiscoveryError;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use walkdir::WalkDir;

pub const ZFILE_NAME: &str = "ZFile";

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_]+)").expect("tag regex is valid"));

/// How a listed test is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TestKind {
    /// A behave feature directory
    Behave,
    /// A Python script using the Z unittest wrapper
    Python,
    /// Any executable emitting Z output
    Exec,
}

impl TestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TestKind::Behave => "behave",
            TestKind::Python => "python",
            TestKind::Exec => "exec",
        }
    }

    /// First matching kind for `path`, in priority order. The markers may
    /// appear anywhere in the path, so `tests/behave/smoke` is a behave entry.
    fn classify(path: &Path) -> TestKind {
        let s = path.to_string_lossy();
        if s.contains("/behave") {
            TestKind::Behave
        } else if s.contains(".py") {
            TestKind::Python
        } else {
            TestKind::Exec
        }
    }

    /// Whether `path` is usable for this kind
    fn check(self, path: &Path) -> bool {
        match self {
            TestKind::Behave => true,
            TestKind::Python => path.is_file(),
            TestKind::Exec => is_executable(path),
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "behave" => Ok(TestKind::Behave),
            "python" => Ok(TestKind::Python),
            "exec" => Ok(TestKind::Exec),
            other => Err(format!("unknown test kind `{}`", other)),
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// One runnable entry from a ZFile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEntry {
    /// Directory holding the ZFile; the test runs from here
    pub folder: PathBuf,
    /// Test path as written, relative to `folder`
    pub test: String,
    pub kind: TestKind,
    pub tags: BTreeSet<String>,
}

impl TestEntry {
    pub fn path(&self) -> PathBuf {
        self.folder.join(&self.test)
    }
}

impl fmt::Display for TestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/ {}", self.folder.display(), self.test)
    }
}

/// A ZFile line whose target does not exist or is not runnable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryIssue {
    pub zfile: PathBuf,
    pub line: usize,
    pub entry: String,
}

impl fmt::Display for DiscoveryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: no match for {}",
            self.zfile.display(),
            self.line,
            self.entry
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    pub skip_path: Option<String>,
    pub tag_skip: BTreeSet<String>,
    pub kind_skip: BTreeSet<TestKind>,
}

#[derive(Debug, Default)]
pub struct DiscoveryResult {
    pub entries: Vec<TestEntry>,
    pub issues: Vec<DiscoveryIssue>,
}

impl DiscoveryResult {
    pub fn test_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Find and parse every ZFile under `root`.
pub fn discover(root: &Path, filter: &DiscoveryFilter) -> Result<DiscoveryResult, DiscoveryError> {
    let skip = match filter.skip_path.as_deref().filter(|p| !p.is_empty()) {
        // Anchored at the start of the path
        Some(pattern) => Some(Regex::new(&format!("^(?:{})", pattern)).map_err(|err| DiscoveryError::SkipPattern {
            pattern: pattern.to_string(),
            err,
        })?),
        None => None,
    };

    let mut result = DiscoveryResult::default();
    let walker = WalkDir::new(root).sort_by_file_name().into_iter();

    for entry in walker {
        let entry = entry.map_err(|err| DiscoveryError::Walk {
            root: root.to_path_buf(),
            err,
        })?;
        if !entry.file_type().is_file() || entry.file_name() != ZFILE_NAME {
            continue;
        }
        let folder = entry.path().parent().unwrap_or(root);
        if let Some(skip) = &skip {
            if skip.is_match(&folder.to_string_lossy()) {
                tracing::debug!(folder = %folder.display(), "skipped by Z_SKIP_PATH");
                continue;
            }
        }
        tracing::debug!(zfile = %entry.path().display(), "reading ZFile");
        parse_zfile(entry.path(), filter, &mut result)?;
    }

    Ok(result)
}

fn parse_zfile(
    zfile: &Path,
    filter: &DiscoveryFilter,
    result: &mut DiscoveryResult,
) -> Result<(), DiscoveryError> {
    let contents = fs::read_to_string(zfile).map_err(|err| DiscoveryError::Read {
        path: zfile.to_path_buf(),
        err,
    })?;
    let folder = zfile.parent().unwrap_or(Path::new("."));

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(test) = line.split_whitespace().next() else {
            continue;
        };

        let tags: BTreeSet<String> = TAG_RE
            .captures_iter(line)
            .map(|c| c[1].to_string())
            .collect();
        if !tags.is_disjoint(&filter.tag_skip) {
            tracing::debug!(test, "skipped by Z_TAG_SKIP");
            continue;
        }

        let path = folder.join(test);
        let kind = TestKind::classify(&path);
        if filter.kind_skip.contains(&kind) {
            continue;
        }

        if !kind.check(&path) {
            result.issues.push(DiscoveryIssue {
                zfile: zfile.to_path_buf(),
                line: idx + 1,
                entry: line.to_string(),
            });
            continue;
        }

        result.entries.push(TestEntry {
            folder: folder.to_path_buf(),
            test: test.to_string(),
            kind,
            tags,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_kinds() {
        assert_eq!(TestKind::classify(Path::new("a/tests/behave")), TestKind::Behave);
        assert_eq!(TestKind::classify(Path::new("a/test_x.py")), TestKind::Python);
        assert_eq!(TestKind::classify(Path::new("a/zchk-str")), TestKind::Exec);
        assert_eq!(TestKind::classify(Path::new("a/tests/behave/smoke")), TestKind::Behave);
        assert_eq!(TestKind::classify(Path::new("a/test_x.py3")), TestKind::Python);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("python".parse::<TestKind>(), Ok(TestKind::Python));
        assert!("web".parse::<TestKind>().is_err());
    }

    #[test]
    fn test_entry_display() {
        let entry = TestEntry {
            folder: PathBuf::from("./platform/qkv"),
            test: "zchk-store".to_string(),
            kind: TestKind::Exec,
            tags: BTreeSet::new(),
        };
        assert_eq!(entry.to_string(), "./platform/qkv/ zchk-store");
        assert_eq!(entry.path(), PathBuf::from("./platform/qkv/zchk-store"));
    }

    #[test]
    fn test_issue_display() {
        let issue = DiscoveryIssue {
            zfile: PathBuf::from("lib/ZFile"),
            line: 3,
            entry: "zchk-gone @slow".to_string(),
        };
        assert_eq!(issue.to_string(), "lib/ZFile:3: no match for zchk-gone @slow");
    }

    #[test]
    fn test_bad_skip_pattern() {
        let filter = DiscoveryFilter {
            skip_path: Some("(".to_string()),
            ..DiscoveryFilter::default()
        };
        let err = discover(Path::new("."), &filter).unwrap_err();
        assert!(matches!(err, DiscoveryError::SkipPattern { .. }));
    }
}
