//! Integration tests for ZFile discovery
//!
//! Each test builds a small tree in a temporary directory.

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use zharness::discovery::{discover, DiscoveryFilter, TestKind};
use zharness::registry::split_set;

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[cfg(unix)]
fn write_exec(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    write(path, "#!/bin/sh\n");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
fn write_exec(path: &Path) {
    write(path, "");
}

/// lib/ZFile lists an executable, a python script and a behave dir;
/// tools/ZFile lists one slow executable.
fn sample_tree() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write_exec(&root.join("lib/zchk-str"));
    write(&root.join("lib/test_iop.py"), "import z\n");
    fs::create_dir_all(root.join("lib/tests/behave")).unwrap();
    write(
        &root.join("lib/ZFile"),
        "# core\nzchk-str\n\ntest_iop.py @python\ntests/behave @slow @ui\n",
    );

    write_exec(&root.join("tools/zchk-tools"));
    write(&root.join("tools/ZFile"), "zchk-tools @slow\n");

    temp_dir
}

#[test]
fn test_discover_all_entries() {
    let temp_dir = sample_tree();
    let result = discover(temp_dir.path(), &DiscoveryFilter::default()).unwrap();

    assert!(result.is_clean(), "unexpected issues: {:?}", result.issues);
    assert_eq!(result.test_count(), 4);

    let kinds: Vec<_> = result.entries.iter().map(|e| (e.test.as_str(), e.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            ("zchk-str", TestKind::Exec),
            ("test_iop.py", TestKind::Python),
            ("tests/behave", TestKind::Behave),
            ("zchk-tools", TestKind::Exec),
        ]
    );
    assert!(result.entries[2].tags.contains("ui"));
    assert_eq!(result.entries[0].folder, temp_dir.path().join("lib"));
}

#[test]
fn test_discover_empty_temp_directory() {
    let temp_dir = TempDir::new().unwrap();
    let result = discover(temp_dir.path(), &DiscoveryFilter::default()).unwrap();
    assert_eq!(result.test_count(), 0);
    assert!(result.is_clean());
}

#[test]
fn test_tag_skip_drops_tagged_entries() {
    let temp_dir = sample_tree();
    let filter = DiscoveryFilter {
        tag_skip: split_set("slow"),
        ..DiscoveryFilter::default()
    };
    let result = discover(temp_dir.path(), &filter).unwrap();

    let tests: Vec<_> = result.entries.iter().map(|e| e.test.as_str()).collect();
    assert_eq!(tests, vec!["zchk-str", "test_iop.py"]);
}

#[test]
fn test_kind_skip_drops_kinds() {
    let temp_dir = sample_tree();
    let filter = DiscoveryFilter {
        kind_skip: [TestKind::Python, TestKind::Behave].into_iter().collect(),
        ..DiscoveryFilter::default()
    };
    let result = discover(temp_dir.path(), &filter).unwrap();
    assert!(result.entries.iter().all(|e| e.kind == TestKind::Exec));
    assert_eq!(result.test_count(), 2);
}

#[test]
fn test_skip_path_prunes_folders() {
    let temp_dir = sample_tree();
    let pattern = format!("{}/tools", temp_dir.path().display());
    let filter = DiscoveryFilter {
        skip_path: Some(regex::escape(&pattern)),
        ..DiscoveryFilter::default()
    };
    let result = discover(temp_dir.path(), &filter).unwrap();
    assert_eq!(result.test_count(), 3);
    assert!(result.entries.iter().all(|e| e.test != "zchk-tools"));
}

#[test]
fn test_missing_targets_are_issues() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_exec(&root.join("zchk-ok"));
    write(&root.join("ZFile"), "zchk-ok\nzchk-gone\ntest_gone.py\n");

    let result = discover(root, &DiscoveryFilter::default()).unwrap();
    assert_eq!(result.test_count(), 1);
    assert_eq!(result.issues.len(), 2);
    assert_eq!(result.issues[0].line, 2);
    assert_eq!(result.issues[0].entry, "zchk-gone");
    assert!(result.issues[1].to_string().ends_with(":3: no match for test_gone.py"));
}

#[cfg(unix)]
#[test]
fn test_non_executable_file_is_an_issue() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(&root.join("zchk-plain"), "not executable");
    write(&root.join("ZFile"), "zchk-plain\n");

    let result = discover(root, &DiscoveryFilter::default()).unwrap();
    assert_eq!(result.test_count(), 0);
    assert_eq!(result.issues.len(), 1);
}
