//! CLI Integration Tests
//!
//! Drive the built `zharness` binary: stdin aggregation, output formats,
//! ZFile listing and running.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

fn zharness() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_zharness"));
    for var in [
        "Z_FORMAT",
        "Z_JUNIT_XML",
        "Z_CONFIG",
        "Z_TAG_SKIP",
        "Z_SKIP_PATH",
        "Z_LIST_SKIP",
        "Z_MODE",
        "Z_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn report_with(args: &[&str], input: &str) -> Output {
    let mut child = zharness()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("binary should start");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_report_demo_stream() {
    let output = report_with(
        &[],
        "1..2 Demo\n1 pass test_a\n2 fail test_b\n: AssertionError: x != y\n",
    );
    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    assert!(text.contains("# TOTAL"));
    assert!(text.contains("# Failed  1 (50%)"));
    assert!(text.contains(": - Demo.test_b: fail"));
    assert!(text.contains(":   AssertionError: x != y"));
}

#[test]
fn test_report_subcommand_is_default() {
    let output = report_with(&["report"], "1..1 G\n1 pass a\n");
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("# Success 1 (100%)"));
}

#[test]
fn test_report_empty_input() {
    let output = report_with(&[], "");
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "NO TESTS FOUND\n");
}

#[test]
fn test_report_todo_fail_exits_zero() {
    let output = report_with(&[], "1..1 G\n1 todo-fail a # known\n");
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains(": - G.a: todo-fail"));
}

#[test]
fn test_report_json_stdout_is_pure_ndjson() {
    let output = report_with(&["--format", "json"], "1..2 G\n1 pass a\n");
    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    for line in text.lines() {
        serde_json::from_str::<serde_json::Value>(line).expect("every line is JSON");
    }
    assert!(text.lines().last().unwrap().contains("\"run_finished\""));
}

#[test]
fn test_report_junit_xml() {
    let temp_dir = TempDir::new().unwrap();
    let xml_path = temp_dir.path().join("junit.xml");
    let output = report_with(
        &["--junit-xml", xml_path.to_str().unwrap()],
        "1..2 G\n1 pass a\n2 skip b\n",
    );
    assert_eq!(output.status.code(), Some(0));
    let xml = std::fs::read_to_string(&xml_path).unwrap();
    assert!(xml.contains("<testsuite name=\"G\""));
    assert!(xml.contains("<skipped"));
}

#[cfg(unix)]
mod zfile {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(path: &Path, body: &str) {
        fs::write(path, format!("#!/bin/sh\n{}", body)).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn tree(second: &str) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write_script(
            &root.join("zchk-one"),
            "echo '1..2 One'\necho '1 pass a'\necho \"2 pass mode=$Z_HARNESS\"\n",
        );
        write_script(&root.join("zchk-two"), second);
        fs::write(root.join("ZFile"), "zchk-one\nzchk-two @slow\n").unwrap();
        temp_dir
    }

    #[test]
    fn test_list_prints_entries() {
        let temp_dir = tree("");
        let output = zharness()
            .args(["list", temp_dir.path().to_str().unwrap()])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(0));
        let text = stdout(&output);
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().all(|l| l.contains("/ zchk-")));
    }

    #[test]
    fn test_list_reports_missing_entries() {
        let temp_dir = tree("");
        fs::write(temp_dir.path().join("ZFile"), "zchk-one\nzchk-gone\n").unwrap();
        let output = zharness()
            .args(["list", temp_dir.path().to_str().unwrap()])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(2));
        assert_eq!(stdout(&output).lines().count(), 1);
        assert!(String::from_utf8_lossy(&output.stderr).contains("no match for zchk-gone"));
    }

    #[test]
    fn test_run_aggregates_all_tests() {
        let temp_dir = tree("echo '1..1 Two'\necho '1 pass b'\n");
        let output = zharness()
            .args(["run", temp_dir.path().to_str().unwrap()])
            .current_dir(temp_dir.path())
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(0));
        assert!(stdout(&output).contains("# Success 3 (100%)"));
    }

    #[test]
    fn test_run_crashed_test_reports_missing() {
        let temp_dir = tree("echo '1..3 Two'\necho '1 fail b'\necho ': boom'\nexit 139\n");
        let output = zharness()
            .args(["run", temp_dir.path().to_str().unwrap()])
            .current_dir(temp_dir.path())
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(1));
        let text = stdout(&output);
        assert!(text.contains(": - Two.b: fail"));
        assert!(text.contains(":   boom"));
        assert!(text.contains(": - Two.(2)(unknown): missing"));
        assert!(text.contains(": - Two.(3)(unknown): missing"));
    }

    #[test]
    fn test_run_tag_skip() {
        let temp_dir = tree("echo '1..1 Two'\necho '1 fail b'\n");
        let output = zharness()
            .args(["run", temp_dir.path().to_str().unwrap(), "--tag-skip", "slow"])
            .current_dir(temp_dir.path())
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(0));
        assert!(stdout(&output).contains("# Success 2 (100%)"));
    }
}
