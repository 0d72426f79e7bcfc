// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Tests that drive the `pulsebench` binary, children included.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn pulsebench(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pulsebench"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to launch pulsebench")
}

fn run_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.path()).collect())
        .unwrap_or_default();
    dirs.retain(|p| p.is_dir());
    dirs.sort();
    dirs
}

fn line_count(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count()
}

#[test]
fn test_run_two_processes() {
    let root = TempDir::new().unwrap();
    let sockets = TempDir::new().unwrap();
    let root_arg = root.path().to_str().unwrap();
    let socket_arg = sockets.path().to_str().unwrap();

    let output = pulsebench(&[
        "run",
        "5",
        "64",
        "2",
        "--processes",
        "2",
        "--root",
        root_arg,
        "--socket-dir",
        socket_arg,
        "--stop-timeout-secs",
        "30",
        "--json",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let runs = run_dirs(root.path());
    assert_eq!(runs.len(), 1);
    let run = &runs[0];

    // Warm-up iteration is not recorded
    assert_eq!(line_count(&run.join("pub-app0")), 4 * 2);
    // The subscriber is bound before Start, so every message arrives
    assert_eq!(line_count(&run.join("sub-app1")), 5 * 2);
    assert!(run.join("report.json").exists());
    assert!(run.join("run.json").exists());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("publish"));
    assert!(stdout.contains("subscribe"));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run.join("report.json")).unwrap()).unwrap();
    assert_eq!(report["publish_samples"], 8);
    assert_eq!(report["subscribe_samples"], 10);
    assert!(!report["publish"].is_null());
    assert!(!report["subscribe"].is_null());
    assert_eq!(report["exits"].as_array().map(Vec::len), Some(2));

    // The per-run socket directory is cleaned up
    assert!(std::fs::read_dir(sockets.path()).unwrap().next().is_none());

    // Re-aggregate the same run through `report`
    let output = pulsebench(&["report", "--root", root_arg]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("publish"));
    assert!(stdout.contains("Processes: 2"));
}

#[test]
fn test_invalid_run_spawns_nothing() {
    let root = TempDir::new().unwrap();
    let output = pulsebench(&[
        "run",
        "5",
        "64",
        "2",
        "--processes",
        "1",
        "--root",
        root.path().to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(run_dirs(root.path()).is_empty());
}

#[test]
fn test_report_without_runs_fails() {
    let root = TempDir::new().unwrap();
    let output = pulsebench(&["report", "--root", root.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("NoRuns"));
}
