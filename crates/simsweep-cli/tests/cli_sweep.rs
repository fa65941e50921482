#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::tempdir;

const FAIL_ON_TOURN: &str = r#"case "$2" in *=tourn) echo "predictor rejected" >&2; exit 1;; esac; echo "$@" > stats.txt"#;
const ALWAYS_OK: &str = r#"echo "$@" > stats.txt"#;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("sweep.yaml");
    fs::write(
        &path,
        "dimensions:\n  cache_sizes_kib: [16, 32]\n  predictors: [local, tourn]\n  matrix_sizes:\n    - {I: 4, J: 4, K: 4}\n",
    )
    .unwrap();
    path
}

fn simsweep(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_simsweep"))
        .args(args)
        .output()
        .expect("run simsweep")
}

fn sweep(dir: &Path, script: &str, extra: &[&str]) -> Output {
    let config = write_config(dir);
    let out = dir.join("out");
    let mut args = vec![
        "sweep",
        "--program",
        "/bin/sh",
        "--out",
        out.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ];
    args.extend_from_slice(extra);
    args.extend_from_slice(&["--", "-c", script, "sim"]);
    simsweep(&args)
}

fn done_identities(ledger: &Path) -> Vec<String> {
    let value: Value = serde_json::from_str(&fs::read_to_string(ledger).unwrap()).unwrap();
    value["done"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

fn run_dir_count(out: &Path) -> usize {
    fs::read_dir(out)
        .unwrap()
        .filter(|entry| entry.as_ref().unwrap().path().is_dir())
        .count()
}

#[test]
fn failing_combination_stops_the_sweep() {
    let dir = tempdir().unwrap();
    let output = sweep(dir.path(), FAIL_ON_TOURN, &[]);
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8(output.stderr).unwrap();
    let error_lines: Vec<&str> = stderr.lines().filter(|l| l.starts_with("error:")).collect();
    assert_eq!(error_lines.len(), 1);
    assert!(error_lines[0].contains("identity: l1d:16 BP:tourn M:4,4,4"));
    assert!(error_lines[0].contains("predictor rejected"));
    assert!(!stderr.contains("l1d:32"));

    let out = dir.path().join("out");
    assert_eq!(
        done_identities(&out.join("ledger.json")),
        vec!["l1d:16 BP:local M:4,4,4"]
    );
    assert_eq!(run_dir_count(&out), 1);
    assert!(!out.join("sweep_report.json").exists());
}

#[test]
fn rerun_skips_completed_combinations() {
    let dir = tempdir().unwrap();
    let first = sweep(dir.path(), ALWAYS_OK, &[]);
    assert!(first.status.success());
    let out = dir.path().join("out");
    assert_eq!(done_identities(&out.join("ledger.json")).len(), 4);

    let second = sweep(dir.path(), ALWAYS_OK, &[]);
    assert!(second.status.success());
    let stderr = String::from_utf8(second.stderr).unwrap();
    assert_eq!(stderr.matches("exists, skipped").count(), 4);
    assert_eq!(run_dir_count(&out), 4);

    let report: Value =
        serde_json::from_str(&fs::read_to_string(out.join("sweep_report.json")).unwrap()).unwrap();
    assert_eq!(report["executed"], 0);
    assert_eq!(report["skipped"], 4);
}

#[test]
fn default_arguments_reach_the_simulator() {
    let dir = tempdir().unwrap();
    let output = sweep(dir.path(), ALWAYS_OK, &["--jobs", "2", "--quiet"]);
    assert!(output.status.success());
    let out = dir.path().join("out");
    let mut seen: Vec<String> = fs::read_dir(&out)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.is_dir())
        .map(|path| fs::read_to_string(path.join("stats.txt")).unwrap().trim().to_string())
        .collect();
    seen.sort();
    assert_eq!(seen[0], "--l1d_size=16kB --branch_predictor=local --options=4 4 4");
    assert_eq!(seen.len(), 4);
}

#[test]
fn missing_output_directory_is_rejected_up_front() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let output = simsweep(&[
        "sweep",
        "--program",
        "/bin/sh",
        "--config",
        config.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("config-output-missing"));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn corrupt_ledger_is_a_hard_stop() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("ledger.json"), "{not json").unwrap();
    let output = sweep(dir.path(), ALWAYS_OK, &[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8(output.stderr).unwrap().contains("corrupt ledger"));
    assert_eq!(fs::read_to_string(out.join("ledger.json")).unwrap(), "{not json");
    assert_eq!(run_dir_count(&out), 0);
}

#[test]
fn status_reports_pending_identities() {
    let dir = tempdir().unwrap();
    let failed = sweep(dir.path(), FAIL_ON_TOURN, &[]);
    assert!(!failed.status.success());
    let ledger = dir.path().join("out").join("ledger.json");
    let output = simsweep(&["status", "--ledger", ledger.to_str().unwrap()]);
    assert!(output.status.success());
    let status: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["total"], 4);
    assert_eq!(status["done"], 1);
    assert_eq!(status["pending_identities"][0], "l1d:16 BP:tourn M:4,4,4");
}

#[test]
fn single_run_leaves_no_ledger() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("single");
    let output = simsweep(&[
        "single",
        "--program",
        "/bin/sh",
        "--out",
        out.to_str().unwrap(),
        "--l1d-size",
        "64",
        "--predictor",
        "bimodal",
        "--matrix",
        "8,8,8",
        "--",
        "-c",
        ALWAYS_OK,
        "sim",
    ]);
    assert!(output.status.success());
    let run_dir = String::from_utf8(output.stdout).unwrap();
    let run_dir = Path::new(run_dir.trim());
    assert!(run_dir
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("bbi_l1d64kB_m8x8x8_"));
    assert_eq!(
        fs::read_to_string(run_dir.join("stats.txt")).unwrap().trim(),
        "--l1d_size=64kB --branch_predictor=bi --options=8 8 8"
    );
    assert!(!out.join("ledger.json").exists());
}
