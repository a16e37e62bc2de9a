//! CLI Argument Parsing Tests for rsort
//!
//! These tests verify that command-line arguments are parsed correctly: accepted values,
//! rejected values and required positionals.

use assert_cmd::Command;

#[test]
fn test_help_runs() {
    Command::cargo_bin("rsort")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn test_version_runs() {
    Command::cargo_bin("rsort")
        .unwrap()
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn test_requires_source_and_destination() {
    Command::cargo_bin("rsort").unwrap().assert().failure();
    Command::cargo_bin("rsort")
        .unwrap()
        .arg("/tmp")
        .assert()
        .failure();
}

#[test]
fn test_max_concurrent_accepts_positive() {
    Command::cargo_bin("rsort")
        .unwrap()
        .args(["--max-concurrent", "8", "--help"])
        .assert()
        .success();
}

#[test]
fn test_max_concurrent_rejects_zero() {
    Command::cargo_bin("rsort")
        .unwrap()
        .args(["--max-concurrent", "0", "src", "dst"])
        .assert()
        .failure();
}

#[test]
fn test_chunk_size_suffixes() {
    for size in ["64KiB", "1MiB", "4096"] {
        Command::cargo_bin("rsort")
            .unwrap()
            .args(["--chunk-size", size, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_chunk_size_rejects_garbage() {
    Command::cargo_bin("rsort")
        .unwrap()
        .args(["--chunk-size", "lots", "src", "dst"])
        .assert()
        .failure();
}

#[test]
fn test_file_timeout_rejects_garbage() {
    Command::cargo_bin("rsort")
        .unwrap()
        .args(["--file-timeout", "forever", "src", "dst"])
        .assert()
        .failure();
}

#[test]
fn test_progress_type_values() {
    for value in ["auto", "progress-bar", "text-updates"] {
        Command::cargo_bin("rsort")
            .unwrap()
            .args(["--progress-type", value, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_verbose_flags() {
    for flag in ["-v", "-vv", "-vvv", "--verbose"] {
        Command::cargo_bin("rsort")
            .unwrap()
            .args([flag, "--help"])
            .assert()
            .success();
    }
}
