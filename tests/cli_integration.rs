//! Integration tests for mptrace CLI functionality

#![allow(clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_output() {
    let mut cmd = Command::cargo_bin("mptrace").expect("Failed to find mptrace binary");
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("NAT-aware multipath"))
        .stdout(predicate::str::contains("--json"))
        .stdout(predicate::str::contains("--npaths"))
        .stdout(predicate::str::contains("--broken-nat"))
        .stdout(predicate::str::contains("--no-rdns"));
}

#[test]
fn test_version_output() {
    let mut cmd = Command::cargo_bin("mptrace").expect("Failed to find mptrace binary");
    cmd.arg("--version");

    let output = cmd.output().expect("Failed to execute command");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("mptrace "));
}

#[test]
fn test_missing_host_fails() {
    let mut cmd = Command::cargo_bin("mptrace").expect("Failed to find mptrace binary");
    cmd.assert().failure();
}

#[test]
fn test_invalid_ttl_range_rejected() {
    // Rejected during validation, before any socket is opened.
    let mut cmd = Command::cargo_bin("mptrace").expect("Failed to find mptrace binary");
    cmd.args(["--min-ttl", "10", "--max-ttl", "2", "192.0.2.1"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_zero_paths_rejected() {
    let mut cmd = Command::cargo_bin("mptrace").expect("Failed to find mptrace binary");
    cmd.args(["--npaths", "0", "192.0.2.1"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_port_range_overflow_rejected() {
    // 65535 + 20 paths would wrap the destination port space.
    let mut cmd = Command::cargo_bin("mptrace").expect("Failed to find mptrace binary");
    cmd.args(["--dst-port", "65530", "192.0.2.1"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_family_mismatch_fails_before_probing() {
    // An IPv4 literal with -6 cannot resolve; no privileges needed to
    // observe the failure.
    let mut cmd = Command::cargo_bin("mptrace").expect("Failed to find mptrace binary");
    cmd.args(["-6", "192.0.2.1"]);

    let output = cmd.output().expect("Failed to execute command");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error"));
}
