//! Smoke tests -- verify the binary runs and the CLI surface is intact.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("provreport")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Lifecycle tracking and statistics for provisioning test runs",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("provreport")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("provreport"));
}

#[test]
fn test_serve_subcommand_exists() {
    Command::cargo_bin("provreport")
        .unwrap()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--bind"));
}

#[test]
fn test_loadgen_subcommand_exists() {
    Command::cargo_bin("provreport")
        .unwrap()
        .args(["loadgen", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--base-url"));
}

#[test]
fn test_summary_subcommand_exists() {
    Command::cargo_bin("provreport")
        .unwrap()
        .args(["summary", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--json"));
}

#[test]
fn test_serve_rejects_missing_config_file() {
    Command::cargo_bin("provreport")
        .unwrap()
        .args(["serve", "--config", "/nonexistent/provreport.toml"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("failed to read config file"));
}
