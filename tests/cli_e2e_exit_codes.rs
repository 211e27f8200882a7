//! End-to-end tests for CLI exit codes.
//!
//! - Exit code 0: success, including a no-op insertion
//! - Exit code 1: any failed command
//! - Exit code 2: invalid command-line usage (handled by clap)

mod common;

use common::prelude::*;

#[test]
fn test_exit_code_help() {
    let mut cmd = cargo_bin_cmd!("insertion-tool");
    cmd.arg("--help").assert().code(0);
}

#[test]
fn test_exit_code_version() {
    let mut cmd = cargo_bin_cmd!("insertion-tool");
    cmd.arg("--version")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("insertion-tool"));
}

#[test]
fn test_exit_code_missing_subcommand() {
    let mut cmd = cargo_bin_cmd!("insertion-tool");
    cmd.assert().code(2);
}

#[test]
fn test_exit_code_unknown_log_level() {
    let mut cmd = cargo_bin_cmd!("insertion-tool");
    cmd.args(["--log-level", "chatty", "validate"])
        .assert()
        .code(2);
}

#[test]
fn test_exit_code_options_not_found() {
    let temp = TempDir::new().unwrap();
    let mut cmd = cargo_bin_cmd!("insertion-tool");
    cmd.current_dir(temp.path())
        .env_remove("INSERTION_CONFIG")
        .args(["validate", "--config", "nonexistent.yaml"])
        .assert()
        .code(1);
}

#[test]
fn test_exit_code_insert_without_token() {
    let temp = TempDir::new().unwrap();
    let mut cmd = cargo_bin_cmd!("insertion-tool");
    cmd.current_dir(temp.path())
        .env_remove("INSERTION_TOKEN")
        .arg("insert")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--token"));
}

#[test]
fn test_exit_code_insert_without_service() {
    let temp = TempDir::new().unwrap();
    temp.child(".insertion.yaml")
        .write_str(
            "insertion-name: Roslyn\ncomponent-name: Roslyn\ncomponent-branch: main\n\
             target-branch: main\nbuild-definition: ci\n",
        )
        .unwrap();

    let mut cmd = cargo_bin_cmd!("insertion-tool");
    cmd.current_dir(temp.path())
        .env_remove("INSERTION_CONFIG")
        .env("INSERTION_TOKEN", "secret")
        .arg("insert")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("requires service-url"));
}
