//! CLI tests for netcfg
//!
//! Runs the built binary with assert_cmd against temporary config and
//! inventory files. Nothing here reaches a real device.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

fn netcfg_cmd() -> Command {
    let mut cmd = Command::cargo_bin("netcfg").unwrap();
    cmd.env_remove("NETCFG_INVENTORY")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

/// A config file with two devices and the directory holding it.
fn workspace() -> (TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let config = dir.path().join("netcfg.toml");
    std::fs::write(
        &config,
        r#"
[defaults]
username = "admin"
timeout = 5

[[devices]]
name = "r1"
host = "192.0.2.1"
platform = "cisco_ios"

[[devices]]
name = "sw1"
host = "127.0.0.1"
port = 1
platform = "arista_eos"
transport = "eapi"
eapi_use_ssl = false
"#,
    )
    .unwrap();
    (dir, config)
}

#[test]
fn test_help_lists_commands() {
    netcfg_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("replace"))
        .stdout(predicate::str::contains("merge"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("compare"));
}

#[test]
fn test_version() {
    netcfg_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_list_json() {
    let (_dir, config) = workspace();

    let output = netcfg_cmd()
        .arg("-c")
        .arg(&config)
        .args(["--output", "json", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "r1");
    assert_eq!(rows[0]["adapter"], "ios");
    assert_eq!(rows[0]["rollback_point"], "flash:rollback_config.txt");
    assert_eq!(rows[1]["transport"], "eapi");
}

#[test]
fn test_list_with_limit() {
    let (_dir, config) = workspace();

    netcfg_cmd()
        .arg("-c")
        .arg(&config)
        .args(["--limit", "sw", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sw1"))
        .stdout(predicate::str::contains("192.0.2.1").not());
}

#[test]
fn test_list_from_inventory_file() {
    let (dir, config) = workspace();
    let inventory = dir.path().join("inventory.yml");
    std::fs::write(&inventory, "devices:\n  - name: n1\n    platform: nxos\n").unwrap();

    netcfg_cmd()
        .arg("-c")
        .arg(&config)
        .arg("-i")
        .arg(&inventory)
        .args(["list", "--capabilities"])
        .assert()
        .success()
        .stdout(predicate::str::contains("n1"))
        .stdout(predicate::str::contains("bootflash:rollback_config.txt"));
}

#[test]
fn test_replace_needs_a_candidate() {
    let (_dir, config) = workspace();

    netcfg_cmd()
        .arg("-c")
        .arg(&config)
        .args(["replace", "r1"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_candidate_sources_conflict() {
    let (_dir, config) = workspace();

    netcfg_cmd()
        .arg("-c")
        .arg(&config)
        .args(["merge", "r1", "--text", "ntp server 192.0.2.1", "--candidate", "r1.cfg"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_unknown_device() {
    let (_dir, config) = workspace();

    netcfg_cmd()
        .arg("-c")
        .arg(&config)
        .args(["merge", "r9", "--text", "ntp server 192.0.2.1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("'r9' is not in the inventory"));
}

#[test]
fn test_missing_candidate_file() {
    let (dir, config) = workspace();
    let missing = dir.path().join("missing.cfg");

    netcfg_cmd()
        .arg("-c")
        .arg(&config)
        .arg("replace")
        .arg("r1")
        .arg("--candidate")
        .arg(&missing)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Candidate file not found"));
}

#[test]
fn test_unreachable_device_fails_run() {
    let (_dir, config) = workspace();

    let output = netcfg_cmd()
        .arg("-c")
        .arg(&config)
        .args(["--output", "json", "merge", "sw1", "--text", "ntp server 192.0.2.1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["devices"][0]["device"], "sw1");
    assert_eq!(report["devices"][0]["outcome"], "unreachable");
}

#[test]
fn test_rollback_check_mode_lists_devices() {
    let (_dir, config) = workspace();

    netcfg_cmd()
        .arg("-c")
        .arg(&config)
        .args(["--check", "rollback", "r1", "sw1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("would roll back: [r1]"))
        .stdout(predicate::str::contains("would roll back: [sw1]"));
}
