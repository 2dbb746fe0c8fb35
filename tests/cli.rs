use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn opswatch(dir: &TempDir, toml: &str) -> Command {
    let path = dir.path().join("config.toml");
    fs::write(&path, toml).unwrap();
    let mut cmd = Command::cargo_bin("opswatch").unwrap();
    cmd.arg("--config").arg(path);
    cmd
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("opswatch").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("opswatch 0.1.0"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("opswatch").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Real-time monitoring and throttling core",
        ));
}

#[test]
fn test_cli_limit_missing_action() {
    let dir = TempDir::new().unwrap();
    opswatch(&dir, "")
        .args(["limit", "--actor", "u1", "--resource", "p1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required arguments were not provided"));
}

#[test]
fn test_cli_limit_denies_sixth_attempt() {
    let dir = TempDir::new().unwrap();
    opswatch(&dir, "")
        .args(["limit", "--action", "invite", "--actor", "u1", "--resource", "p1", "--times", "6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Policy for 'invite': 5 requests per 300s"))
        .stdout(predicate::str::contains("attempt 5: allowed (count 5)"))
        .stdout(predicate::str::contains(
            "attempt 6: denied. Too many attempts. Please try again in 5 minutes.",
        ));
}

#[test]
fn test_cli_limit_uses_action_policy() {
    let dir = TempDir::new().unwrap();
    let toml = r#"
[rate_limit.actions.submit]
max_requests = 2
window_secs = 60
"#;
    opswatch(&dir, toml)
        .args(["limit", "--action", "submit", "--actor", "u1", "--resource", "form", "--times", "3", "--report"])
        .assert()
        .success()
        .stdout(predicate::str::contains("attempt 3: denied. Too many attempts. Please try again in 60 seconds."))
        .stdout(predicate::str::contains("\"denied_total\": 1"));
}

#[test]
fn test_cli_config_show() {
    let dir = TempDir::new().unwrap();
    opswatch(&dir, "[monitoring]\nrefresh_interval_secs = 30\n")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("refresh_interval_secs = 30"))
        .stdout(predicate::str::contains("header_name = \"X-CSRF-Token\""));
}

#[test]
fn test_cli_config_check_rejects_invalid() {
    let dir = TempDir::new().unwrap();
    opswatch(&dir, "[csrf]\ntoken_bytes = 8\n")
        .args(["config", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration invalid"));
}

#[test]
fn test_cli_config_check_ok() {
    let dir = TempDir::new().unwrap();
    opswatch(&dir, "[logging]\nlevel = \"warn\"\n")
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"));
}

#[test]
fn test_cli_run_prints_board() {
    let dir = TempDir::new().unwrap();
    opswatch(&dir, "[logging]\nlevel = \"warn\"\n")
        .args(["run", "--duration-secs", "1", "--burst-interval-ms", "50"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("Overall status:"))
        .stdout(predicate::str::contains("edge_functions"));
}
