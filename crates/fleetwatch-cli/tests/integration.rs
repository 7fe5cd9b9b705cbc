#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn fleetwatch(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("fleetwatch").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env_remove("FLEETWATCH_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, yaml: &str) {
    std::fs::write(dir.path().join("fleetwatch.yaml"), yaml).unwrap();
}

// ---------------------------------------------------------------------------
// help
// ---------------------------------------------------------------------------

#[test]
fn help_lists_commands() {
    let dir = TempDir::new().unwrap();
    fleetwatch(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn run_help_documents_flags() {
    let dir = TempDir::new().unwrap();
    fleetwatch(&dir)
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--once"))
        .stdout(predicate::str::contains("--monitor-only"))
        .stdout(predicate::str::contains("--stop-timeout"));
}

// ---------------------------------------------------------------------------
// config init
// ---------------------------------------------------------------------------

#[test]
fn config_init_writes_defaults() {
    let dir = TempDir::new().unwrap();
    fleetwatch(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));

    let content = std::fs::read_to_string(dir.path().join("fleetwatch.yaml")).unwrap();
    let value: serde_yaml::Value = serde_yaml::from_str(&content).unwrap();
    assert_eq!(value["interval_seconds"].as_u64(), Some(86_400));
    assert_eq!(value["docker"]["binary"].as_str(), Some("docker"));
}

#[test]
fn config_init_refuses_to_overwrite_without_force() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "cleanup: true\n");

    fleetwatch(&dir)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    let content = std::fs::read_to_string(dir.path().join("fleetwatch.yaml")).unwrap();
    assert_eq!(content, "cleanup: true\n");

    fleetwatch(&dir)
        .args(["config", "init", "--force"])
        .assert()
        .success();
    let content = std::fs::read_to_string(dir.path().join("fleetwatch.yaml")).unwrap();
    assert!(content.contains("cleanup: false"));
}

#[test]
fn config_init_honours_explicit_path() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("conf/custom.yaml");
    fleetwatch(&dir)
        .args(["config", "init", "--config"])
        .arg(&target)
        .assert()
        .success();
    assert!(target.is_file());
    assert!(!dir.path().join("fleetwatch.yaml").exists());
}

// ---------------------------------------------------------------------------
// config validate / show
// ---------------------------------------------------------------------------

#[test]
fn validate_defaults_is_clean() {
    let dir = TempDir::new().unwrap();
    fleetwatch(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn validate_reports_errors_and_fails() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "interval_seconds: 0\nstop_timeout_seconds: 600\n");
    fleetwatch(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] interval_seconds"))
        .stdout(predicate::str::contains("[warning] stop_timeout_seconds=600"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn validate_json_lists_warnings() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "containers: [web]\nexclude: [web]\n");
    let output = fleetwatch(&dir)
        .args(["--json", "config", "validate"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let warnings = value["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["level"], "warning");
}

#[test]
fn show_prints_effective_config() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "stop_timeout_seconds: 42\n");
    fleetwatch(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fleetwatch.yaml"))
        .stdout(predicate::str::contains("stop_timeout_seconds: 42"));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    fleetwatch(&dir)
        .env("FLEETWATCH_CONFIG", dir.path().join("absent.yaml"))
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn malformed_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "interval_seconds: [not, a, number]\n");
    fleetwatch(&dir)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

// ---------------------------------------------------------------------------
// run / plan without a runtime
// ---------------------------------------------------------------------------

#[test]
fn plan_fails_cleanly_without_docker() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "docker:\n  binary: fleetwatch-no-such-docker\n");
    fleetwatch(&dir)
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("fleetwatch-no-such-docker"));
}

#[test]
fn run_once_fails_cleanly_without_docker() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "docker:\n  binary: fleetwatch-no-such-docker\n");
    fleetwatch(&dir)
        .args(["run", "--once"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn run_rejects_zero_interval() {
    let dir = TempDir::new().unwrap();
    fleetwatch(&dir)
        .args(["run", "--interval", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("interval must be greater than 0"));
}
