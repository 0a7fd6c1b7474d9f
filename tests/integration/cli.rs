//! Smoke tests for the `appupdate` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn appupdate() -> Command {
    let mut cmd = Command::cargo_bin("appupdate").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("APPUPDATE_CONFIG_PATH");
    cmd
}

fn write_config(path: &Path, server_url: &str, dir: &Path, installed: i64) {
    let config = format!(
        r#"[update]
descriptor_url = "{server_url}/version.json"
artifact_url = "{server_url}/app.pkg"
package = "app"
download_dir = "{downloads}"
install_dir = "{install}"
installed_version_code = {installed}
"#,
        downloads = dir.join("downloads").display().to_string().replace('\\', "/"),
        install = dir.join("install").display().to_string().replace('\\', "/"),
    );
    std::fs::write(path, config).unwrap();
}

#[test]
fn test_help_lists_commands() {
    appupdate()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_config_init_and_show() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    appupdate()
        .args(["config", "init", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config"));
    assert!(config_path.exists());

    appupdate()
        .arg("--config")
        .arg(&config_path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("descriptor_url"));
}

#[test]
fn test_run_without_urls_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "[update]\npackage = \"app\"\n").unwrap();

    appupdate()
        .arg("--config")
        .arg(&config_path)
        .arg("run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("descriptor_url is not configured"));
}

#[test]
fn test_check_reports_available_update() {
    let temp_dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    let _descriptor = server
        .mock("GET", "/version.json")
        .with_status(200)
        .with_body(r#"{"version_code": 5}"#)
        .create();
    let config_path = temp_dir.path().join("config.toml");
    write_config(&config_path, &server.url(), temp_dir.path(), 3);

    appupdate()
        .arg("--config")
        .arg(&config_path)
        .args(["--quiet", "check", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""update_available": true"#))
        .stdout(predicate::str::contains(r#""available": 5"#));
}

#[test]
fn test_run_installs_update() {
    let temp_dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    let _descriptor = server
        .mock("GET", "/version.json")
        .with_status(200)
        .with_body(r#"{"version_code": 5}"#)
        .create();
    let _artifact = server
        .mock("GET", "/app.pkg")
        .with_status(200)
        .with_body("release five")
        .create();
    let config_path = temp_dir.path().join("config.toml");
    write_config(&config_path, &server.url(), temp_dir.path(), 4);

    appupdate()
        .arg("--config")
        .arg(&config_path)
        .args(["--quiet", "run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated app to 5"));

    let installed = temp_dir
        .path()
        .join("install")
        .join(format!("app{}", std::env::consts::EXE_SUFFIX));
    assert_eq!(std::fs::read(installed).unwrap(), b"release five");
}
