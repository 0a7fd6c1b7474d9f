//! Update cycles through the host downloader, installer and registry.

use appupdate::config::UpdateConfig;
use appupdate::core::{FetchError, UpdateError};
use appupdate::platform::{BuildInfoRegistry, PackageRegistry, Platform};
use appupdate::test_utils::{
    DownloadBehavior, FakeDownloader, FakeInstaller, FakeLauncher, init_test_logging, test_config,
};
use appupdate::update::{CycleOutcome, PeriodicTrigger, UpdateCoordinator};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const RELEASE: &[u8] = b"#!/bin/sh\nexit 0\n";

fn host_config(server_url: &str, dir: &Path, installed: i64) -> UpdateConfig {
    UpdateConfig {
        installed_version_code: Some(installed),
        ..test_config(server_url, dir)
    }
}

#[tokio::test]
async fn test_host_update_replaces_installed_package() {
    init_test_logging(None);
    let temp_dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new_async().await;
    let checksum = hex::encode(Sha256::digest(RELEASE));
    let _descriptor = server
        .mock("GET", "/version.json")
        .with_status(200)
        .with_body(format!(r#"{{"version_code": 2, "sha256": "sha256:{checksum}"}}"#))
        .create_async()
        .await;
    let artifact = server
        .mock("GET", "/app.pkg")
        .with_status(200)
        .with_body(RELEASE)
        .expect(1)
        .create_async()
        .await;

    let config = host_config(&server.url(), temp_dir.path(), 1);
    let install_dir = config.install_dir().unwrap();
    std::fs::create_dir_all(&install_dir).unwrap();
    let installed = install_dir.join(format!("app{}", std::env::consts::EXE_SUFFIX));
    std::fs::write(&installed, b"old release").unwrap();

    let coordinator = UpdateCoordinator::from_config(&config).unwrap();
    let outcome = coordinator.run_update_cycle().await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Updated { version_code: 2, .. }));
    assert_eq!(std::fs::read(&installed).unwrap(), RELEASE);
    assert!(!config.artifact_path().unwrap().exists());
    assert!(
        std::fs::read_dir(install_dir.join(".staging")).unwrap().next().is_none(),
        "staging directory should be empty"
    );
    artifact.assert_async().await;
}

#[tokio::test]
async fn test_host_up_to_date_skips_download() {
    let temp_dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new_async().await;
    let _descriptor = server
        .mock("GET", "/version.json")
        .with_status(200)
        .with_body(r#"{"version_code": 7}"#)
        .create_async()
        .await;
    let artifact = server.mock("GET", "/app.pkg").expect(0).create_async().await;

    let config = host_config(&server.url(), temp_dir.path(), 7);
    let coordinator = UpdateCoordinator::from_config(&config).unwrap();

    let outcome = coordinator.run_update_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::NoUpdate {
            local: 7,
            remote: 7
        }
    );
    artifact.assert_async().await;
}

#[tokio::test]
async fn test_host_missing_artifact_is_unresolved() {
    let temp_dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new_async().await;
    let _descriptor = server
        .mock("GET", "/version.json")
        .with_status(200)
        .with_body(r#"{"version_code": 2}"#)
        .create_async()
        .await;
    let _artifact = server.mock("GET", "/app.pkg").with_status(404).create_async().await;

    let config = host_config(&server.url(), temp_dir.path(), 1);
    let coordinator = UpdateCoordinator::from_config(&config).unwrap();

    let err = coordinator.run_update_cycle().await.unwrap_err();
    assert!(matches!(err, UpdateError::Fetch(FetchError::DownloadUnresolved { .. })));
    assert!(!config.artifact_path().unwrap().exists());
    assert!(!config.install_dir().unwrap().join("app").exists());
}

#[tokio::test]
async fn test_host_corrupt_download_is_discarded() {
    let temp_dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new_async().await;
    let _descriptor = server
        .mock("GET", "/version.json")
        .with_status(200)
        .with_body(r#"{"version_code": 2, "sha256": "0000"}"#)
        .create_async()
        .await;
    let _artifact =
        server.mock("GET", "/app.pkg").with_status(200).with_body(RELEASE).create_async().await;

    let config = host_config(&server.url(), temp_dir.path(), 1);
    let coordinator = UpdateCoordinator::from_config(&config).unwrap();

    let err = coordinator.run_update_cycle().await.unwrap_err();
    assert!(matches!(err, UpdateError::Fetch(FetchError::ChecksumMismatch { .. })));
    assert!(!config.artifact_path().unwrap().exists());
}

#[tokio::test]
async fn test_host_second_cycle_sees_installed_release() {
    let temp_dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new_async().await;
    let _descriptor = server
        .mock("GET", "/version.json")
        .with_status(200)
        .with_body(r#"{"version_code": 2}"#)
        .create_async()
        .await;
    let artifact = server
        .mock("GET", "/app.pkg")
        .with_status(200)
        .with_body(RELEASE)
        .expect(1)
        .create_async()
        .await;

    let config = host_config(&server.url(), temp_dir.path(), 1);
    let coordinator = UpdateCoordinator::from_config(&config).unwrap();

    let first = coordinator.run_update_cycle().await.unwrap();
    assert!(matches!(first, CycleOutcome::Updated { version_code: 2, .. }));

    let second = coordinator.run_update_cycle().await.unwrap();
    assert_eq!(
        second,
        CycleOutcome::NoUpdate {
            local: 2,
            remote: 2
        }
    );
    artifact.assert_async().await;

    // A process started from the same configuration agrees
    let restarted = UpdateCoordinator::from_config(&config).unwrap();
    assert!(!restarted.oracle().check_update_available().await.unwrap());
}

#[tokio::test]
async fn test_periodic_cycles_install_a_release_once() {
    let temp_dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new_async().await;
    let _descriptor = server
        .mock("GET", "/version.json")
        .with_status(200)
        .with_body(r#"{"version_code": 5}"#)
        .create_async()
        .await;

    let config = host_config(&server.url(), temp_dir.path(), 4);
    let registry = Arc::new(BuildInfoRegistry::from_config(&config).unwrap());
    let downloader = Arc::new(FakeDownloader::new(DownloadBehavior::Succeed(b"v5".to_vec())));
    let installer = Arc::new(FakeInstaller::new(0));
    let platform = Platform {
        registry: registry.clone(),
        downloader: downloader.clone(),
        installer: installer.clone(),
        launcher: Arc::new(FakeLauncher::new()),
    };
    let coordinator = Arc::new(UpdateCoordinator::new(platform, &config).unwrap());
    let trigger = PeriodicTrigger::new(coordinator, Duration::from_millis(100));

    let cycles = trigger.run_until(tokio::time::sleep(Duration::from_millis(350))).await;

    assert!(cycles >= 2, "expected several cycles, ran {cycles}");
    assert_eq!(downloader.enqueued().len(), 1);
    assert_eq!(installer.committed().len(), 1);
    assert_eq!(registry.installed_version(&config.package).unwrap(), 5);
}
