//! Container lifecycle integration tests.
//!
//! These require a local Docker daemon and the `alpine:3.20` image, so they
//! are `#[ignore]`d by default; run with `cargo test -- --ignored`.

use std::time::Duration;

use bollard::Docker;
use tierbox_core::{Error, ToolCategory};
use tierbox_sandbox::{ContainerSandbox, SandboxConfig, SandboxState};

fn alpine_config() -> SandboxConfig {
    SandboxConfig {
        // alpine has no python but is tiny; enough for shell-level tests
        read_only_root: false,
        ..SandboxConfig::for_category(ToolCategory::System)
    }
}

#[tokio::test]
#[ignore]
async fn test_create_run_cleanup() {
    let docker = Docker::connect_with_local_defaults().unwrap();
    let mut sandbox = ContainerSandbox::new(docker, alpine_config());

    sandbox.create().await.unwrap();
    assert_eq!(sandbox.state(), SandboxState::Running);
    assert!(sandbox.container_id().is_some());

    let out = sandbox
        .run_command("echo hello", Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(out.exit_code, 0);
    assert_eq!(out.stdout.trim(), "hello");

    let errors = sandbox.cleanup().await;
    assert!(errors.is_empty(), "cleanup errors: {:?}", errors);
    assert_eq!(sandbox.state(), SandboxState::Cleaned);

    // idempotent
    assert!(sandbox.cleanup().await.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_command_timeout_maps_to_sandbox_timeout() {
    let docker = Docker::connect_with_local_defaults().unwrap();
    let mut sandbox = ContainerSandbox::new(docker, alpine_config());
    sandbox.create().await.unwrap();

    let err = sandbox
        .run_command("sleep 30", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SandboxTimeout(_)));

    sandbox.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_write_then_read_file_roundtrip() {
    let docker = Docker::connect_with_local_defaults().unwrap();
    let mut sandbox = ContainerSandbox::new(docker, alpine_config());
    sandbox.create().await.unwrap();

    sandbox
        .write_file("data/notes.txt", b"archive transfer")
        .await
        .unwrap();
    let bytes = sandbox.read_file("data/notes.txt").await.unwrap();
    assert_eq!(bytes, b"archive transfer");

    let missing = sandbox.read_file("no/such/file").await.unwrap_err();
    assert!(matches!(missing, Error::NotFound(_)));

    sandbox.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_write_file_rejects_traversal_before_upload() {
    let docker = Docker::connect_with_local_defaults().unwrap();
    let mut sandbox = ContainerSandbox::new(docker, alpine_config());
    sandbox.create().await.unwrap();

    let err = sandbox
        .write_file("../../etc/passwd", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Security(_)));

    sandbox.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_wait_observes_container_exit() {
    let docker = Docker::connect_with_local_defaults().unwrap();
    let mut sandbox = ContainerSandbox::new(docker, alpine_config());
    sandbox.create().await.unwrap();

    // terminate the idle main process from inside, then observe the exit
    sandbox
        .run_command("kill -TERM 1", Duration::from_secs(10))
        .await
        .unwrap();
    let code = sandbox.wait(Duration::from_secs(10)).await.unwrap();
    assert_ne!(code, 0);
    assert_eq!(sandbox.state(), SandboxState::Exited);

    sandbox.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_wait_timeout_force_cleans() {
    let docker = Docker::connect_with_local_defaults().unwrap();
    let mut sandbox = ContainerSandbox::new(docker, alpine_config());
    sandbox.create().await.unwrap();

    // the idle main process never exits on its own
    let err = sandbox.wait(Duration::from_secs(2)).await.unwrap_err();
    assert!(matches!(err, Error::SandboxTimeout(_)));
    assert_eq!(sandbox.state(), SandboxState::Cleaned);
    assert!(sandbox.container_id().is_none());
}

#[tokio::test]
#[ignore]
async fn test_copy_to_and_from() {
    let docker = Docker::connect_with_local_defaults().unwrap();
    let mut sandbox = ContainerSandbox::new(docker, alpine_config());
    sandbox.create().await.unwrap();

    let src = tempfile::tempdir().unwrap();
    std::fs::write(src.path().join("a.txt"), "alpha").unwrap();
    std::fs::create_dir_all(src.path().join("sub")).unwrap();
    std::fs::write(src.path().join("sub/b.txt"), "beta").unwrap();

    sandbox.copy_to(src.path(), "incoming").await.unwrap();

    let dest = tempfile::tempdir().unwrap();
    let extracted = sandbox.copy_from("incoming", dest.path()).await.unwrap();
    assert!(extracted >= 2);

    sandbox.cleanup().await;
}
