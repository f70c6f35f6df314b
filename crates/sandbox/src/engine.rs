//! Container sandbox engine.
//!
//! One `ContainerSandbox` per invocation: the container is created with hard
//! resource ceilings and the full hardening set, driven through Docker exec
//! sessions, and force-removed on cleanup. The lifecycle is
//! `UNINITIALIZED → CREATING → RUNNING → {EXITED | FAILED} → CLEANED`, and
//! `CLEANED` is reached even on failure paths.

use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, KillContainerOptions,
    LogOutput, RemoveContainerOptions, UploadToContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{HostConfig, Mount, MountTmpfsOptions, MountTypeEnum, ResourcesUlimits};
use bollard::Docker;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tierbox_core::types::truncate_output;
use tierbox_core::{Error, Result, ToolCategory};

use crate::archive;

// =============================================================================
// Sandbox Configuration
// =============================================================================

/// CPU quota period in microseconds (standard 100ms).
const CPU_PERIOD: i64 = 100_000;

/// Host bind mount into the container.
#[derive(Debug, Clone)]
pub struct Bind {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

impl Bind {
    pub fn read_write(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: false,
        }
    }

    pub fn read_only(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: true,
        }
    }

    fn render(&self) -> String {
        let ro = if self.read_only { ":ro" } else { "" };
        format!(
            "{}:{}{}",
            self.host_path.display(),
            self.container_path,
            ro
        )
    }
}

/// Configuration for one sandbox instance. One default exists per tool
/// category; callers may override any field per call.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Base image reference.
    pub image: String,
    /// Wall-clock ceiling for the whole invocation.
    pub timeout: Duration,
    /// Memory ceiling, "512m"-style.
    pub memory_limit: String,
    /// Fractional core count; quota = share × period.
    pub cpu_share: f64,
    /// Network access (off by default: `network_mode: none`).
    pub network_enabled: bool,
    /// Read-only root filesystem.
    pub read_only_root: bool,
    /// Size cap for the tmpfs scratch filesystem at /tmp.
    pub scratch_size_bytes: i64,
    /// Captured-output cap in characters.
    pub output_cap_chars: usize,
    /// Working directory inside the container.
    pub workdir: String,
    /// Volume bindings (private host workdir plus caller extras).
    pub binds: Vec<Bind>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "python:3.11-slim".to_string(),
            timeout: Duration::from_secs(120),
            memory_limit: "512m".to_string(),
            cpu_share: 1.0,
            network_enabled: false,
            read_only_root: true,
            scratch_size_bytes: 64 * 1024 * 1024,
            output_cap_chars: 100_000,
            workdir: "/workspace".to_string(),
            binds: Vec::new(),
        }
    }
}

impl SandboxConfig {
    /// Default resource profile for a tool category.
    pub fn for_category(category: ToolCategory) -> Self {
        match category {
            ToolCategory::Development => Self::default(),
            ToolCategory::System => Self {
                image: "alpine:3.20".to_string(),
                timeout: Duration::from_secs(60),
                memory_limit: "256m".to_string(),
                cpu_share: 0.5,
                ..Self::default()
            },
            ToolCategory::Analysis => Self {
                timeout: Duration::from_secs(300),
                memory_limit: "1g".to_string(),
                cpu_share: 2.0,
                ..Self::default()
            },
        }
    }
}

/// Parse a "512m"-style memory limit into bytes.
pub fn parse_memory_limit(limit: &str) -> Result<i64> {
    let limit = limit.trim().to_ascii_lowercase();
    let (digits, multiplier) = match limit.chars().last() {
        Some('k') => (&limit[..limit.len() - 1], 1024i64),
        Some('m') => (&limit[..limit.len() - 1], 1024 * 1024),
        Some('g') => (&limit[..limit.len() - 1], 1024 * 1024 * 1024),
        Some(c) if c.is_ascii_digit() => (limit.as_str(), 1),
        _ => return Err(Error::validation(format!("invalid memory limit '{}'", limit))),
    };
    digits
        .parse::<i64>()
        .map(|n| n * multiplier)
        .map_err(|_| Error::validation(format!("invalid memory limit '{}'", limit)))
}

// =============================================================================
// Exec output
// =============================================================================

/// Output of one command run inside the sandbox.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Sandbox lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Uninitialized,
    Creating,
    Running,
    Exited,
    Failed,
    Cleaned,
}

/// One isolated container instance, created fresh per invocation.
pub struct ContainerSandbox {
    docker: Docker,
    config: SandboxConfig,
    state: SandboxState,
    container_id: Option<String>,
    cleanup_errors: Vec<String>,
}

impl ContainerSandbox {
    pub fn new(docker: Docker, config: SandboxConfig) -> Self {
        Self {
            docker,
            config,
            state: SandboxState::Uninitialized,
            container_id: None,
            cleanup_errors: Vec::new(),
        }
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Create and start the container, then verify the command channel.
    ///
    /// No container is ever left behind on a failed create: any error in this
    /// sequence triggers an immediate `cleanup()` before it propagates.
    pub async fn create(&mut self) -> Result<()> {
        if self.state != SandboxState::Uninitialized {
            return Err(Error::sandbox(format!(
                "create() called in state {:?}",
                self.state
            )));
        }
        self.state = SandboxState::Creating;

        match self.create_inner().await {
            Ok(()) => {
                self.state = SandboxState::Running;
                tracing::info!(
                    container_id = %self.container_id.as_deref().unwrap_or(""),
                    image = %self.config.image,
                    "sandbox container created and started"
                );
                Ok(())
            }
            Err(e) => {
                self.state = SandboxState::Failed;
                self.cleanup().await;
                Err(e)
            }
        }
    }

    async fn create_inner(&mut self) -> Result<()> {
        let name = format!("tierbox-{}", uuid::Uuid::new_v4());
        let memory = parse_memory_limit(&self.config.memory_limit)?;
        let cpu_quota = (self.config.cpu_share * CPU_PERIOD as f64) as i64;

        let binds: Vec<String> = self.config.binds.iter().map(Bind::render).collect();

        let host_config = HostConfig {
            memory: Some(memory),
            cpu_quota: Some(cpu_quota),
            cpu_period: Some(CPU_PERIOD),
            network_mode: Some(if self.config.network_enabled {
                "bridge".to_string()
            } else {
                "none".to_string()
            }),
            binds: if binds.is_empty() { None } else { Some(binds) },
            // size-capped scratch filesystem
            mounts: Some(vec![Mount {
                target: Some("/tmp".to_string()),
                typ: Some(MountTypeEnum::TMPFS),
                tmpfs_options: Some(MountTmpfsOptions {
                    size_bytes: Some(self.config.scratch_size_bytes),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            readonly_rootfs: Some(self.config.read_only_root),
            // all privilege capabilities dropped, escalation disallowed
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            pids_limit: Some(128),
            ulimits: Some(vec![ResourcesUlimits {
                name: Some("nofile".to_string()),
                soft: Some(1024),
                hard: Some(2048),
            }]),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(self.config.image.clone()),
            working_dir: Some(self.config.workdir.clone()),
            user: Some("nobody".to_string()),
            // idle foreground process; commands arrive through exec sessions
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            host_config: Some(host_config),
            labels: Some(std::collections::HashMap::from([(
                "managed-by".to_string(),
                "tierbox".to_string(),
            )])),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: &name,
            platform: None,
        };

        self.docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| Error::sandbox(format!("failed to create container: {}", e)))?;
        // from here on the container exists; record it so cleanup can see it
        self.container_id = Some(name.clone());

        self.docker
            .start_container::<String>(&name, None)
            .await
            .map_err(|e| Error::sandbox(format!("failed to start container: {}", e)))?;

        // verify the command channel before reporting the sandbox usable
        let probe = self.exec("true", Duration::from_secs(10)).await?;
        if !probe.success() {
            return Err(Error::sandbox(format!(
                "command channel probe failed with exit code {}",
                probe.exit_code
            )));
        }
        Ok(())
    }

    /// Run a shell command inside the container with a wall-clock ceiling.
    pub async fn run_command(&self, command: &str, timeout: Duration) -> Result<ExecOutput> {
        if self.state != SandboxState::Running {
            return Err(Error::sandbox(format!(
                "run_command() in state {:?}",
                self.state
            )));
        }
        self.exec(command, timeout).await
    }

    async fn exec(&self, command: &str, timeout: Duration) -> Result<ExecOutput> {
        self.exec_as(command, timeout, None).await
    }

    /// File-protocol helpers run as root because upload/download happen with
    /// daemon privileges anyway; payload commands stay on the container user.
    async fn exec_as(
        &self,
        command: &str,
        timeout: Duration,
        user: Option<&str>,
    ) -> Result<ExecOutput> {
        let id = self
            .container_id
            .as_deref()
            .ok_or_else(|| Error::sandbox("no container"))?;

        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(vec!["sh", "-c", command]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some(self.config.workdir.as_str()),
                    user,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::sandbox(format!("failed to create exec: {}", e)))?;

        let start = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::sandbox(format!("failed to start exec: {}", e)))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = start {
            let collect = async {
                while let Some(msg) = output.next().await {
                    match msg {
                        Ok(LogOutput::StdOut { message }) => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(LogOutput::StdErr { message }) => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            stderr.push_str(&format!("\n[stream error: {}]", e));
                            break;
                        }
                    }
                }
            };

            if tokio::time::timeout(timeout, collect).await.is_err() {
                tracing::warn!(container_id = %id, command = %command, "sandbox command timed out");
                return Err(Error::sandbox_timeout(format!(
                    "command exceeded {:?}",
                    timeout
                )));
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| Error::sandbox(format!("failed to inspect exec: {}", e)))?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code.unwrap_or(-1),
            stdout: truncate_output(&stdout, self.config.output_cap_chars),
            stderr: truncate_output(&stderr, self.config.output_cap_chars),
        })
    }

    // =========================================================================
    // File protocol
    // =========================================================================

    /// Read a file from the container via a single-entry archive download.
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let resolved = archive::resolve_path(&self.config.workdir, path)?;
        let bytes = self.download_archive(&resolved).await?;
        archive::unpack_single(&bytes)
    }

    /// Write a file into the container via a single-entry archive upload,
    /// creating the parent directory first.
    pub async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let resolved = archive::resolve_path(&self.config.workdir, path)?;
        let (parent, name) = archive::split_parent(&resolved)?;

        let mkdir = self
            .exec_as(
                &format!("mkdir -p '{}'", parent),
                Duration::from_secs(10),
                Some("root"),
            )
            .await?;
        if !mkdir.success() {
            return Err(Error::sandbox(format!(
                "failed to create directory '{}': {}",
                parent, mkdir.stderr
            )));
        }

        let tarball = archive::pack_file(&name, data)?;
        self.upload_archive(&parent, tarball).await
    }

    /// Copy a container path out to a host directory. Archive entries that
    /// would escape `host_dir` are skipped, never extracted. Returns the
    /// number of extracted entries.
    pub async fn copy_from(&self, container_path: &str, host_dir: &Path) -> Result<usize> {
        let resolved = archive::resolve_path(&self.config.workdir, container_path)?;
        let bytes = self.download_archive(&resolved).await?;

        let dest = host_dir.to_path_buf();
        let (extracted, skipped) =
            tokio::task::spawn_blocking(move || archive::unpack_into(&bytes, &dest))
                .await
                .map_err(|e| Error::internal(format!("archive unpack task failed: {}", e)))??;
        if skipped > 0 {
            tracing::debug!(container_path, skipped, "dropped archive entries during copy_from");
        }
        Ok(extracted)
    }

    /// Copy a host file or directory into the container, preserving relative
    /// structure, then verify the write landed.
    pub async fn copy_to(&self, host_path: &Path, container_dir: &str) -> Result<()> {
        let resolved = archive::resolve_path(&self.config.workdir, container_dir)?;

        let src = host_path.to_path_buf();
        let tarball = tokio::task::spawn_blocking(move || archive::pack_path(&src))
            .await
            .map_err(|e| Error::internal(format!("archive pack task failed: {}", e)))??;

        let mkdir = self
            .exec_as(
                &format!("mkdir -p '{}'", resolved),
                Duration::from_secs(10),
                Some("root"),
            )
            .await?;
        if !mkdir.success() {
            return Err(Error::sandbox(format!(
                "failed to create directory '{}': {}",
                resolved, mkdir.stderr
            )));
        }
        self.upload_archive(&resolved, tarball).await?;

        // confirm the transfer from inside the container
        let probe_name = host_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| format!("{}/{}", resolved, n))
            .unwrap_or_else(|| resolved.clone());
        let check = self
            .exec_as(
                &format!("test -e '{}'", probe_name),
                Duration::from_secs(10),
                Some("root"),
            )
            .await?;
        if !check.success() {
            return Err(Error::sandbox(format!(
                "copy_to verification failed: '{}' missing after upload",
                probe_name
            )));
        }
        Ok(())
    }

    async fn download_archive(&self, resolved: &str) -> Result<Vec<u8>> {
        let id = self
            .container_id
            .as_deref()
            .ok_or_else(|| Error::sandbox("no container"))?;

        let mut stream = self.docker.download_from_container(
            id,
            Some(DownloadFromContainerOptions {
                path: resolved.to_string(),
            }),
        );
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(data) => bytes.extend_from_slice(&data),
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                }) => return Err(Error::not_found(format!("no such path: '{}'", resolved))),
                Err(e) => return Err(Error::sandbox(format!("archive download failed: {}", e))),
            }
        }
        Ok(bytes)
    }

    async fn upload_archive(&self, dest_dir: &str, tarball: Vec<u8>) -> Result<()> {
        let id = self
            .container_id
            .as_deref()
            .ok_or_else(|| Error::sandbox("no container"))?;

        self.docker
            .upload_to_container(
                id,
                Some(UploadToContainerOptions {
                    path: dest_dir.to_string(),
                    ..Default::default()
                }),
                bytes::Bytes::from(tarball),
            )
            .await
            .map_err(|e| Error::sandbox(format!("archive upload failed: {}", e)))
    }

    // =========================================================================
    // Waiting and cleanup
    // =========================================================================

    /// Wait for the container's main process to exit, up to `timeout`.
    ///
    /// On expiry the container is force-killed and removed; there is no
    /// graceful stop-then-wait retry.
    pub async fn wait(&mut self, timeout: Duration) -> Result<i64> {
        let id = self
            .container_id
            .clone()
            .ok_or_else(|| Error::sandbox("no container"))?;

        // stream on an owned handle so cleanup can borrow self mutably below
        let docker = self.docker.clone();
        let mut wait_stream = docker.wait_container(&id, None::<WaitContainerOptions<String>>);

        tokio::select! {
            outcome = wait_stream.next() => match outcome {
                Some(Ok(response)) => {
                    self.state = SandboxState::Exited;
                    Ok(response.status_code)
                }
                Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                    // non-zero exit arrives as a wait error in bollard
                    self.state = SandboxState::Exited;
                    Ok(code)
                }
                Some(Err(e)) => {
                    self.state = SandboxState::Failed;
                    Err(Error::sandbox(format!("wait failed: {}", e)))
                }
                None => {
                    self.state = SandboxState::Failed;
                    Err(Error::sandbox("wait stream ended unexpectedly"))
                }
            },
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(container_id = %id, "container exceeded timeout, force-killing");
                self.state = SandboxState::Failed;
                self.cleanup().await;
                Err(Error::sandbox_timeout(format!(
                    "container exceeded {:?}",
                    timeout
                )))
            }
        }
    }

    /// Tear the container down. Idempotent: a second call is a no-op, and
    /// every error encountered is collected into a diagnostic list instead of
    /// aborting at the first failure.
    pub async fn cleanup(&mut self) -> Vec<String> {
        let Some(id) = self.container_id.take() else {
            if self.state != SandboxState::Cleaned {
                self.state = SandboxState::Cleaned;
            }
            return Vec::new();
        };

        let mut errors = Vec::new();

        if let Err(e) = self
            .docker
            .kill_container(&id, None::<KillContainerOptions<String>>)
            .await
        {
            if !is_gone_or_stopped(&e) {
                errors.push(format!("kill: {}", e));
            }
        }

        if let Err(e) = self
            .docker
            .remove_container(
                &id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            if !is_gone_or_stopped(&e) {
                errors.push(format!("remove: {}", e));
            }
        }

        for err in &errors {
            tracing::warn!(container_id = %id, error = %err, "sandbox cleanup error");
        }
        self.cleanup_errors.extend(errors.iter().cloned());
        self.state = SandboxState::Cleaned;
        tracing::info!(container_id = %id, "sandbox container cleaned up");
        errors
    }

    /// Diagnostics accumulated across cleanup attempts.
    pub fn cleanup_errors(&self) -> &[String] {
        &self.cleanup_errors
    }
}

/// An already-exited or already-removed container is a tolerated cleanup
/// condition, not an error.
fn is_gone_or_stopped(e: &bollard::errors::Error) -> bool {
    matches!(
        e,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404 | 409,
            ..
        }
    )
}
