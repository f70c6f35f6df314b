//! Subprocess executor.
//!
//! Fallback tier for payload languages the in-process interpreter cannot run.
//! The payload is written to a uniquely named script inside a private scratch
//! directory, executed by a language-specific interpreter in its own process
//! group, and killed (group and all) on wall-clock expiry. The scratch
//! directory is removed unconditionally after the call.

use std::process::Stdio;
use std::time::Duration;

use tierbox_core::types::truncate_output;
use tierbox_core::{Error, Result};

/// Interpreter command and script extension for a payload language.
fn language_spec(language: &str) -> Result<(&'static str, &'static str)> {
    match language.to_ascii_lowercase().as_str() {
        "python" | "python3" => Ok(("python3", "py")),
        "javascript" | "node" | "nodejs" => Ok(("node", "js")),
        "bash" | "sh" | "shell" => Ok(("sh", "sh")),
        other => Err(Error::validation(format!(
            "unsupported language '{}'",
            other
        ))),
    }
}

/// Output of a subprocess-tier run.
#[derive(Debug, Clone)]
pub struct SubprocessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl SubprocessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs payloads through an external interpreter under a hard timeout.
pub struct SubprocessExecutor {
    output_cap: usize,
}

impl SubprocessExecutor {
    pub fn new(output_cap: usize) -> Self {
        Self { output_cap }
    }

    pub async fn execute(
        &self,
        language: &str,
        source: &str,
        timeout: Duration,
    ) -> Result<SubprocessOutput> {
        let (command, extension) = language_spec(language)?;

        // scratch dir and script are removed on drop, success or failure
        let scratch = tempfile::Builder::new()
            .prefix("tierbox-exec-")
            .tempdir()?;
        let script = scratch
            .path()
            .join(format!("script_{}.{}", uuid::Uuid::new_v4(), extension));
        tokio::fs::write(&script, source).await?;

        let mut cmd = tokio::process::Command::new(command);
        cmd.arg(&script)
            .current_dir(scratch.path())
            // stripped environment: no interpreter caches, no inherited vars
            .env_clear()
            .env("PATH", "/usr/local/bin:/usr/bin:/bin")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("NODE_DISABLE_COLORS", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| {
            Error::validation(format!("failed to launch '{}' interpreter: {}", command, e))
        })?;
        let pid = child.id();

        tracing::debug!(language, command, script = %script.display(), "spawned subprocess payload");

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(SubprocessOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: truncate_output(&String::from_utf8_lossy(&output.stdout), self.output_cap),
                stderr: truncate_output(&String::from_utf8_lossy(&output.stderr), self.output_cap),
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                // dropping the child already SIGKILLs it; take the whole
                // process group with it
                #[cfg(unix)]
                if let Some(pid) = pid {
                    unsafe {
                        libc::killpg(pid as i32, libc::SIGKILL);
                    }
                }
                tracing::warn!(language, ?timeout, "subprocess payload timed out, killed process group");
                Err(Error::timeout(format!(
                    "subprocess exceeded {:?}",
                    timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_unsupported_language_is_validation_error() {
        let executor = SubprocessExecutor::new(10_000);
        let err = executor
            .execute("cobol", "DISPLAY 'HI'.", TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_shell_payload_success() {
        let executor = SubprocessExecutor::new(10_000);
        let out = executor
            .execute("sh", "echo hello from scratch", TIMEOUT)
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello from scratch");
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let executor = SubprocessExecutor::new(10_000);
        let out = executor
            .execute("sh", "echo boom 1>&2\nexit 3", TIMEOUT)
            .await
            .unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, 3);
        assert!(out.stderr.contains("boom"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let executor = SubprocessExecutor::new(10_000);
        let err = executor
            .execute("sh", "sleep 30", Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let executor = SubprocessExecutor::new(32);
        let out = executor
            .execute("sh", "i=0; while [ $i -lt 100 ]; do echo 0123456789; i=$((i+1)); done", TIMEOUT)
            .await
            .unwrap();
        assert!(out.stdout.contains("(output truncated)"));
    }

    #[tokio::test]
    async fn test_environment_is_stripped() {
        std::env::set_var("TIERBOX_LEAK_CHECK", "leaked");
        let executor = SubprocessExecutor::new(10_000);
        let out = executor
            .execute("sh", "echo \"value=$TIERBOX_LEAK_CHECK\"", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "value=");
    }
}
