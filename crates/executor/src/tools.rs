//! Built-in code execution tool.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use tierbox_core::{Error, ExecutionResult, Result, Tool, ToolCategory, ToolDescriptor};

use crate::restricted::RestrictedExecutor;
use crate::subprocess::SubprocessExecutor;

/// Registry name of the code execution tool. The orchestrator special-cases
/// this name when staging container entrypoints.
pub const CODE_TOOL_NAME: &str = "run_code";

/// Executes caller-supplied source code.
///
/// The primary scripting language runs through the in-process restricted
/// interpreter; other supported languages fall through to the subprocess
/// tier. Callers wanting container isolation pass `force_sandbox` to the
/// orchestrator instead.
pub struct RunCodeTool {
    descriptor: ToolDescriptor,
    restricted: Arc<RestrictedExecutor>,
    subprocess: SubprocessExecutor,
    timeout: Duration,
}

impl RunCodeTool {
    pub fn new(output_cap: usize, timeout: Duration) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: CODE_TOOL_NAME.to_string(),
                description: "Execute a source code snippet and capture its output".to_string(),
                category: ToolCategory::Development,
                is_safe: true,
                requires_sandbox: false,
            },
            restricted: Arc::new(RestrictedExecutor::new(output_cap)),
            subprocess: SubprocessExecutor::new(output_cap),
            timeout,
        }
    }
}

#[async_trait]
impl Tool for RunCodeTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ExecutionResult> {
        let code = params
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::validation("missing 'code' parameter"))?
            .to_string();
        let language = params
            .get("language")
            .and_then(|v| v.as_str())
            .unwrap_or("python")
            .to_string();

        match language.to_ascii_lowercase().as_str() {
            "python" | "python3" => {
                let executor = Arc::clone(&self.restricted);
                let timeout = self.timeout;
                let output =
                    tokio::task::spawn_blocking(move || executor.execute(&code, timeout))
                        .await
                        .map_err(|e| Error::internal(format!("code task failed: {}", e)))??;
                if output.success() {
                    Ok(ExecutionResult::ok(output.stdout))
                } else {
                    Ok(ExecutionResult::fail(output.stderr))
                }
            }
            _ => {
                let output = self.subprocess.execute(&language, &code, self.timeout).await?;
                let result = if output.success() {
                    ExecutionResult::ok(output.stdout)
                } else {
                    ExecutionResult::fail(if output.stderr.is_empty() {
                        format!("exited with status {}", output.exit_code)
                    } else {
                        output.stderr.clone()
                    })
                };
                Ok(result.with_meta("exit_code", output.exit_code))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> RunCodeTool {
        RunCodeTool::new(10_000, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_python_snippet_runs_in_process() {
        let result = tool()
            .execute(serde_json::json!({"code": "print(2+2)"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.result, "4\n");
    }

    #[tokio::test]
    async fn test_denylisted_python_is_security_error() {
        let err = tool()
            .execute(serde_json::json!({"code": "import os\nprint(os.getcwd())"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Security(_)));
    }

    #[tokio::test]
    async fn test_shell_snippet_runs_in_subprocess() {
        let result = tool()
            .execute(serde_json::json!({"code": "echo hi", "language": "sh"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.result.trim(), "hi");
        assert_eq!(result.metadata["exit_code"], 0);
    }

    #[tokio::test]
    async fn test_missing_code_parameter() {
        let err = tool()
            .execute(serde_json::json!({"language": "python"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
