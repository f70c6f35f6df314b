//! Tool executor service.
//!
//! The orchestration layer above the tiers: looks up the tool, selects the
//! isolation mode, builds a fresh execution context, dispatches to the tier
//! handler, stamps metadata, and guarantees per-execution cleanup. Every
//! failure resolves to a returned `ExecutionResult`, never a crash or an
//! escaped error.

use bollard::container::{KillContainerOptions, RemoveContainerOptions};
use bollard::Docker;
use dashmap::DashMap;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tierbox_core::{
    Error, ExecutionContext, ExecutionMode, ExecutionResult, Result, Tool, ToolDescriptor,
    ToolRegistry,
};
use tierbox_sandbox::{Bind, ContainerSandbox, SandboxConfig};

use crate::restricted::RestrictedExecutor;
use crate::selector::select_mode;
use crate::subprocess::SubprocessExecutor;
use crate::tools::CODE_TOOL_NAME;

/// Default wall clock for the restricted tier.
const RESTRICTED_TIMEOUT: Duration = Duration::from_secs(30);

/// Default captured-output cap in characters.
const OUTPUT_CAP: usize = 100_000;

/// Registry row for one in-flight sandboxed execution.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveExecution {
    pub execution_id: String,
    pub container_id: String,
    pub status: String,
    pub created: u64,
}

/// Orchestrator for tiered tool execution.
///
/// Owns its active-execution registry as a plain field; independent service
/// instances (e.g. under test) get independent registries.
pub struct ToolExecutorService {
    registry: Arc<dyn ToolRegistry>,
    docker: Option<Docker>,
    runtime_available: bool,
    active: DashMap<String, ActiveExecution>,
    restricted: Arc<RestrictedExecutor>,
}

impl ToolExecutorService {
    /// Construct with a one-time container-runtime availability probe.
    pub async fn new(registry: Arc<dyn ToolRegistry>) -> Self {
        let docker = Docker::connect_with_local_defaults().ok();
        let runtime_available = match &docker {
            Some(d) => d.ping().await.is_ok(),
            None => false,
        };
        if !runtime_available {
            tracing::warn!("container runtime unavailable, sandboxed tier degraded");
        }
        Self::with_runtime(registry, docker, runtime_available)
    }

    /// Construct with an explicit runtime handle and availability flag.
    pub fn with_runtime(
        registry: Arc<dyn ToolRegistry>,
        docker: Option<Docker>,
        runtime_available: bool,
    ) -> Self {
        Self {
            registry,
            docker,
            runtime_available,
            active: DashMap::new(),
            restricted: Arc::new(RestrictedExecutor::new(OUTPUT_CAP)),
        }
    }

    pub fn runtime_available(&self) -> bool {
        self.runtime_available
    }

    // =========================================================================
    // Execution API
    // =========================================================================

    /// Execute a named tool under the isolation tier its descriptor calls for.
    pub async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
        force_sandbox: bool,
        sandbox_config: Option<SandboxConfig>,
    ) -> ExecutionResult {
        let Some(tool) = self.registry.get_tool(tool_name) else {
            return ExecutionResult::fail(Error::tool_not_found(tool_name).to_string());
        };
        let descriptor = tool.descriptor().clone();
        let mode = select_mode(&descriptor, force_sandbox, self.runtime_available);
        let mut ctx = ExecutionContext::new(tool_name, parameters, mode);

        tracing::info!(
            execution_id = %ctx.execution_id,
            tool = %tool_name,
            mode = %mode,
            "starting execution"
        );

        let outcome = match mode {
            ExecutionMode::Direct => self.run_direct(tool.as_ref(), &ctx).await,
            ExecutionMode::Restricted => {
                let output_cap = sandbox_config.as_ref().map(|c| c.output_cap_chars);
                self.run_restricted(tool.as_ref(), &ctx, output_cap).await
            }
            ExecutionMode::Sandboxed => {
                self.run_sandboxed(&descriptor, &mut ctx, sandbox_config).await
            }
        };
        // per-execution cleanup: the registry row never outlives the call
        self.active.remove(&ctx.execution_id);

        let mut result = match outcome {
            Ok(result) => result,
            Err(e) => ExecutionResult::fail(e.to_string()),
        };
        result = result
            .with_meta("execution_id", ctx.execution_id.clone())
            .with_meta("mode", mode.to_string())
            .with_meta("elapsed_ms", ctx.elapsed_ms());

        tracing::info!(
            execution_id = %ctx.execution_id,
            success = result.success,
            elapsed_ms = ctx.elapsed_ms(),
            "execution finished"
        );
        result
    }

    async fn run_direct(&self, tool: &dyn Tool, ctx: &ExecutionContext) -> Result<ExecutionResult> {
        tool.execute(ctx.parameters.clone()).await
    }

    /// Restricted tier: the code tool's primary-language payloads run in the
    /// in-process interpreter; other supported languages fall through to the
    /// subprocess executor. Any other tool falls back to direct dispatch with
    /// a degradation warning, since no stronger isolation exists without a
    /// container runtime.
    async fn run_restricted(
        &self,
        tool: &dyn Tool,
        ctx: &ExecutionContext,
        output_cap: Option<usize>,
    ) -> Result<ExecutionResult> {
        if ctx.tool_name != CODE_TOOL_NAME {
            tracing::warn!(
                tool = %ctx.tool_name,
                "no restricted runtime for tool, dispatching directly with degraded isolation"
            );
            return self.run_direct(tool, ctx).await;
        }

        let code = ctx
            .parameters
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::validation("missing 'code' parameter"))?
            .to_string();
        let language = ctx
            .parameters
            .get("language")
            .and_then(|v| v.as_str())
            .unwrap_or("python")
            .to_string();
        let cap = output_cap.unwrap_or(OUTPUT_CAP);

        match language.to_ascii_lowercase().as_str() {
            "python" | "python3" => {
                let executor = Arc::clone(&self.restricted);
                let output = tokio::task::spawn_blocking(move || {
                    executor.execute_with_cap(&code, RESTRICTED_TIMEOUT, cap)
                })
                .await
                .map_err(|e| Error::internal(format!("restricted task failed: {}", e)))??;

                if output.success() {
                    Ok(ExecutionResult::ok(output.stdout))
                } else {
                    Ok(ExecutionResult::fail(output.stderr))
                }
            }
            _ => {
                let output = SubprocessExecutor::new(cap)
                    .execute(&language, &code, RESTRICTED_TIMEOUT)
                    .await?;
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

    async fn run_sandboxed(
        &self,
        descriptor: &ToolDescriptor,
        ctx: &mut ExecutionContext,
        sandbox_config: Option<SandboxConfig>,
    ) -> Result<ExecutionResult> {
        let docker = self
            .docker
            .clone()
            .ok_or_else(|| Error::sandbox("container runtime unavailable"))?;

        // private scratch workspace, removed on drop; the container's
        // non-root user needs to read the entrypoint and write outputs
        let scratch = tempfile::Builder::new().prefix("tierbox-work-").tempdir()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(scratch.path(), std::fs::Permissions::from_mode(0o777))?;
        }

        let mut config =
            sandbox_config.unwrap_or_else(|| SandboxConfig::for_category(descriptor.category));
        let entry_cmd = stage_entrypoint(descriptor, &ctx.parameters, scratch.path(), &config.workdir)?;
        config
            .binds
            .push(Bind::read_write(scratch.path(), config.workdir.clone()));
        let timeout = config.timeout;

        let mut sandbox = ContainerSandbox::new(docker, config);
        // a failed create cleans up after itself before the error propagates
        sandbox.create().await?;

        let container_id = sandbox
            .container_id()
            .unwrap_or_default()
            .to_string();
        ctx.container_id = Some(container_id.clone());
        self.active.insert(
            ctx.execution_id.clone(),
            ActiveExecution {
                execution_id: ctx.execution_id.clone(),
                container_id,
                status: "running".to_string(),
                created: ctx.created_at_ms,
            },
        );

        let run = sandbox.run_command(&entry_cmd, timeout).await;

        // cleanup always runs; its errors are logged, never override the
        // primary outcome
        let cleanup_errors = sandbox.cleanup().await;
        if !cleanup_errors.is_empty() {
            tracing::warn!(
                execution_id = %ctx.execution_id,
                errors = ?cleanup_errors,
                "sandbox cleanup reported errors"
            );
        }
        self.active.remove(&ctx.execution_id);

        let output = run?;
        let mut result = if output.success() {
            ExecutionResult::ok(classify_output(descriptor, &output.stdout))
        } else {
            ExecutionResult::fail(if output.stderr.is_empty() {
                format!("exited with status {}", output.exit_code)
            } else {
                output.stderr.clone()
            })
        };
        result = result.with_meta("exit_code", output.exit_code);
        Ok(result)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Snapshot of in-flight sandboxed executions. A row vanishing while the
    /// snapshot is taken means that execution already finished.
    pub fn list_active_executions(&self) -> Vec<ActiveExecution> {
        self.active.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Force-terminate a sandboxed execution. Returns false when the id is
    /// unknown or already finished.
    pub async fn kill_execution(&self, execution_id: &str) -> bool {
        let Some((_, entry)) = self.active.remove(execution_id) else {
            return false;
        };
        tracing::warn!(
            execution_id,
            container_id = %entry.container_id,
            "force-terminating execution"
        );
        if let Some(docker) = &self.docker {
            let _ = docker
                .kill_container(&entry.container_id, None::<KillContainerOptions<String>>)
                .await;
            let _ = docker
                .remove_container(
                    &entry.container_id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
        }
        true
    }
}

// =============================================================================
// Entrypoint staging
// =============================================================================

/// Write the entry-point artifact into the scratch workspace and return the
/// command that runs it inside the container.
///
/// The code tool's raw source is written directly; any other tool gets a
/// wrapper script that reconstructs the invocation from serialized parameters
/// and re-emits a serialized result envelope on stdout.
fn stage_entrypoint(
    descriptor: &ToolDescriptor,
    parameters: &serde_json::Value,
    scratch: &Path,
    workdir: &str,
) -> Result<String> {
    if descriptor.name == CODE_TOOL_NAME {
        let code = parameters
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::validation("missing 'code' parameter"))?;
        let language = parameters
            .get("language")
            .and_then(|v| v.as_str())
            .unwrap_or("python");
        let (command, extension) = match language.to_ascii_lowercase().as_str() {
            "python" | "python3" => ("python3", "py"),
            "javascript" | "node" | "nodejs" => ("node", "js"),
            "bash" | "sh" | "shell" => ("sh", "sh"),
            other => {
                return Err(Error::validation(format!(
                    "unsupported language '{}'",
                    other
                )))
            }
        };
        let name = format!("main.{}", extension);
        std::fs::write(scratch.join(&name), code)?;
        Ok(format!("{} {}/{}", command, workdir, name))
    } else {
        std::fs::write(scratch.join("params.json"), serde_json::to_vec(parameters)?)?;
        let wrapper = format!(
            r#"import json
import sys

sys.path.insert(0, "/opt/tools")

with open("{workdir}/params.json") as fh:
    params = json.load(fh)

module = __import__("{tool}")
try:
    result = module.run(params)
    print(json.dumps({{"success": True, "result": result}}))
except Exception as exc:
    print(json.dumps({{"success": False, "error": str(exc)}}))
    raise SystemExit(1)
"#,
            workdir = workdir,
            tool = descriptor.name,
        );
        std::fs::write(scratch.join("entry.py"), wrapper)?;
        Ok(format!("python3 {}/entry.py", workdir))
    }
}

/// The code tool's output is the raw captured text; other tools' output is
/// attempted as structured data first, falling back to raw text.
fn classify_output(descriptor: &ToolDescriptor, stdout: &str) -> String {
    if descriptor.name == CODE_TOOL_NAME {
        return stdout.to_string();
    }
    match serde_json::from_str::<serde_json::Value>(stdout.trim()) {
        Ok(value) => value.to_string(),
        Err(_) => stdout.to_string(),
    }
}
