//! Orchestrator integration tests.
//!
//! Container-free paths run everywhere; tests needing a reachable Docker
//! daemon are `#[ignore]`d and run with `cargo test -- --ignored`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use tierbox_core::{
    ExecutionResult, Result, Tool, ToolCategory, ToolDescriptor, StaticToolRegistry,
};
use tierbox_executor::{RunCodeTool, ToolExecutorService, CODE_TOOL_NAME};
use tierbox_sandbox::SandboxConfig;

struct EchoTool {
    descriptor: ToolDescriptor,
}

impl EchoTool {
    fn new(is_safe: bool) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "echo".to_string(),
                description: "Echo the message parameter back".to_string(),
                category: ToolCategory::Development,
                is_safe,
                requires_sandbox: false,
            },
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ExecutionResult> {
        let message = params
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(ExecutionResult::ok(message))
    }
}

fn registry() -> Arc<StaticToolRegistry> {
    let mut registry = StaticToolRegistry::new();
    registry.register(Arc::new(RunCodeTool::new(10_000, Duration::from_secs(10))));
    registry.register(Arc::new(EchoTool::new(true)));
    Arc::new(registry)
}

/// Service with no container runtime; unsafe work degrades to restricted.
fn offline_service() -> ToolExecutorService {
    ToolExecutorService::with_runtime(registry(), None, false)
}

#[tokio::test]
async fn test_safe_code_runs_direct() {
    let service = offline_service();
    let result = service
        .execute(CODE_TOOL_NAME, serde_json::json!({"code": "print(2+2)"}), false, None)
        .await;
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.result, "4\n");
    assert_eq!(result.metadata["mode"], "direct");
    assert!(result.metadata["execution_id"].as_str().is_some());
    assert!(result.metadata.contains_key("elapsed_ms"));
}

#[tokio::test]
async fn test_denylisted_import_fails_before_execution() {
    let service = offline_service();
    let result = service
        .execute(
            CODE_TOOL_NAME,
            serde_json::json!({"code": "import os\nprint(os.getcwd())"}),
            false,
            None,
        )
        .await;
    assert!(!result.success);
    let error = result.error.unwrap_or_default();
    assert!(error.contains("'os'"), "error was: {}", error);
}

#[tokio::test]
async fn test_force_sandbox_degrades_to_restricted_without_runtime() {
    let service = offline_service();
    let result = service
        .execute(CODE_TOOL_NAME, serde_json::json!({"code": "print(2+2)"}), true, None)
        .await;
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.result, "4\n");
    assert_eq!(result.metadata["mode"], "restricted");
}

#[tokio::test]
async fn test_restricted_tier_routes_other_languages_to_subprocess() {
    let service = offline_service();
    let result = service
        .execute(
            CODE_TOOL_NAME,
            serde_json::json!({"code": "echo hi", "language": "sh"}),
            true,
            None,
        )
        .await;
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.result.trim(), "hi");
    assert_eq!(result.metadata["mode"], "restricted");
    assert_eq!(result.metadata["exit_code"], 0);
}

#[tokio::test]
async fn test_restricted_tier_honors_output_cap_override() {
    let service = offline_service();
    let config = SandboxConfig {
        output_cap_chars: 20,
        ..SandboxConfig::default()
    };
    let result = service
        .execute(
            CODE_TOOL_NAME,
            serde_json::json!({"code": "print('aaaaaaaaaa' * 10)"}),
            true,
            Some(config),
        )
        .await;
    assert!(result.success, "error: {:?}", result.error);
    assert!(result.result.contains("(output truncated)"));
}

#[tokio::test]
async fn test_restricted_tier_falls_back_for_non_code_tools() {
    let service = offline_service();
    let result = service
        .execute("echo", serde_json::json!({"message": "hi"}), true, None)
        .await;
    assert!(result.success);
    assert_eq!(result.result, "hi");
    assert_eq!(result.metadata["mode"], "restricted");
}

#[tokio::test]
async fn test_unknown_tool_is_a_failed_result() {
    let service = offline_service();
    let result = service
        .execute("no_such_tool", serde_json::json!({}), false, None)
        .await;
    assert!(!result.success);
    assert!(result.error.unwrap_or_default().contains("Tool not found"));
}

#[tokio::test]
async fn test_concurrent_executions_get_distinct_ids() {
    let service = Arc::new(offline_service());
    let a = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .execute(CODE_TOOL_NAME, serde_json::json!({"code": "print(1)"}), false, None)
                .await
        })
    };
    let b = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .execute(CODE_TOOL_NAME, serde_json::json!({"code": "print(2)"}), false, None)
                .await
        })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(a.success && b.success);
    assert_ne!(a.metadata["execution_id"], b.metadata["execution_id"]);
}

#[tokio::test]
async fn test_registry_introspection_when_idle() {
    let service = offline_service();
    assert!(service.list_active_executions().is_empty());
    assert!(!service.kill_execution("not-an-id").await);
}

// =============================================================================
// Docker-dependent tests
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[tokio::test]
#[ignore = "requires a reachable Docker daemon"]
async fn test_sandboxed_code_execution() {
    init_tracing();
    let service = ToolExecutorService::new(registry()).await;
    assert!(service.runtime_available(), "daemon must be reachable");

    let result = service
        .execute(CODE_TOOL_NAME, serde_json::json!({"code": "print(2+2)"}), true, None)
        .await;
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.result.trim(), "4");
    assert_eq!(result.metadata["mode"], "sandboxed");
    assert_eq!(result.metadata["exit_code"], 0);
    // the container never outlives the call
    assert!(service.list_active_executions().is_empty());
}

#[tokio::test]
#[ignore = "requires a reachable Docker daemon"]
async fn test_sandboxed_timeout_tears_down_container() {
    init_tracing();
    let service = ToolExecutorService::new(registry()).await;
    let config = SandboxConfig {
        timeout: Duration::from_secs(2),
        ..SandboxConfig::default()
    };
    let result = service
        .execute(
            CODE_TOOL_NAME,
            serde_json::json!({"code": "import time\ntime.sleep(600)"}),
            true,
            Some(config),
        )
        .await;
    assert!(!result.success);
    assert!(result
        .error
        .unwrap_or_default()
        .to_lowercase()
        .contains("timeout"));
    assert!(service.list_active_executions().is_empty());
}

#[tokio::test]
#[ignore = "requires a reachable Docker daemon"]
async fn test_sandboxed_nonzero_exit_is_failure() {
    init_tracing();
    let service = ToolExecutorService::new(registry()).await;
    let result = service
        .execute(
            CODE_TOOL_NAME,
            serde_json::json!({"code": "raise SystemExit(7)"}),
            true,
            None,
        )
        .await;
    assert!(!result.success);
    assert_eq!(result.metadata["exit_code"], 7);
}
