//! Shared data model for the execution tiers.

use serde::{Deserialize, Serialize};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

// =============================================================================
// Tool Descriptor
// =============================================================================

/// Category a tool belongs to; selects the default sandbox resource profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Development,
    System,
    Analysis,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::System => write!(f, "system"),
            Self::Analysis => write!(f, "analysis"),
        }
    }
}

/// Static description of a registered tool.
///
/// Category and safety are plain data consumed by the mode selector; there is
/// no tool class hierarchy. Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Resource-profile category.
    pub category: ToolCategory,
    /// Whether the tool is safe to run without isolation.
    pub is_safe: bool,
    /// Whether the tool always requires container isolation.
    pub requires_sandbox: bool,
}

// =============================================================================
// Execution Mode
// =============================================================================

/// Isolation tier chosen for a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// No isolation; the tool runs in-process.
    Direct,
    /// Restricted in-process interpreter with a denylist pre-check.
    Restricted,
    /// Fresh container per invocation.
    Sandboxed,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Restricted => write!(f, "restricted"),
            Self::Sandboxed => write!(f, "sandboxed"),
        }
    }
}

// =============================================================================
// Execution Context
// =============================================================================

/// Per-invocation state. Created by the orchestrator, discarded after
/// cleanup; never shared across invocations. The resolved mode is immutable
/// for the lifetime of the context.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Name of the tool being executed.
    pub tool_name: String,
    /// Caller-supplied parameters.
    pub parameters: serde_json::Value,
    /// Resolved isolation tier.
    pub mode: ExecutionMode,
    /// Fresh unique id for this invocation.
    pub execution_id: String,
    /// Monotonic start instant, for elapsed-time metadata.
    pub started: Instant,
    /// Unix timestamp (ms) of creation, for introspection listings.
    pub created_at_ms: u64,
    /// Container id, once one has been allocated.
    pub container_id: Option<String>,
}

impl ExecutionContext {
    pub fn new(tool_name: impl Into<String>, parameters: serde_json::Value, mode: ExecutionMode) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
            mode,
            execution_id: uuid::Uuid::new_v4().to_string(),
            started: Instant::now(),
            created_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            container_id: None,
        }
    }

    /// Elapsed wall time since the context was created, in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

// =============================================================================
// Execution Result
// =============================================================================

/// Immutable value returned to the caller of `execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Result payload (truncated text).
    pub result: String,
    /// Error text when `success` is false.
    pub error: Option<String>,
    /// Execution metadata: execution id, mode, elapsed ms, exit status.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ExecutionResult {
    /// Create a successful result.
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: result.into(),
            error: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a failed result.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: String::new(),
            error: Some(error.into()),
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

// =============================================================================
// Output truncation
// =============================================================================

/// Marker appended when captured output exceeds its cap.
pub const TRUNCATION_MARKER: &str = "... (output truncated)";

/// Truncate `s` to at most `cap` characters, appending the truncation marker
/// when anything was cut.
pub fn truncate_output(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        return s.to_string();
    }
    let mut out: String = s.chars().take(cap).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_under_cap_is_identity() {
        assert_eq!(truncate_output("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_over_cap_appends_marker() {
        let out = truncate_output("abcdef", 3);
        assert_eq!(out, format!("abc{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncate_is_char_boundary_safe() {
        let out = truncate_output("héllo wörld", 4);
        assert!(out.starts_with("héll"));
    }

    #[test]
    fn test_execution_context_ids_are_unique() {
        let a = ExecutionContext::new("t", serde_json::json!({}), ExecutionMode::Direct);
        let b = ExecutionContext::new("t", serde_json::json!({}), ExecutionMode::Direct);
        assert_ne!(a.execution_id, b.execution_id);
    }

    #[test]
    fn test_result_constructors() {
        let ok = ExecutionResult::ok("4\n").with_meta("mode", "direct");
        assert!(ok.success);
        assert_eq!(ok.metadata["mode"], "direct");

        let fail = ExecutionResult::fail("boom");
        assert!(!fail.success);
        assert_eq!(fail.error.as_deref(), Some("boom"));
    }
}
