//! Execution-mode selection.

use tierbox_core::{ExecutionMode, ToolDescriptor};

/// Pick the isolation tier for one invocation.
///
/// Deterministic given its three inputs; no retries, no state. Container
/// runtime availability is probed once at service start and passed in.
pub fn select_mode(
    descriptor: &ToolDescriptor,
    force_sandbox: bool,
    runtime_available: bool,
) -> ExecutionMode {
    if force_sandbox || !descriptor.is_safe || descriptor.requires_sandbox {
        if runtime_available {
            return ExecutionMode::Sandboxed;
        }
        tracing::warn!(
            tool = %descriptor.name,
            "container runtime unavailable, degrading to restricted isolation"
        );
        return ExecutionMode::Restricted;
    }
    ExecutionMode::Direct
}
