//! Tiered execution for untrusted tool payloads.
//!
//! Three isolation tiers, selected per invocation from the tool descriptor:
//! direct in-process dispatch for trusted tools, a restricted in-process
//! interpreter when no container runtime is reachable, and a fresh hardened
//! container per invocation for everything unsafe. [`ToolExecutorService`]
//! is the entry point.

pub mod restricted;
pub mod selector;
pub mod service;
pub mod subprocess;
pub mod tools;

pub use restricted::{DenySet, RestrictedExecutor, RestrictedOutput};
pub use selector::select_mode;
pub use service::{ActiveExecution, ToolExecutorService};
pub use subprocess::{SubprocessExecutor, SubprocessOutput};
pub use tools::{RunCodeTool, CODE_TOOL_NAME};
