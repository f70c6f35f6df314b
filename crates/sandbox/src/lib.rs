//! Container sandbox for tierbox.
//!
//! Every sandboxed invocation gets a fresh Docker container with hard memory,
//! CPU, pid, and scratch-space ceilings, no network unless enabled, all
//! capabilities dropped, and a read-only root filesystem. Files cross the
//! container boundary only through the tar archive protocol in [`archive`],
//! which rejects parent-traversal paths outright.

pub mod archive;
pub mod engine;

pub use engine::{
    parse_memory_limit, Bind, ContainerSandbox, ExecOutput, SandboxConfig, SandboxState,
};
