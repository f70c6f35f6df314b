//! Core types for the tierbox execution subsystem.
//!
//! This crate defines the shared contracts consumed by the sandbox engine and
//! the orchestrator: the error taxonomy, the tool descriptor / execution
//! result data model, and the `Tool` / `ToolRegistry` traits.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{StaticToolRegistry, Tool, ToolRegistry};
pub use types::{
    ExecutionContext, ExecutionMode, ExecutionResult, ToolCategory, ToolDescriptor,
};
