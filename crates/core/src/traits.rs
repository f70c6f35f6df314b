//! Core traits for tierbox.
//!
//! The flattened tool contract: every tool implements `execute` against plain
//! JSON parameters and advertises a static descriptor. The registry is a
//! narrow name → descriptor lookup owned by the embedding application.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{ExecutionResult, ToolDescriptor};

/// Tool interface for atomic operations.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static descriptor: name, category, safety flags.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Execute the tool with the given parameters.
    async fn execute(&self, params: serde_json::Value) -> Result<ExecutionResult>;
}

/// Tool registry consumed by the orchestrator.
pub trait ToolRegistry: Send + Sync {
    /// Look up a tool by name.
    fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>>;

    /// List all registered descriptors.
    fn list(&self) -> Vec<ToolDescriptor>;
}

/// HashMap-backed registry, sufficient for wiring and tests.
#[derive(Default)]
pub struct StaticToolRegistry {
    tools: std::collections::HashMap<String, Arc<dyn Tool>>,
}

impl StaticToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its descriptor name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools
            .insert(tool.descriptor().name.clone(), tool);
    }
}

impl ToolRegistry for StaticToolRegistry {
    fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor().clone()).collect()
    }
}
