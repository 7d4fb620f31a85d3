//! Tool catalog: name -> descriptor, in registration order.

use super::descriptor::{ToolDescriptor, ToolOutcome, ToolSummary};
use crate::errors::{CatalogError, CatalogResult};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

/// Registry of every tool the broker can run.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names are globally unique.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> CatalogResult<()> {
        if self.index.contains_key(descriptor.name()) {
            return Err(CatalogError::DuplicateTool(descriptor.name().to_string()));
        }
        debug!(tool = descriptor.name(), "Registered tool");
        self.index
            .insert(descriptor.name().to_string(), self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All descriptors in insertion order.
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn summaries(&self) -> Vec<ToolSummary> {
        self.tools.iter().map(ToolDescriptor::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up and run a tool.
    ///
    /// An unknown name is a validation error returned to the caller. Anything
    /// that goes wrong inside the tool, including a panic, becomes
    /// [`ToolOutcome::Failure`].
    pub async fn execute(&self, name: &str, arguments: &Value) -> CatalogResult<ToolOutcome> {
        let tool = self
            .get(name)
            .ok_or_else(|| CatalogError::UnknownTool(name.to_string()))?;

        let call = AssertUnwindSafe(tool.executor().execute(arguments)).catch_unwind();
        let outcome = match call.await {
            Ok(Ok(value)) => ToolOutcome::Success(value),
            Ok(Err(e)) => {
                warn!(tool = name, error = %e, "Tool execution failed");
                ToolOutcome::Failure(e.to_string())
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                warn!(tool = name, %message, "Tool panicked");
                ToolOutcome::Failure(message)
            }
        };
        Ok(outcome)
    }
}
