//! Tool descriptors and the executor contract.

use crate::errors::ToolResult;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Executes a single tool call.
///
/// Implementations may perform arbitrary I/O. Failures are returned as
/// [`crate::errors::ToolError`] and normalised by the catalog.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, arguments: &Value) -> ToolResult<Value>;
}

/// Adapter turning an async closure into a [`ToolExecutor`].
pub struct FnExecutor<F>(F);

#[async_trait]
impl<F, Fut> ToolExecutor for FnExecutor<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn execute(&self, arguments: &Value) -> ToolResult<Value> {
        (self.0)(arguments.clone()).await
    }
}

/// A registered tool: name, description, input schema and executor.
///
/// Descriptors are immutable once built; the catalog hands out shared
/// references only.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    input_schema: Value,
    executor: Arc<dyn ToolExecutor>,
}

impl ToolDescriptor {
    /// Create a descriptor from an executor implementation.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            executor,
        }
    }

    /// Create a descriptor from an async closure.
    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        f: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        Self::new(name, description, input_schema, Arc::new(FnExecutor(f)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    pub(crate) fn executor(&self) -> &Arc<dyn ToolExecutor> {
        &self.executor
    }

    /// The listing form exposed by the protocol server.
    pub fn summary(&self) -> ToolSummary {
        ToolSummary {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

/// `{name, description, inputSchema}` as returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Builder for object-shaped JSON input schemas.
#[derive(Debug, Default, Clone)]
pub struct SchemaBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required property.
    pub fn required(mut self, name: &str, kind: &str, description: &str) -> Self {
        self.required.push(name.to_string());
        self.property(name, kind, description)
    }

    /// Add an optional property.
    pub fn optional(self, name: &str, kind: &str, description: &str) -> Self {
        self.property(name, kind, description)
    }

    fn property(mut self, name: &str, kind: &str, description: &str) -> Self {
        self.properties.insert(
            name.to_string(),
            json!({ "type": kind, "description": description }),
        );
        self
    }

    pub fn build(self) -> Value {
        json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// Outcome of one tool call after normalisation at the catalog boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(Value),
    Failure(String),
}

impl ToolOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ToolOutcome::Failure(_))
    }
}

/// One tool call: the requested name, its arguments and the outcome.
///
/// Lives only for the duration of a single request.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub result: ToolOutcome,
}
