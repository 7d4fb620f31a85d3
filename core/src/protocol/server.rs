//! Stdio protocol server: newline-delimited JSON-RPC 2.0.
//!
//! Methods: `initialize`, `ping`, `tools/list`, `tools/call`. Notifications
//! get no reply. Logging goes to stderr; stdout carries protocol messages only.

use super::messages::{error_response, success_response, CallToolResult, RpcRequest};
use crate::errors::{CatalogError, ProtocolError, RoleMapError};
use crate::tools::{
    AgentRole, RoleCapabilityMap, ToolCatalog, ToolInvocation, ToolOutcome, ToolSummary,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "conductor";

/// Exposes the tool catalog to an agent process.
///
/// A server bound to a role lists and runs only that role's tools unless
/// enforcement is switched off. An unbound server exposes the whole catalog.
#[derive(Clone)]
pub struct ProtocolServer {
    catalog: Arc<ToolCatalog>,
    roles: Arc<RoleCapabilityMap>,
    role: Option<AgentRole>,
    enforce_roles: bool,
}

impl ProtocolServer {
    pub fn new(catalog: Arc<ToolCatalog>, roles: Arc<RoleCapabilityMap>) -> Self {
        Self {
            catalog,
            roles,
            role: None,
            enforce_roles: true,
        }
    }

    /// Bind the server to an agent role.
    pub fn for_role(mut self, role: AgentRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_roles = enforce;
        self
    }

    pub fn role(&self) -> Option<AgentRole> {
        self.role
    }

    fn enforced_role(&self) -> Option<AgentRole> {
        self.role.filter(|_| self.enforce_roles)
    }

    /// `{name, description, inputSchema}` for every visible tool.
    pub fn list_tools(&self) -> Vec<ToolSummary> {
        match self.enforced_role() {
            Some(role) => self
                .roles
                .tools_for(role)
                .iter()
                .filter_map(|name| self.catalog.get(name))
                .map(|t| t.summary())
                .collect(),
            None => self.catalog.summaries(),
        }
    }

    /// Run one tool call. Always yields a well-formed result.
    pub async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> CallToolResult {
        if !self.catalog.contains(name) {
            let err = CatalogError::UnknownTool(name.to_string());
            warn!(tool = name, "Call to unknown tool");
            return CallToolResult::failure(err.to_string());
        }

        if let Some(role) = self.enforced_role() {
            if !self.roles.is_allowed(role, name) {
                let err = RoleMapError::ToolNotAllowed {
                    tool: name.to_string(),
                    role: role.to_string(),
                };
                warn!(tool = name, %role, "Rejected tool call outside role");
                return CallToolResult::failure(err.to_string());
            }
        }

        let args = Value::Object(arguments.clone());
        let outcome = match self.catalog.execute(name, &args).await {
            Ok(outcome) => outcome,
            Err(e) => ToolOutcome::Failure(e.to_string()),
        };

        let invocation = ToolInvocation {
            tool_name: name.to_string(),
            arguments,
            result: outcome,
        };
        debug!(
            tool = %invocation.tool_name,
            args = invocation.arguments.len(),
            failed = invocation.result.is_failure(),
            "Tool call finished"
        );

        match &invocation.result {
            ToolOutcome::Success(value) => CallToolResult::success(value),
            ToolOutcome::Failure(message) => CallToolResult::failure(message.clone()),
        }
    }

    /// Handle one request line. Returns `None` for notifications.
    pub async fn handle_message(&self, line: &str) -> Option<Value> {
        let request = match RpcRequest::parse(line) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Rejected malformed request");
                return Some(error_response(Value::Null, &e));
            }
        };

        if request.is_notification() {
            debug!(method = %request.method, "Received notification");
            return None;
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        match self.dispatch(&request).await {
            Ok(result) => Some(success_response(id, result)),
            Err(e) => Some(error_response(id, &e)),
        }
    }

    async fn dispatch(&self, request: &RpcRequest) -> Result<Value, ProtocolError> {
        match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.list_tools() })),
            "tools/call" => {
                let (name, arguments) = parse_call_params(request.params.as_ref())?;
                let result = self.call_tool(&name, arguments).await;
                serde_json::to_value(result)
                    .map_err(|e| ProtocolError::InvalidParams(e.to_string()))
            }
            other => Err(ProtocolError::MethodNotFound(other.to_string())),
        }
    }

    /// Serve requests from `reader` until EOF, writing one response per line.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(response) = self.handle_message(line).await {
                let mut bytes = serde_json::to_vec(&response)?;
                bytes.push(b'\n');
                writer.write_all(&bytes).await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }

    /// Serve over process stdin/stdout.
    pub async fn run_stdio(&self) -> std::io::Result<()> {
        info!(
            role = self.role.map(|r| r.as_str()).unwrap_or("any"),
            tools = self.list_tools().len(),
            "Protocol server listening on stdio"
        );
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await?;
        info!("Protocol server stopped (stdin closed)");
        Ok(())
    }
}

fn parse_call_params(
    params: Option<&Value>,
) -> Result<(String, Map<String, Value>), ProtocolError> {
    let params = params
        .and_then(Value::as_object)
        .ok_or_else(|| ProtocolError::InvalidParams("expected an object with 'name'".to_string()))?;

    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::InvalidParams("missing tool name".to_string()))?
        .to_string();

    let arguments = match params.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(ProtocolError::InvalidParams(
                "'arguments' must be an object".to_string(),
            ))
        }
    };

    Ok((name, arguments))
}
