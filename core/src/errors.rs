/// Error types for the Conductor tool broker.
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or querying the tool catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Error type returned by a tool's executor.
///
/// These never cross the protocol boundary as faults; the catalog folds
/// them into a [`crate::tools::ToolOutcome::Failure`].
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Execution(String),
}

/// Result type for tool execution.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors from the role capability map.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoleMapError {
    #[error("Role '{role}' references unknown tool '{tool}'")]
    UnknownToolReference { role: String, tool: String },

    #[error("Unknown agent role: {0}")]
    UnknownRole(String),

    #[error("Tool '{tool}' is not allowed for role '{role}'")]
    ToolNotAllowed { tool: String, role: String },
}

/// Errors from the sandboxed file service.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Project root is not configured (set {0})")]
    MissingRoot(&'static str),

    #[error("Project root must be an absolute path: {0}")]
    RelativeRoot(PathBuf),

    #[error("Project root does not exist or is not a directory: {0}")]
    RootNotFound(PathBuf),

    #[error("Path escapes the project root: {0}")]
    PathEscape(String),

    #[error("Path cannot be resolved inside the project root: {0}")]
    Unresolvable(String),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced while decoding a protocol request.
///
/// Each variant maps onto a JSON-RPC 2.0 error code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),
}

impl ProtocolError {
    /// Get the JSON-RPC error code for this error
    pub fn code(&self) -> i64 {
        match self {
            ProtocolError::Parse(_) => -32700,
            ProtocolError::InvalidRequest(_) => -32600,
            ProtocolError::MethodNotFound(_) => -32601,
            ProtocolError::InvalidParams(_) => -32602,
        }
    }
}
