//! Conductor core: tool catalog, role capability map and the stdio protocol
//! server that lets role-scoped agents list and call their tools.
pub mod config;
pub mod errors;
pub mod logging;
pub mod protocol;
pub mod tools;

pub use config::{ConductorConfig, LoggingConfig, OrchestratorConfig, RetryConfig, WatcherConfig};
pub use errors::{
    CatalogError, CatalogResult, ConfigError, ConfigResult, ProtocolError, RoleMapError,
    SandboxError, ToolError, ToolResult,
};
pub use protocol::{CallToolResult, ProtocolServer};
pub use tools::{
    register_file_tools, AgentRole, FileService, RoleCapabilityMap, ToolCatalog, ToolDescriptor,
    ToolOutcome, ToolSummary,
};

use std::sync::Arc;

/// Catalog with the built-in file tools plus the role map configured for it.
///
/// Verifies every role binding against the catalog; fails on the first
/// dangling reference.
pub fn build_registry(
    config: &ConductorConfig,
    files: Arc<FileService>,
) -> anyhow::Result<(Arc<ToolCatalog>, Arc<RoleCapabilityMap>)> {
    let mut catalog = ToolCatalog::new();
    register_file_tools(&mut catalog, files)?;
    let roles = RoleCapabilityMap::new(&catalog, config.role_bindings()?)?;
    Ok((Arc::new(catalog), Arc::new(roles)))
}

/// Conductor version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
