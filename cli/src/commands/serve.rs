use anyhow::{Context, Result};
use conductor_core::tools::files::PROJECT_ROOT_ENV;
use conductor_core::{build_registry, AgentRole, ConductorConfig, FileService, ProtocolServer};
use std::sync::Arc;
use tracing::info;

/// Run the stdio protocol server until stdin closes.
pub async fn execute(config: &ConductorConfig, role: Option<&str>) -> Result<()> {
    let files = FileService::from_env()
        .with_context(|| format!("cannot serve file tools without {}", PROJECT_ROOT_ENV))?;
    info!("Sandbox root: {}", files.root().display());

    let (catalog, roles) = build_registry(config, Arc::new(files))?;
    let mut server =
        ProtocolServer::new(catalog, roles).with_enforcement(config.server.enforce_roles);

    if let Some(name) = role {
        let role: AgentRole = name.parse()?;
        server = server.for_role(role);
    }

    server.run_stdio().await?;
    Ok(())
}
