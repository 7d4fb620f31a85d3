pub mod check;
pub mod reminder;
pub mod serve;
pub mod tools;

use anyhow::Result;
use conductor_core::{build_registry, ConductorConfig, FileService, RoleCapabilityMap, ToolCatalog};
use std::sync::Arc;

/// Catalog and role map for commands that only describe tools.
///
/// These never touch project files, so the working directory stands in when
/// no project root is configured.
pub(crate) fn describe_registry(
    config: &ConductorConfig,
) -> Result<(Arc<ToolCatalog>, Arc<RoleCapabilityMap>)> {
    let files = match FileService::from_env() {
        Ok(files) => files,
        Err(_) => FileService::new(std::env::current_dir()?)?,
    };
    build_registry(config, Arc::new(files))
}
