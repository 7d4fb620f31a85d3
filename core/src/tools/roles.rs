//! Role capability map.
//!
//! Decides which catalog tools an agent in a given role may invoke and
//! renders the matching tool reminder for the agent's system prompt.

use super::catalog::ToolCatalog;
use crate::errors::RoleMapError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Fallback text for tools without a catalog entry.
pub const NO_DESCRIPTION: &str = "No description available";

/// The fixed set of agent roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    ProjectManager,
    Research,
    Architecture,
    UiUx,
    Frontend,
    Backend,
    Devops,
    Qa,
}

impl AgentRole {
    pub const ALL: [AgentRole; 8] = [
        AgentRole::ProjectManager,
        AgentRole::Research,
        AgentRole::Architecture,
        AgentRole::UiUx,
        AgentRole::Frontend,
        AgentRole::Backend,
        AgentRole::Devops,
        AgentRole::Qa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::ProjectManager => "project_manager",
            AgentRole::Research => "research",
            AgentRole::Architecture => "architecture",
            AgentRole::UiUx => "ui_ux",
            AgentRole::Frontend => "frontend",
            AgentRole::Backend => "backend",
            AgentRole::Devops => "devops",
            AgentRole::Qa => "qa",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = RoleMapError;

    /// Accepts `project_manager`, `project-manager`, `ProjectManager` and so on.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "projectmanager" | "pm" => Ok(AgentRole::ProjectManager),
            "research" | "researcher" => Ok(AgentRole::Research),
            "architecture" | "architect" => Ok(AgentRole::Architecture),
            "uiux" => Ok(AgentRole::UiUx),
            "frontend" => Ok(AgentRole::Frontend),
            "backend" => Ok(AgentRole::Backend),
            "devops" => Ok(AgentRole::Devops),
            "qa" => Ok(AgentRole::Qa),
            _ => Err(RoleMapError::UnknownRole(s.to_string())),
        }
    }
}

/// Default tool bindings for the built-in file tools.
pub fn default_bindings() -> Vec<(AgentRole, Vec<String>)> {
    let read_only = ["files.read", "files.list", "files.search"];
    let explore = ["files.read", "files.list", "files.outline", "files.search"];
    let implement = [
        "files.read",
        "files.list",
        "files.outline",
        "files.search",
        "files.write",
    ];
    let author = ["files.read", "files.list", "files.write"];

    let owned = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    vec![
        (AgentRole::ProjectManager, owned(&read_only)),
        (AgentRole::Research, owned(&explore)),
        (AgentRole::Architecture, owned(&implement)),
        (AgentRole::UiUx, owned(&author)),
        (AgentRole::Frontend, owned(&implement)),
        (AgentRole::Backend, owned(&implement)),
        (AgentRole::Devops, owned(&author)),
        (AgentRole::Qa, owned(&explore)),
    ]
}

/// Role -> ordered tool names, verified against the catalog at construction.
#[derive(Debug, Clone)]
pub struct RoleCapabilityMap {
    bindings: HashMap<AgentRole, Vec<String>>,
    descriptions: HashMap<String, String>,
}

impl RoleCapabilityMap {
    /// Build the map, failing fast on any binding that names a tool the
    /// catalog does not have.
    pub fn new<I>(catalog: &ToolCatalog, bindings: I) -> Result<Self, RoleMapError>
    where
        I: IntoIterator<Item = (AgentRole, Vec<String>)>,
    {
        let mut map = HashMap::new();
        for (role, tools) in bindings {
            if let Some(missing) = tools.iter().find(|t| !catalog.contains(t)) {
                return Err(RoleMapError::UnknownToolReference {
                    role: role.to_string(),
                    tool: missing.clone(),
                });
            }
            debug!(%role, count = tools.len(), "Bound role tools");
            map.insert(role, tools);
        }

        let descriptions = catalog
            .list()
            .iter()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect();

        Ok(Self {
            bindings: map,
            descriptions,
        })
    }

    /// Build the map from [`default_bindings`].
    pub fn with_defaults(catalog: &ToolCatalog) -> Result<Self, RoleMapError> {
        Self::new(catalog, default_bindings())
    }

    /// Tools bound to a role, in presentation order.
    pub fn tools_for(&self, role: AgentRole) -> &[String] {
        self.bindings.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Lenient lookup by role name: unknown roles have no tools.
    pub fn tools_for_role(&self, role: &str) -> &[String] {
        match role.parse::<AgentRole>() {
            Ok(role) => self.tools_for(role),
            Err(_) => &[],
        }
    }

    /// Advisory description for prompt text; never fails.
    pub fn describe_tool(&self, name: &str) -> &str {
        self.descriptions
            .get(name)
            .map(String::as_str)
            .unwrap_or(NO_DESCRIPTION)
    }

    pub fn is_allowed(&self, role: AgentRole, tool: &str) -> bool {
        self.tools_for(role).iter().any(|t| t == tool)
    }

    /// Render the tool reminder for a role's system prompt.
    ///
    /// Empty when the role has no tools so callers can always append it.
    pub fn build_reminder(&self, role: &str) -> String {
        let tools = self.tools_for_role(role);
        if tools.is_empty() {
            return String::new();
        }

        let mut reminder = format!("\n\nAvailable tools for the {} role:\n", role);
        for tool in tools {
            reminder.push_str(&format!("- {}: {}\n", tool, self.describe_tool(tool)));
        }
        reminder.push_str("Only call the tools listed above.\n");
        reminder
    }
}
