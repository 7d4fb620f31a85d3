/// Conductor configuration
///
/// Loaded from TOML, then overridden from the environment.
use crate::errors::{ConfigError, ConfigResult};
use crate::tools::{default_bindings, AgentRole};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub const ORCHESTRATOR_URL_ENV: &str = "CONDUCTOR_ORCHESTRATOR_URL";
pub const REGISTRY_PATH_ENV: &str = "CONDUCTOR_REGISTRY_PATH";
pub const LOG_LEVEL_ENV: &str = "CONDUCTOR_LOG_LEVEL";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    pub orchestrator: OrchestratorConfig,
    pub watcher: WatcherConfig,
    pub registry: RegistryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    /// Per-role overrides of the default tool bindings
    pub roles: BTreeMap<String, Vec<String>>,
}

/// Where completion notifications are sent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Base URL of the orchestrator
    pub base_url: String,
    /// Path of the completion endpoint
    pub completion_path: String,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            base_url: "http://127.0.0.1:3000".to_string(),
            completion_path: "/api/tasks/complete".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl OrchestratorConfig {
    /// Full completion endpoint URL
    pub fn completion_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.completion_path
        )
    }
}

/// Completion watcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Output directory relative to each project's local path
    pub output_subdir: PathBuf,
    /// Create the output directory if it does not exist yet
    pub create_missing_dirs: bool,
    /// Quiet period before a changed artifact is reported
    pub debounce_ms: u64,
    /// Periodic reconciliation scan; disabled when unset
    pub reconcile_interval_secs: Option<u64>,
    pub retry: RetryConfig,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            output_subdir: PathBuf::from(".tasks/output"),
            create_missing_dirs: true,
            debounce_ms: 100,
            reconcile_interval_secs: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Notification retry settings. One attempt means no retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 1,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

/// Project registry snapshot location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub path: Option<PathBuf>,
}

/// Protocol server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Reject calls to tools outside the caller's role
    pub enforce_roles: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            enforce_roles: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl ConductorConfig {
    /// Default config file location, if one exists on disk.
    pub fn default_path() -> Option<PathBuf> {
        let home = dirs::home_dir().map(|h| h.join(".conductor/config.toml"));
        let local = PathBuf::from(".conductor/config.toml");
        home.into_iter().chain(Some(local)).find(|p| p.exists())
    }

    /// Load from the given file, the default location, or built-in defaults,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(p) => {
                info!("Loading config from {}", p.display());
                Self::from_file(&p)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override settings from `CONDUCTOR_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ORCHESTRATOR_URL_ENV) {
            self.orchestrator.base_url = url;
        }
        if let Ok(path) = std::env::var(REGISTRY_PATH_ENV) {
            self.registry.path = Some(PathBuf::from(path));
        }
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            self.logging.level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let url = &self.orchestrator.base_url;
        if url.is_empty() {
            return Err(ConfigError::Invalid(
                "orchestrator.base_url must not be empty".to_string(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "orchestrator.base_url must be http(s): {}",
                url
            )));
        }
        if !self.orchestrator.completion_path.starts_with('/') {
            return Err(ConfigError::Invalid(
                "orchestrator.completion_path must start with '/'".to_string(),
            ));
        }
        if self.orchestrator.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.watcher.output_subdir.is_absolute() {
            return Err(ConfigError::Invalid(
                "watcher.output_subdir must be relative to the project path".to_string(),
            ));
        }
        if self.watcher.reconcile_interval_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "watcher.reconcile_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.watcher.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "watcher.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        for role in self.roles.keys() {
            role.parse::<AgentRole>()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    /// Default bindings with any `[roles]` overrides applied.
    pub fn role_bindings(&self) -> ConfigResult<Vec<(AgentRole, Vec<String>)>> {
        let mut bindings = default_bindings();
        for (name, tools) in &self.roles {
            let role = name
                .parse::<AgentRole>()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            match bindings.iter_mut().find(|(r, _)| *r == role) {
                Some((_, existing)) => *existing = tools.clone(),
                None => bindings.push((role, tools.clone())),
            }
        }
        Ok(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ConductorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.watcher.retry.max_attempts, 1);
        assert!(config.server.enforce_roles);
    }

    #[test]
    fn test_completion_url_joins_cleanly() {
        let mut config = OrchestratorConfig::default();
        config.base_url = "http://localhost:3000/".to_string();
        assert_eq!(
            config.completion_url(),
            "http://localhost:3000/api/tasks/complete"
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ConductorConfig::from_toml(
            r#"
            [orchestrator]
            base_url = "https://orch.internal"

            [watcher]
            reconcile_interval_secs = 30

            [roles]
            devops = ["files.read"]
            "#,
        )
        .unwrap();

        assert_eq!(config.orchestrator.base_url, "https://orch.internal");
        assert_eq!(config.orchestrator.completion_path, "/api/tasks/complete");
        assert_eq!(config.watcher.reconcile_interval_secs, Some(30));
        assert_eq!(config.watcher.output_subdir, PathBuf::from(".tasks/output"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ConductorConfig::default();
        config.orchestrator.base_url = "ftp://nope".to_string();
        assert!(config.validate().is_err());

        let mut config = ConductorConfig::default();
        config.watcher.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ConductorConfig::default();
        config.watcher.output_subdir = PathBuf::from("/abs/out");
        assert!(config.validate().is_err());

        let mut config = ConductorConfig::default();
        config.roles.insert("janitor".to_string(), vec![]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_role_overrides_replace_defaults() {
        let mut config = ConductorConfig::default();
        config
            .roles
            .insert("qa".to_string(), vec!["files.read".to_string()]);

        let bindings = config.role_bindings().unwrap();
        let qa = bindings
            .iter()
            .find(|(r, _)| *r == AgentRole::Qa)
            .map(|(_, t)| t.clone())
            .unwrap();
        assert_eq!(qa, vec!["files.read".to_string()]);
        assert_eq!(bindings.len(), AgentRole::ALL.len());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        assert!(matches!(
            ConductorConfig::from_toml("[orchestrator\nbase_url ="),
            Err(ConfigError::Parse(_))
        ));
    }
}
