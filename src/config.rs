//! Configuration loading and management.
//!
//! Loads configuration from the embedded config.toml, merges an optional user
//! file on top, then applies environment variable overrides.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Embedded configuration file content.
const CONFIG_TOML: &str = include_str!("../config.toml");

/// User configuration file name inside the platform config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub docker: DockerConfig,
    pub container: ContainerConfig,
    pub smoke: SmokeConfig,
    pub azure: AzureConfig,
    pub github: GitHubConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfig {
    pub image_tag: String,
    pub context: String,
    pub dockerfile: String,
    pub timeout_minutes: u64,
    /// Build strategy names, tried in order.
    pub strategies: Vec<String>,
    pub platform: String,
}

impl DockerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes.saturating_mul(60))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfig {
    pub name_prefix: String,
    pub host_port: u16,
    pub container_port: u16,
    /// Value for `ASPNETCORE_ENVIRONMENT` inside the test container.
    pub environment: String,
    pub startup_attempts: u32,
    pub startup_interval_seconds: u64,
    pub database_host: String,
    pub database_name: String,
    pub database_user: String,
}

impl ContainerConfig {
    pub fn startup_interval(&self) -> Duration {
        Duration::from_secs(self.startup_interval_seconds)
    }

    /// Npgsql connection string for the test container.
    pub fn connection_string(&self, password: &str) -> String {
        format!(
            "Host={};Database={};Username={};Password={}",
            self.database_host, self.database_name, self.database_user, password
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmokeConfig {
    pub health_path: String,
    pub api_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AzureConfig {
    pub app_name_prefix: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub subscription_id: String,
    pub role: String,
    pub env_name: String,
    pub location: String,
}

impl AzureConfig {
    /// Display name of the app registration for a repository.
    pub fn app_name(&self, repo: &str) -> String {
        format!("{}-{}", self.app_name_prefix, repo)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub repo: String,
    pub branch: String,
    pub environments: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    /// Load configuration: embedded defaults, then the user file, then env.
    ///
    /// `explicit` is the `--config` path; when given it must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_files(explicit)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Embedded defaults with the user file merged on top.
    fn from_files(explicit: Option<&Path>) -> Result<Self> {
        let mut value: toml::Value =
            toml::from_str(CONFIG_TOML).context("Failed to parse embedded config.toml")?;

        let user_path = match explicit {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                Some(p.to_path_buf())
            }
            None => user_config_path().filter(|p| p.exists()),
        };

        if let Some(path) = user_path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let overlay: toml::Value = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            merge(&mut value, overlay);
        }

        value
            .try_into::<Config>()
            .context("Configuration does not match the expected layout")
    }

    /// Apply environment variable overrides.
    fn apply_env(&mut self) {
        if let Ok(org) = env::var("TODO_OPS_GITHUB_ORG") {
            self.github.org = org;
        }

        if let Ok(repo) = env::var("TODO_OPS_GITHUB_REPO") {
            self.github.repo = repo;
        }

        if let Ok(tenant) = env::var("AZURE_TENANT_ID") {
            self.azure.tenant_id = tenant;
        }

        if let Ok(subscription) = env::var("AZURE_SUBSCRIPTION_ID") {
            self.azure.subscription_id = subscription;
        }

        if let Ok(tag) = env::var("TODO_OPS_IMAGE_TAG") {
            self.docker.image_tag = tag;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            self.logging.level = log_level;
        }
    }

    /// Validate values that every command relies on.
    fn validate(&self) -> Result<()> {
        if self.docker.image_tag.trim().is_empty() {
            anyhow::bail!("docker.image_tag must not be empty");
        }

        if self.docker.timeout_minutes == 0 {
            anyhow::bail!("docker.timeout_minutes must be greater than zero");
        }

        if self.docker.timeout_minutes.checked_mul(60).is_none() {
            anyhow::bail!("docker.timeout_minutes is too large");
        }

        if self.docker.strategies.is_empty() {
            anyhow::bail!("docker.strategies must list at least one build strategy");
        }

        if self.container.startup_attempts == 0 {
            anyhow::bail!("container.startup_attempts must be greater than zero");
        }

        Ok(())
    }

    /// The built-in defaults alone, without user file or environment.
    #[cfg(test)]
    pub(crate) fn embedded() -> Self {
        toml::from_str(CONFIG_TOML).expect("embedded config.toml parses")
    }
}

/// Path of the optional user configuration file.
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "todo-ops").map(|dirs| dirs.config_dir().join(USER_CONFIG_FILE))
}

/// Recursively merge `overlay` into `base`; tables merge, everything else replaces.
fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_parsing() {
        let result = toml::from_str::<Config>(CONFIG_TOML);
        assert!(result.is_ok(), "Config parsing failed: {:?}", result.err());
    }

    #[test]
    fn test_embedded_defaults_are_valid() {
        let config = Config::embedded();
        assert!(config.validate().is_ok());
        assert_eq!(config.docker.strategies.len(), 4);
        assert_eq!(config.docker.timeout(), Duration::from_secs(600));
        assert_eq!(config.github.environments.len(), 3);
        // No org, repo or tenant is baked into the defaults.
        assert!(config.github.org.is_empty());
        assert!(config.azure.tenant_id.is_empty());
    }

    #[test]
    fn test_validate_rejects_empty_strategies() {
        let mut config = Config::embedded();
        config.docker.strategies.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::embedded();
        config.docker.timeout_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_user_file_overlays_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[docker]\nimage_tag = \"custom:1\"\n\n[github]\norg = \"acme\"\nrepo = \"todo\""
        )
        .unwrap();

        let config = Config::from_files(Some(file.path())).unwrap();

        assert_eq!(config.docker.image_tag, "custom:1");
        assert_eq!(config.github.org, "acme");
        assert_eq!(config.github.repo, "todo");
        // Untouched keys keep their defaults.
        assert_eq!(config.docker.dockerfile, "Dockerfile");
        assert_eq!(config.github.branch, "main");
    }

    #[test]
    fn test_validate_rejects_overflowing_timeout() {
        let mut config = Config::embedded();
        config.docker.timeout_minutes = u64::MAX;
        assert!(config.validate().is_err());
        assert_eq!(config.docker.timeout(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = Config::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_app_name_and_connection_string() {
        let config = Config::embedded();
        assert_eq!(config.azure.app_name("todo"), "todoapp-github-oidc-todo");
        assert_eq!(
            config.container.connection_string("pw"),
            "Host=host.docker.internal;Database=todoapp;Username=postgres;Password=pw"
        );
    }
}
