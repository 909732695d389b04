//! Repository secrets and variables through the GitHub CLI.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ToolError;
use crate::runner::process::StdinPayload;
use crate::tool::Tool;

/// Secret and variable storage of one GitHub repository.
#[async_trait]
pub trait RepoSettings: Send + Sync {
    /// Fails with `NotLoggedIn` when no usable credentials are configured.
    async fn auth_status(&self) -> Result<(), ToolError>;

    /// Names of existing secrets; values are never readable.
    async fn secret_names(&self, repo: &str) -> Result<Vec<String>, ToolError>;

    async fn set_secret(&self, repo: &str, name: &str, value: &str) -> Result<(), ToolError>;

    async fn variables(&self, repo: &str) -> Result<BTreeMap<String, String>, ToolError>;

    async fn set_variable(&self, repo: &str, name: &str, value: &str) -> Result<(), ToolError>;
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct VariableEntry {
    name: String,
    #[serde(default)]
    value: String,
}

/// `gh` command-line client.
#[derive(Debug, Clone, Copy)]
pub struct GhCli {
    tool: Tool,
}

impl GhCli {
    pub fn new() -> Self {
        Self {
            tool: Tool::new("gh"),
        }
    }
}

impl Default for GhCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepoSettings for GhCli {
    async fn auth_status(&self) -> Result<(), ToolError> {
        let spec = self.tool.command(["auth", "status"]);
        if self.tool.succeeds(&spec).await? {
            Ok(())
        } else {
            Err(ToolError::NotLoggedIn { tool: "gh" })
        }
    }

    async fn secret_names(&self, repo: &str) -> Result<Vec<String>, ToolError> {
        let spec = self
            .tool
            .command(["secret", "list", "--repo", repo, "--json", "name"]);
        let entries: Option<Vec<NamedEntry>> = self.tool.json(&spec).await?;
        let names: Vec<String> = entries
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.name)
            .collect();
        debug!("{} has {} secret(s)", repo, names.len());
        Ok(names)
    }

    async fn set_secret(&self, repo: &str, name: &str, value: &str) -> Result<(), ToolError> {
        // Without --body, gh reads the value from stdin.
        let spec = self
            .tool
            .command(["secret", "set", name, "--repo", repo])
            .stdin(StdinPayload::new(value));
        self.tool.text(&spec).await?;
        info!("Set secret {} on {}", name, repo);
        Ok(())
    }

    async fn variables(&self, repo: &str) -> Result<BTreeMap<String, String>, ToolError> {
        let spec = self
            .tool
            .command(["variable", "list", "--repo", repo, "--json", "name,value"]);
        let entries: Option<Vec<VariableEntry>> = self.tool.json(&spec).await?;
        Ok(entries
            .unwrap_or_default()
            .into_iter()
            .map(|e| (e.name, e.value))
            .collect())
    }

    async fn set_variable(&self, repo: &str, name: &str, value: &str) -> Result<(), ToolError> {
        let spec = self
            .tool
            .command(["variable", "set", name, "--repo", repo, "--body", value]);
        self.tool.text(&spec).await?;
        info!("Set variable {}={} on {}", name, value, repo);
        Ok(())
    }
}
