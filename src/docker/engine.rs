//! Docker CLI wrapper.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ToolError;
use crate::runner::CommandSpec;
use crate::tool::Tool;

/// Lines of container log output kept for diagnostics.
const LOG_TAIL_LINES: u32 = 200;

/// Row of `docker image ls --format '{{json .}}'`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageSummary {
    pub repository: String,
    pub tag: String,
    #[serde(rename = "ID")]
    pub id: String,
    pub size: String,
    #[serde(default)]
    pub created_since: String,
}

/// A detached container started for testing.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub host_port: u16,
    pub container_port: u16,
    /// Plain variables, passed as `-e KEY=VALUE`.
    pub env: BTreeMap<String, String>,
    /// Sensitive variables, passed as `-e KEY` with the value in the docker
    /// client's own environment so it never shows up in argv.
    pub secret_env: BTreeMap<String, String>,
}

impl ContainerSpec {
    /// Arguments for `docker run`.
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "-p".to_string(),
            format!("{}:{}", self.host_port, self.container_port),
        ];
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        for key in self.secret_env.keys() {
            args.push("-e".to_string());
            args.push(key.clone());
        }
        args.push(self.image.clone());
        args
    }
}

/// Docker command-line client.
#[derive(Debug, Clone, Copy)]
pub struct DockerCli {
    tool: Tool,
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            tool: Tool::new("docker"),
        }
    }

    /// Ensure the daemon answers; returns its server version.
    pub async fn check_daemon(&self) -> Result<String, ToolError> {
        let spec = self
            .tool
            .command(["info", "--format", "{{.ServerVersion}}"]);
        let out = self.tool.output(&spec).await?;
        if out.outcome.is_success() {
            let version = out.stdout.trim().to_string();
            debug!("Docker server version {}", version);
            Ok(version)
        } else {
            Err(ToolError::Unavailable {
                tool: "docker",
                detail: first_line(&out.stderr),
            })
        }
    }

    /// Drop the build cache so the next build starts clean.
    pub async fn prune_build_cache(&self) -> Result<(), ToolError> {
        info!("Pruning Docker build cache");
        self.tool
            .text(&self.tool.command(["builder", "prune", "-f"]))
            .await
            .map(|_| ())
    }

    /// Look up a local image by `repository:tag`.
    pub async fn image_summary(&self, tag: &str) -> Result<Option<ImageSummary>, ToolError> {
        let spec = self
            .tool
            .command(["image", "ls", tag, "--format", "{{json .}}"]);
        let stdout = self.tool.text(&spec).await?;
        parse_image_lines(&stdout, &spec)
    }

    /// Start a detached container; returns the container id.
    pub async fn run_detached(&self, container: &ContainerSpec) -> Result<String, ToolError> {
        let mut spec = self.tool.command(container.run_args());
        for (key, value) in &container.secret_env {
            spec = spec.env(key.as_str(), value.as_str());
        }
        info!("Starting container {} from {}", container.name, container.image);
        let stdout = self.tool.text(&spec).await?;
        Ok(stdout.trim().to_string())
    }

    /// Recent log output (stdout and stderr) of a container.
    pub async fn logs(&self, name: &str) -> Result<String, ToolError> {
        let tail = LOG_TAIL_LINES.to_string();
        let spec = self.tool.command(["logs", "--tail", tail.as_str(), name]);
        let out = self.tool.output(&spec).await?;
        Ok(format!("{}{}", out.stdout, out.stderr))
    }

    /// Stop and remove a container, ignoring "no such container".
    pub async fn remove_container(&self, name: &str) {
        let stop = self.tool.command(["stop", name]);
        let remove = self.tool.command(["rm", "-f", name]);
        for spec in [stop, remove] {
            match self.tool.succeeds(&spec).await {
                Ok(true) => debug!("{} ok", spec.display()),
                Ok(false) => debug!("{} had nothing to do", spec.display()),
                Err(e) => warn!("{} failed: {}", spec.display(), e),
            }
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_image_lines(stdout: &str, spec: &CommandSpec) -> Result<Option<ImageSummary>, ToolError> {
    match stdout.lines().find(|l| !l.trim().is_empty()) {
        Some(line) => crate::tool::parse_json(line, spec).map(Some),
        None => Ok(None),
    }
}

fn first_line(s: &str) -> String {
    s.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("daemon did not respond")
        .to_string()
}
