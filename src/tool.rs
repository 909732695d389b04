//! Thin wrapper for invoking an external CLI (`docker`, `az`, `gh`) and
//! turning its exit status and output into typed results.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{RunnerError, ToolError};
use crate::runner::{capture, CapturedOutput, CommandSpec, Outcome};

/// Deadline for short query/mutation calls.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(120);

/// Maximum stderr characters kept in an error.
const STDERR_LIMIT: usize = 2000;

/// An external command-line tool.
#[derive(Debug, Clone, Copy)]
pub struct Tool {
    pub name: &'static str,
    pub timeout: Duration,
}

impl Tool {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            timeout: QUERY_TIMEOUT,
        }
    }

    pub fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(self.name, self.timeout).args(args)
    }

    /// Run and return the raw captured output, whatever the exit status.
    pub async fn output(&self, spec: &CommandSpec) -> Result<CapturedOutput, ToolError> {
        capture(spec).await.map_err(|e| match e {
            RunnerError::Spawn { source, .. } => ToolError::Unavailable {
                tool: self.name,
                detail: source.to_string(),
            },
            other => ToolError::Runner(other),
        })
    }

    /// Run and return stdout; any non-zero exit or timeout is an error.
    pub async fn text(&self, spec: &CommandSpec) -> Result<String, ToolError> {
        let out = self.output(spec).await?;
        match out.outcome {
            Outcome::Succeeded => Ok(out.stdout),
            Outcome::TimedOut => Err(ToolError::TimedOut {
                command: spec.display(),
            }),
            Outcome::Failed { code } => Err(ToolError::CommandFailed {
                command: spec.display(),
                code: code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                stderr: truncate(out.stderr.trim()),
            }),
        }
    }

    /// Run and deserialize stdout as JSON.
    pub async fn json<T: DeserializeOwned>(&self, spec: &CommandSpec) -> Result<T, ToolError> {
        let stdout = self.text(spec).await?;
        parse_json(&stdout, spec)
    }

    /// Run and report only whether it succeeded.
    pub async fn succeeds(&self, spec: &CommandSpec) -> Result<bool, ToolError> {
        let out = self.output(spec).await?;
        debug!(command = %spec.display(), outcome = %out.outcome, "probe");
        Ok(out.outcome.is_success())
    }
}

/// Parse CLI JSON output; empty output is treated as JSON `null`.
pub fn parse_json<T: DeserializeOwned>(stdout: &str, spec: &CommandSpec) -> Result<T, ToolError> {
    let body = if stdout.trim().is_empty() {
        "null"
    } else {
        stdout
    };
    serde_json::from_str(body).map_err(|e| ToolError::InvalidOutput {
        command: spec.display(),
        detail: e.to_string(),
    })
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= STDERR_LIMIT {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(STDERR_LIMIT).collect();
        out.push_str("... [truncated]");
        out
    }
}
