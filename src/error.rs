//! Error types for the todo-ops tooling.
//!
//! Uses `thiserror` for library-style errors with automatic `Display` and `Error` implementations.

use thiserror::Error;

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Smoke test error: {0}")]
    Smoke(#[from] SmokeError),

    #[error("All {attempts} build strategies failed")]
    BuildExhausted { attempts: usize },

    #[error("Verification failed: {passed}/{total} checks passed")]
    VerificationFailed { passed: usize, total: usize },

    #[error("Image {tag} not found locally")]
    ImageMissing { tag: String },

    #[error("{failed} prerequisite check(s) failed")]
    PrerequisitesMissing { failed: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from spawning and supervising child processes.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Command line is empty")]
    EmptyCommand,

    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed while waiting for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the external command-line tools (`docker`, `az`, `gh`).
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{tool} is not available: {detail}")]
    Unavailable { tool: &'static str, detail: String },

    #[error("{tool} is not logged in")]
    NotLoggedIn { tool: &'static str },

    #[error("`{command}` exited with {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: String,
        stderr: String,
    },

    #[error("`{command}` timed out")]
    TimedOut { command: String },

    #[error("Unexpected output from `{command}`: {detail}")]
    InvalidOutput { command: String, detail: String },

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// Errors from the post-deploy smoke test.
#[derive(Error, Debug)]
pub enum SmokeError {
    #[error("{url} did not become healthy after {attempts} attempts")]
    NotHealthy { url: String, attempts: u32 },

    #[error("{url} returned HTTP {status}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ToolError {
    /// Returns true if this error means a prerequisite is missing.
    pub fn is_prerequisite(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::NotLoggedIn { .. })
    }
}

impl AppError {
    /// Returns a user-friendly message for display in the terminal.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Tool(ToolError::Unavailable { tool: "docker", .. }) => {
                "Docker is not reachable. Is the daemon running?"
            }
            Self::Tool(ToolError::Unavailable { .. }) => "A required command-line tool is missing.",
            Self::Tool(ToolError::NotLoggedIn { tool: "az" }) => {
                "Not logged in to Azure. Run `az login` first."
            }
            Self::Tool(ToolError::NotLoggedIn { tool: "gh" }) => {
                "Not logged in to GitHub. Run `gh auth login` first."
            }
            Self::Tool(ToolError::NotLoggedIn { .. }) => "A required tool is not logged in.",
            Self::Tool(ToolError::TimedOut { .. }) => "An external command timed out.",
            Self::Tool(ToolError::Runner(_)) => "A child process failed unexpectedly.",
            Self::Tool(_) => "An external command failed.",
            Self::Smoke(_) => "The application did not pass its smoke test.",
            Self::BuildExhausted { .. } => "The image could not be built with any strategy.",
            Self::VerificationFailed { .. } => "The OIDC configuration does not match expectations.",
            Self::ImageMissing { .. } => "The image has not been built yet.",
            Self::PrerequisitesMissing { .. } => "Some required tools are missing or signed out.",
            Self::Config(_) => "Configuration error. Please check settings.",
            Self::Io(_) => "A file could not be read or written.",
            Self::Json(_) => "A JSON document could not be processed.",
        }
    }

    /// Troubleshooting checklist printed when a command gives up.
    pub fn troubleshooting(&self) -> Vec<&'static str> {
        match self {
            Self::BuildExhausted { .. } => vec![
                "Check that Docker Desktop / the daemon has enough memory and disk space",
                "Run `docker system prune` to clear dangling layers and build cache",
                "Confirm the base images can be pulled (network, proxy, registry login)",
                "Retry with --clean-build to disable the layer cache",
                "Raise --timeout-minutes if restores or downloads are slow",
                "Build the project outside Docker (`dotnet publish`) to rule out code errors",
            ],
            Self::Smoke(_) => vec![
                "Inspect the container logs printed above",
                "Confirm the container port matches the port the app listens on",
                "Check the database connection string passed to the container",
            ],
            Self::Tool(ToolError::NotLoggedIn { tool: "az" }) => {
                vec!["Run `az login` and select the intended subscription"]
            }
            Self::Tool(ToolError::NotLoggedIn { tool: "gh" }) => {
                vec!["Run `gh auth login` with a token that can manage repository secrets"]
            }
            Self::Tool(e) if e.is_prerequisite() => {
                vec!["Run `todo-ops doctor` to check installed tools and logins"]
            }
            Self::VerificationFailed { .. } => vec![
                "Re-run `todo-ops oidc setup` for the same org and repository",
                "Check that the org and repository names match the GitHub remote exactly",
            ],
            Self::ImageMissing { .. } => vec!["Run `todo-ops build` or pass --tag with an existing image"],
            Self::PrerequisitesMissing { .. } => vec![
                "Install and start Docker",
                "Install the Azure CLI and run `az login`",
                "Install the GitHub CLI and run `gh auth login`",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let err = AppError::Tool(ToolError::NotLoggedIn { tool: "az" });
        assert_eq!(
            err.user_message(),
            "Not logged in to Azure. Run `az login` first."
        );

        let err = AppError::BuildExhausted { attempts: 4 };
        assert_eq!(err.to_string(), "All 4 build strategies failed");
    }

    #[test]
    fn test_troubleshooting_for_exhausted_build() {
        let err = AppError::BuildExhausted { attempts: 2 };
        assert!(err.troubleshooting().len() >= 5);

        let err = AppError::Config("bad".into());
        assert!(err.troubleshooting().is_empty());
    }

    #[test]
    fn test_prerequisite_classification() {
        assert!(ToolError::Unavailable {
            tool: "docker",
            detail: "no daemon".into()
        }
        .is_prerequisite());
        assert!(!ToolError::TimedOut {
            command: "az ad app list".into()
        }
        .is_prerequisite());
    }
}
