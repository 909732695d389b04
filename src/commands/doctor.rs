//! `todo-ops doctor`: prerequisite report.

use super::output;
use crate::config::{user_config_path, Config};
use crate::docker::DockerCli;
use crate::error::{AppError, ToolError};
use crate::github::{GhCli, RepoSettings};
use crate::identity::{AzCli, DirectoryClient};

pub async fn run(config: &Config) -> Result<(), AppError> {
    output::header("Prerequisites");

    let mut failed = 0;

    let docker = DockerCli::new().check_daemon().await;
    failed += report("docker", docker.map(|v| format!("daemon {}", v)));

    let az = AzCli::new().account().await;
    failed += report(
        "az",
        az.map(|account| {
            format!(
                "signed in to tenant {} (subscription {})",
                account.tenant_id, account.id
            )
        }),
    );

    let gh = GhCli::new().auth_status().await;
    failed += report("gh", gh.map(|()| "signed in".to_string()));

    output::step("Configuration");
    if let Some(path) = user_config_path() {
        let state = if path.exists() { "" } else { " (not present)" };
        output::detail("User config", &format!("{}{}", path.display(), state));
    }
    output::detail("Image tag", &config.docker.image_tag);
    output::detail("Strategies", &config.docker.strategies.join(", "));
    let repo = if config.github.org.is_empty() || config.github.repo.is_empty() {
        "not configured (pass -o/-r)".to_string()
    } else {
        format!("{}/{}", config.github.org, config.github.repo)
    };
    output::detail("GitHub repository", &repo);

    if failed == 0 {
        output::success("All prerequisites are in place");
        Ok(())
    } else {
        Err(AppError::PrerequisitesMissing { failed })
    }
}

/// Print one check; returns 1 when it failed.
fn report(tool: &str, result: Result<String, ToolError>) -> usize {
    match result {
        Ok(detail) => {
            output::success(&format!("{}: {}", tool, detail));
            0
        }
        Err(e) => {
            output::failure(&format!("{}: {}", tool, e));
            1
        }
    }
}
