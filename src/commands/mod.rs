//! Subcommand handlers.

mod build;
mod container;
mod doctor;
mod oidc;
pub mod output;
mod secrets;

use crate::cli::{Commands, OidcCommands, RepoArgs, SecretsCommands};
use crate::config::Config;
use crate::error::AppError;
use crate::identity::models::GitHubTarget;

/// Run one subcommand to completion.
pub async fn dispatch(command: Commands, config: &Config) -> Result<(), AppError> {
    match command {
        Commands::Build(args) => build::run(args, config).await,
        Commands::TestContainer(args) => container::run(args, config).await,
        Commands::Oidc(OidcCommands::Setup {
            repo,
            app_name,
            summary,
        }) => oidc::setup(repo, app_name, summary, config).await,
        Commands::Oidc(OidcCommands::Verify { repo, app_name }) => {
            oidc::verify(repo, app_name, config).await
        }
        Commands::Secrets(SecretsCommands::Push {
            repo,
            client_id,
            postgres_password,
            summary,
            force,
        }) => {
            let args = secrets::PushArgs {
                repo,
                client_id,
                postgres_password,
                summary,
                force,
            };
            secrets::push_secrets(args, config).await
        }
        Commands::Doctor => doctor::run(config).await,
    }
}

/// Repository from flags, falling back to `[github]` configuration.
fn github_target(repo: &RepoArgs, config: &Config) -> Result<GitHubTarget, AppError> {
    let org = repo
        .org
        .clone()
        .unwrap_or_else(|| config.github.org.clone());
    let name = repo
        .repo
        .clone()
        .unwrap_or_else(|| config.github.repo.clone());

    if org.trim().is_empty() || name.trim().is_empty() {
        return Err(AppError::Config(
            "GitHub organization and repository are required (-o/--org, -r/--repo or TODO_OPS_GITHUB_ORG/TODO_OPS_GITHUB_REPO)"
                .to_string(),
        ));
    }

    Ok(GitHubTarget {
        org,
        repo: name,
        branch: config.github.branch.clone(),
        environments: config.github.environments.clone(),
    })
}
