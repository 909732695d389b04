//! `todo-ops secrets push`.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{github_target, output};
use crate::cli::RepoArgs;
use crate::config::Config;
use crate::error::AppError;
use crate::github::{push, GhCli, PushAction, PushItem, RepoSettings};
use crate::identity::models::GitHubTarget;
use crate::identity::{SetupSummary, DEFAULT_SUMMARY_FILE};

pub struct PushArgs {
    pub repo: RepoArgs,
    pub client_id: Option<String>,
    pub postgres_password: Option<String>,
    pub summary: Option<PathBuf>,
    pub force: bool,
}

pub async fn push_secrets(args: PushArgs, config: &Config) -> Result<(), AppError> {
    output::header("GitHub secrets");

    let target = github_target(&args.repo, config)?;
    let summary_path = args
        .summary
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SUMMARY_FILE));
    let summary = load_summary(&summary_path)?;
    if let Some(s) = &summary {
        if s.github_org != target.org || s.github_repo != target.repo {
            output::warning(&format!(
                "{} was written for {}/{}, pushing to {}",
                summary_path.display(),
                s.github_org,
                s.github_repo,
                target.slug()
            ));
        }
    }

    let items = push_items(&args, summary.as_ref(), config)?;

    let gh = GhCli::new();
    output::step("Checking GitHub CLI login");
    gh.auth_status().await?;
    output::success("gh is signed in");

    output::step(&format!("Pushing to {}", target.slug()));
    let report = push(&gh, &target.slug(), &items, args.force).await?;
    for result in &report.results {
        let line = format!("{} {}: {}", result.kind, result.name, result.action);
        match result.action {
            PushAction::Skipped => output::warning(&line),
            _ => output::success(&line),
        }
    }

    let skipped = report.count(PushAction::Skipped);
    if skipped > 0 {
        output::detail("Skipped", &format!("{} (use --force to overwrite)", skipped));
    }
    print_workflow_hint(&target);
    Ok(())
}

fn load_summary(path: &Path) -> Result<Option<SetupSummary>, AppError> {
    if !path.exists() {
        debug!("No summary at {}", path.display());
        return Ok(None);
    }
    let summary = SetupSummary::read(path)?;
    output::success(&format!("Read {}", path.display()));
    Ok(Some(summary))
}

/// Secrets and variables to push. Flags override the summary, which overrides
/// configuration.
fn push_items(
    args: &PushArgs,
    summary: Option<&SetupSummary>,
    config: &Config,
) -> Result<Vec<PushItem>, AppError> {
    let client_id = args
        .client_id
        .clone()
        .or_else(|| summary.map(|s| s.secrets.azure_client_id.clone()))
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AppError::Config(
                "No client ID: run `todo-ops oidc setup` first or pass --client-id".to_string(),
            )
        })?;
    let tenant_id = pick(
        summary.map(|s| s.secrets.azure_tenant_id.as_str()),
        &config.azure.tenant_id,
        "AZURE_TENANT_ID",
    )?;
    let subscription_id = pick(
        summary.map(|s| s.secrets.azure_subscription_id.as_str()),
        &config.azure.subscription_id,
        "AZURE_SUBSCRIPTION_ID",
    )?;
    let env_name = summary
        .map(|s| s.variables.azure_env_name.clone())
        .unwrap_or_else(|| config.azure.env_name.clone());
    let location = summary
        .map(|s| s.variables.azure_location.clone())
        .unwrap_or_else(|| config.azure.location.clone());

    let mut items = vec![
        PushItem::secret("AZURE_CLIENT_ID", client_id),
        PushItem::secret("AZURE_TENANT_ID", tenant_id),
        PushItem::secret("AZURE_SUBSCRIPTION_ID", subscription_id),
    ];
    if let Some(password) = &args.postgres_password {
        items.push(PushItem::secret("POSTGRES_PASSWORD", password.as_str()));
    }
    items.push(PushItem::variable("AZURE_ENV_NAME", env_name));
    items.push(PushItem::variable("AZURE_LOCATION", location));
    Ok(items)
}

fn pick(from_summary: Option<&str>, configured: &str, name: &str) -> Result<String, AppError> {
    from_summary
        .filter(|v| !v.is_empty())
        .or(Some(configured).filter(|v| !v.is_empty()))
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::Config(format!(
                "No value for {}: run `todo-ops oidc setup` first or set it in the environment",
                name
            ))
        })
}

fn print_workflow_hint(target: &GitHubTarget) {
    output::step("Workflow login step");
    println!("     - uses: azure/login@v2");
    println!("       with:");
    println!("         client-id: ${{{{ secrets.AZURE_CLIENT_ID }}}}");
    println!("         tenant-id: ${{{{ secrets.AZURE_TENANT_ID }}}}");
    println!("         subscription-id: ${{{{ secrets.AZURE_SUBSCRIPTION_ID }}}}");
    output::detail(
        "Permissions",
        &format!("id-token: write, contents: read in {}", target.slug()),
    );
}
