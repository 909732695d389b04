//! `todo-ops oidc setup` and `todo-ops oidc verify`.

use std::path::PathBuf;

use super::{github_target, output};
use crate::cli::RepoArgs;
use crate::config::Config;
use crate::error::AppError;
use crate::identity::models::Account;
use crate::identity::{
    AzCli, DirectoryClient, EnsureOutcome, Ensurer, OidcPlan, SetupSummary, Verifier,
    DEFAULT_SUMMARY_FILE,
};

pub async fn setup(
    repo: RepoArgs,
    app_name: Option<String>,
    summary: Option<PathBuf>,
    config: &Config,
) -> Result<(), AppError> {
    output::header("OIDC setup");

    let az = AzCli::new();
    let plan = resolve_plan(&az, &repo, app_name, config).await?;
    print_plan(&plan);

    output::step("Ensuring Azure AD resources");
    let report = Ensurer::new(&az).run(&plan).await?;

    print_outcome(
        "App registration",
        &format!("{} ({})", plan.app_name, report.app.resource.app_id),
        report.app.outcome,
    );
    print_outcome(
        "Service principal",
        &report.service_principal.resource.id,
        report.service_principal.outcome,
    );
    print_outcome(
        "Role assignment",
        &format!("{} on {}", plan.role, plan.scope()),
        report.role_assignment.outcome,
    );
    for cred in &report.credentials {
        print_outcome(
            &format!("Credential {}", cred.resource.name),
            &cred.resource.subject,
            cred.outcome,
        );
    }
    output::detail(
        "Totals",
        &format!(
            "{} created, {} reused",
            report.created_count(),
            report.reused_count()
        ),
    );

    let summary_path = summary.unwrap_or_else(|| PathBuf::from(DEFAULT_SUMMARY_FILE));
    let summary = SetupSummary::from_setup(
        &plan,
        &report,
        &config.azure.env_name,
        &config.azure.location,
    );
    summary.write(&summary_path)?;
    output::success(&format!("Summary written to {}", summary_path.display()));

    output::step("Next steps");
    output::detail(
        "Push secrets",
        &format!(
            "todo-ops secrets push -o {} -r {}",
            plan.target.org, plan.target.repo
        ),
    );
    output::detail(
        "Verify",
        &format!(
            "todo-ops oidc verify -o {} -r {}",
            plan.target.org, plan.target.repo
        ),
    );
    Ok(())
}

pub async fn verify(
    repo: RepoArgs,
    app_name: Option<String>,
    config: &Config,
) -> Result<(), AppError> {
    output::header("OIDC verification");

    let az = AzCli::new();
    let plan = resolve_plan(&az, &repo, app_name, config).await?;
    print_plan(&plan);

    let report = Verifier::new(&az).run(&plan).await?;
    for check in &report.checks {
        if check.passed {
            output::success(&check.to_string());
        } else {
            output::failure(&check.to_string());
        }
    }

    let (passed, total) = (report.passed_count(), report.total());
    if report.all_passed() {
        output::success(&format!("{}/{} checks passed", passed, total));
        Ok(())
    } else {
        Err(AppError::VerificationFailed { passed, total })
    }
}

/// Combine flags, configuration and the signed-in `az` account into a plan.
async fn resolve_plan<C: DirectoryClient + ?Sized>(
    client: &C,
    repo: &RepoArgs,
    app_name: Option<String>,
    config: &Config,
) -> Result<OidcPlan, AppError> {
    let target = github_target(repo, config)?;

    output::step("Checking Azure CLI login");
    let account = client.account().await?;
    output::success(&format!(
        "Signed in as {} to {}",
        account
            .user
            .as_ref()
            .map_or("unknown user", |u| u.name.as_str()),
        if account.name.is_empty() {
            &account.id
        } else {
            &account.name
        }
    ));

    let (tenant_id, subscription_id) = tenant_and_subscription(&account, config)?;
    Ok(OidcPlan {
        app_name: app_name.unwrap_or_else(|| config.azure.app_name(&target.repo)),
        tenant_id,
        subscription_id,
        role: config.azure.role.clone(),
        target,
    })
}

/// Configured IDs win; otherwise the signed-in account supplies them. A
/// configured tenant must match the one `az` is signed in to.
fn tenant_and_subscription(
    account: &Account,
    config: &Config,
) -> Result<(String, String), AppError> {
    let tenant_id = if config.azure.tenant_id.is_empty() {
        account.tenant_id.clone()
    } else if config.azure.tenant_id != account.tenant_id {
        return Err(AppError::Config(format!(
            "az is signed in to tenant {} but {} is configured; run `az login --tenant {}`",
            account.tenant_id, config.azure.tenant_id, config.azure.tenant_id
        )));
    } else {
        config.azure.tenant_id.clone()
    };

    let subscription_id = if config.azure.subscription_id.is_empty() {
        account.id.clone()
    } else {
        config.azure.subscription_id.clone()
    };
    Ok((tenant_id, subscription_id))
}

fn print_plan(plan: &OidcPlan) {
    output::detail("Repository", &plan.target.slug());
    output::detail("App registration", &plan.app_name);
    output::detail("Tenant", &plan.tenant_id);
    output::detail("Subscription", &plan.subscription_id);
}

fn print_outcome(label: &str, value: &str, outcome: EnsureOutcome) {
    output::success(&format!("{} {}: {}", label, outcome, value));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::models::AccountUser;

    fn account() -> Account {
        Account {
            id: "sub-signed-in".into(),
            name: "Dev".into(),
            tenant_id: "tenant-1".into(),
            user: Some(AccountUser {
                name: "ops@acme.io".into(),
            }),
        }
    }

    #[test]
    fn test_ids_fall_back_to_account() {
        let config = Config::embedded();

        let (tenant, subscription) = tenant_and_subscription(&account(), &config).unwrap();

        assert_eq!(tenant, "tenant-1");
        assert_eq!(subscription, "sub-signed-in");
    }

    #[test]
    fn test_configured_subscription_wins() {
        let mut config = Config::embedded();
        config.azure.tenant_id = "tenant-1".into();
        config.azure.subscription_id = "sub-configured".into();

        let (_, subscription) = tenant_and_subscription(&account(), &config).unwrap();

        assert_eq!(subscription, "sub-configured");
    }

    #[test]
    fn test_tenant_mismatch_is_rejected() {
        let mut config = Config::embedded();
        config.azure.tenant_id = "tenant-other".into();

        let err = tenant_and_subscription(&account(), &config).unwrap_err();

        assert!(err.to_string().contains("tenant-other"));
    }
}
