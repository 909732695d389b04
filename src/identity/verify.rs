//! Read-only check of an OIDC setup.

use std::fmt;

use tracing::{debug, info};

use super::client::DirectoryClient;
use super::ensure::OidcPlan;
use crate::error::ToolError;

/// One verified item.
#[derive(Debug, Clone)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl Check {
    fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.detail)
    }
}

/// Every check of a verification run, in order.
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub checks: Vec<Check>,
}

impl VerificationReport {
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn total(&self) -> usize {
        self.checks.len()
    }

    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

/// Compares the directory against a plan without changing anything.
pub struct Verifier<'a, C: ?Sized> {
    client: &'a C,
}

impl<'a, C: DirectoryClient + ?Sized> Verifier<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Run every check. Items that depend on a missing app registration or
    /// service principal are reported as failed rather than skipped, so the
    /// total stays the same between runs.
    pub async fn run(&self, plan: &OidcPlan) -> Result<VerificationReport, ToolError> {
        let mut report = VerificationReport::default();
        let expected = plan.expected_credentials();

        let app = self.client.find_app(&plan.app_name).await?;
        let Some(app) = app else {
            report.checks.push(Check::fail(
                "app registration",
                format!("`{}` not found", plan.app_name),
            ));
            report
                .checks
                .push(Check::fail("service principal", "app registration missing"));
            report
                .checks
                .push(Check::fail("role assignment", "app registration missing"));
            for cred in &expected {
                report.checks.push(Check::fail(
                    format!("federated credential {}", cred.name),
                    "app registration missing",
                ));
            }
            return Ok(finish(report));
        };
        report.checks.push(Check::pass(
            "app registration",
            format!("{} ({})", app.display_name, app.app_id),
        ));

        match self.client.find_service_principal(&app.app_id).await? {
            Some(sp) => {
                report
                    .checks
                    .push(Check::pass("service principal", sp.id.clone()));
                let scope = plan.scope();
                let check = match self
                    .client
                    .find_role_assignment(&sp.id, &plan.role, &scope)
                    .await?
                {
                    Some(_) => Check::pass("role assignment", format!("{} on {}", plan.role, scope)),
                    None => Check::fail(
                        "role assignment",
                        format!("no {} assignment on {}", plan.role, scope),
                    ),
                };
                report.checks.push(check);
            }
            None => {
                report
                    .checks
                    .push(Check::fail("service principal", "not found"));
                report
                    .checks
                    .push(Check::fail("role assignment", "service principal missing"));
            }
        }

        let actual = self.client.list_federated_credentials(&app.app_id).await?;
        for cred in &expected {
            let name = format!("federated credential {}", cred.name);
            let check = match actual.iter().find(|a| a.name == cred.name) {
                None => Check::fail(name, "not found"),
                Some(found) => {
                    let diffs = cred.mismatches(found);
                    if diffs.is_empty() {
                        Check::pass(name, found.subject.clone())
                    } else {
                        Check::fail(name, diffs.join("; "))
                    }
                }
            };
            debug!("{} passed={}", check.name, check.passed);
            report.checks.push(check);
        }

        Ok(finish(report))
    }
}

fn finish(report: VerificationReport) -> VerificationReport {
    info!(
        passed = report.passed_count(),
        total = report.total(),
        "verification finished"
    );
    report
}
