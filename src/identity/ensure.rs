//! Reuse-or-create provisioning of the OIDC identity.
//!
//! Resources are ensured in dependency order: app registration, service
//! principal, role assignment, then federated credentials. Each step looks the
//! resource up by its natural key first and only creates it when absent. The
//! first error stops the run; nothing already created is rolled back.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, info};

use super::client::{subscription_scope, DirectoryClient};
use super::models::{
    AppRegistration, FederatedCredential, GitHubTarget, RoleAssignment, ServicePrincipal,
};
use crate::error::ToolError;

/// Everything needed to provision or verify one repository's identity.
#[derive(Debug, Clone)]
pub struct OidcPlan {
    /// Display name of the app registration.
    pub app_name: String,
    pub tenant_id: String,
    pub subscription_id: String,
    /// Role granted on the subscription, e.g. `Contributor`.
    pub role: String,
    pub target: GitHubTarget,
}

impl OidcPlan {
    pub fn scope(&self) -> String {
        subscription_scope(&self.subscription_id)
    }

    pub fn expected_credentials(&self) -> Vec<FederatedCredential> {
        self.target.expected_credentials()
    }
}

/// Whether a resource was found or had to be made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    Reused,
}

impl fmt::Display for EnsureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Reused => write!(f, "reused"),
        }
    }
}

/// A resource together with how it was obtained.
#[derive(Debug, Clone)]
pub struct Ensured<T> {
    pub resource: T,
    pub outcome: EnsureOutcome,
}

impl<T> Ensured<T> {
    fn created(resource: T) -> Self {
        Self {
            resource,
            outcome: EnsureOutcome::Created,
        }
    }

    fn reused(resource: T) -> Self {
        Self {
            resource,
            outcome: EnsureOutcome::Reused,
        }
    }
}

/// Result of a complete, successful setup run.
#[derive(Debug, Clone)]
pub struct SetupReport {
    pub app: Ensured<AppRegistration>,
    pub service_principal: Ensured<ServicePrincipal>,
    pub role_assignment: Ensured<RoleAssignment>,
    pub credentials: Vec<Ensured<FederatedCredential>>,
}

impl SetupReport {
    fn outcomes(&self) -> impl Iterator<Item = EnsureOutcome> + '_ {
        [
            self.app.outcome,
            self.service_principal.outcome,
            self.role_assignment.outcome,
        ]
        .into_iter()
        .chain(self.credentials.iter().map(|c| c.outcome))
    }

    pub fn created_count(&self) -> usize {
        self.outcomes()
            .filter(|o| *o == EnsureOutcome::Created)
            .count()
    }

    pub fn reused_count(&self) -> usize {
        self.outcomes()
            .filter(|o| *o == EnsureOutcome::Reused)
            .count()
    }

    /// Client ID of the app registration.
    pub fn client_id(&self) -> &str {
        &self.app.resource.app_id
    }
}

/// Drives a [`DirectoryClient`] to bring the directory in line with a plan.
pub struct Ensurer<'a, C: ?Sized> {
    client: &'a C,
}

impl<'a, C: DirectoryClient + ?Sized> Ensurer<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub async fn run(&self, plan: &OidcPlan) -> Result<SetupReport, ToolError> {
        let app = self.ensure_app(&plan.app_name).await?;
        let service_principal = self.ensure_service_principal(&app.resource.app_id).await?;
        let role_assignment = self
            .ensure_role_assignment(&service_principal.resource.id, &plan.role, &plan.scope())
            .await?;
        let credentials = self
            .ensure_credentials(&app.resource.app_id, plan.expected_credentials())
            .await?;

        let report = SetupReport {
            app,
            service_principal,
            role_assignment,
            credentials,
        };
        info!(
            created = report.created_count(),
            reused = report.reused_count(),
            "OIDC setup complete"
        );
        Ok(report)
    }

    async fn ensure_app(&self, name: &str) -> Result<Ensured<AppRegistration>, ToolError> {
        if let Some(app) = self.client.find_app(name).await? {
            debug!("Reusing app registration {} ({})", name, app.app_id);
            return Ok(Ensured::reused(app));
        }
        self.client.create_app(name).await.map(Ensured::created)
    }

    async fn ensure_service_principal(
        &self,
        app_id: &str,
    ) -> Result<Ensured<ServicePrincipal>, ToolError> {
        if let Some(sp) = self.client.find_service_principal(app_id).await? {
            debug!("Reusing service principal {}", sp.id);
            return Ok(Ensured::reused(sp));
        }
        self.client
            .create_service_principal(app_id)
            .await
            .map(Ensured::created)
    }

    async fn ensure_role_assignment(
        &self,
        assignee: &str,
        role: &str,
        scope: &str,
    ) -> Result<Ensured<RoleAssignment>, ToolError> {
        if let Some(assignment) = self
            .client
            .find_role_assignment(assignee, role, scope)
            .await?
        {
            debug!("Reusing {} assignment on {}", role, scope);
            return Ok(Ensured::reused(assignment));
        }
        self.client
            .create_role_assignment(assignee, role, scope)
            .await
            .map(Ensured::created)
    }

    async fn ensure_credentials(
        &self,
        app_id: &str,
        expected: Vec<FederatedCredential>,
    ) -> Result<Vec<Ensured<FederatedCredential>>, ToolError> {
        let existing = self.client.list_federated_credentials(app_id).await?;
        let present: HashSet<&str> = existing.iter().map(|c| c.name.as_str()).collect();

        let mut out = Vec::with_capacity(expected.len());
        for cred in expected {
            if present.contains(cred.name.as_str()) {
                debug!("Reusing federated credential {}", cred.name);
                out.push(Ensured::reused(cred));
            } else {
                let created = self.client.create_federated_credential(app_id, &cred).await?;
                out.push(Ensured::created(created));
            }
        }
        Ok(out)
    }
}
