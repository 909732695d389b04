//! Directory operations over the Azure CLI.
//!
//! Each operation is a single `az ... --output json` call. Lookups return
//! `None` when nothing matches; creations return the created resource.

use async_trait::async_trait;
use tracing::{debug, info};

use super::models::{
    Account, AppRegistration, FederatedCredential, RoleAssignment, ServicePrincipal,
};
use crate::error::ToolError;
use crate::tool::Tool;

/// Queries and mutations the ensurer and verifier need from Azure AD.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// The signed-in account and its default subscription.
    async fn account(&self) -> Result<Account, ToolError>;

    async fn find_app(&self, display_name: &str) -> Result<Option<AppRegistration>, ToolError>;

    async fn create_app(&self, display_name: &str) -> Result<AppRegistration, ToolError>;

    async fn find_service_principal(
        &self,
        app_id: &str,
    ) -> Result<Option<ServicePrincipal>, ToolError>;

    async fn create_service_principal(&self, app_id: &str) -> Result<ServicePrincipal, ToolError>;

    async fn find_role_assignment(
        &self,
        assignee: &str,
        role: &str,
        scope: &str,
    ) -> Result<Option<RoleAssignment>, ToolError>;

    async fn create_role_assignment(
        &self,
        assignee: &str,
        role: &str,
        scope: &str,
    ) -> Result<RoleAssignment, ToolError>;

    async fn list_federated_credentials(
        &self,
        app_id: &str,
    ) -> Result<Vec<FederatedCredential>, ToolError>;

    async fn create_federated_credential(
        &self,
        app_id: &str,
        credential: &FederatedCredential,
    ) -> Result<FederatedCredential, ToolError>;
}

/// `az` command-line client.
#[derive(Debug, Clone, Copy)]
pub struct AzCli {
    tool: Tool,
}

impl AzCli {
    pub fn new() -> Self {
        Self {
            tool: Tool::new("az"),
        }
    }
}

impl Default for AzCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DirectoryClient for AzCli {
    async fn account(&self) -> Result<Account, ToolError> {
        let spec = self.tool.command(["account", "show", "--output", "json"]);
        match self.tool.json::<Account>(&spec).await {
            Ok(account) => {
                debug!("Signed in to tenant {}", account.tenant_id);
                Ok(account)
            }
            Err(ToolError::CommandFailed { .. }) => Err(ToolError::NotLoggedIn { tool: "az" }),
            Err(e) => Err(e),
        }
    }

    async fn find_app(&self, display_name: &str) -> Result<Option<AppRegistration>, ToolError> {
        let spec = self.tool.command([
            "ad",
            "app",
            "list",
            "--display-name",
            display_name,
            "--output",
            "json",
        ]);
        let apps: Vec<AppRegistration> = self.tool.json(&spec).await?;
        // `--display-name` is a prefix filter.
        Ok(apps.into_iter().find(|a| a.display_name == display_name))
    }

    async fn create_app(&self, display_name: &str) -> Result<AppRegistration, ToolError> {
        info!("Creating app registration {}", display_name);
        let spec = self.tool.command([
            "ad",
            "app",
            "create",
            "--display-name",
            display_name,
            "--output",
            "json",
        ]);
        self.tool.json(&spec).await
    }

    async fn find_service_principal(
        &self,
        app_id: &str,
    ) -> Result<Option<ServicePrincipal>, ToolError> {
        let filter = format!("appId eq '{}'", app_id);
        let spec = self.tool.command([
            "ad",
            "sp",
            "list",
            "--filter",
            filter.as_str(),
            "--output",
            "json",
        ]);
        let principals: Vec<ServicePrincipal> = self.tool.json(&spec).await?;
        Ok(principals.into_iter().next())
    }

    async fn create_service_principal(&self, app_id: &str) -> Result<ServicePrincipal, ToolError> {
        info!("Creating service principal for {}", app_id);
        let spec = self
            .tool
            .command(["ad", "sp", "create", "--id", app_id, "--output", "json"]);
        self.tool.json(&spec).await
    }

    async fn find_role_assignment(
        &self,
        assignee: &str,
        role: &str,
        scope: &str,
    ) -> Result<Option<RoleAssignment>, ToolError> {
        let spec = self.tool.command([
            "role",
            "assignment",
            "list",
            "--assignee",
            assignee,
            "--role",
            role,
            "--scope",
            scope,
            "--output",
            "json",
        ]);
        let assignments: Vec<RoleAssignment> = self.tool.json(&spec).await?;
        Ok(assignments.into_iter().next())
    }

    async fn create_role_assignment(
        &self,
        assignee: &str,
        role: &str,
        scope: &str,
    ) -> Result<RoleAssignment, ToolError> {
        info!("Assigning {} on {}", role, scope);
        let spec = self.tool.command([
            "role",
            "assignment",
            "create",
            "--assignee-object-id",
            assignee,
            "--assignee-principal-type",
            "ServicePrincipal",
            "--role",
            role,
            "--scope",
            scope,
            "--output",
            "json",
        ]);
        self.tool.json(&spec).await
    }

    async fn list_federated_credentials(
        &self,
        app_id: &str,
    ) -> Result<Vec<FederatedCredential>, ToolError> {
        let spec = self.tool.command([
            "ad",
            "app",
            "federated-credential",
            "list",
            "--id",
            app_id,
            "--output",
            "json",
        ]);
        let creds: Option<Vec<FederatedCredential>> = self.tool.json(&spec).await?;
        Ok(creds.unwrap_or_default())
    }

    async fn create_federated_credential(
        &self,
        app_id: &str,
        credential: &FederatedCredential,
    ) -> Result<FederatedCredential, ToolError> {
        info!("Creating federated credential {}", credential.name);
        let parameters =
            serde_json::to_string(credential).map_err(|e| ToolError::InvalidOutput {
                command: "az ad app federated-credential create".to_string(),
                detail: e.to_string(),
            })?;
        let spec = self.tool.command([
            "ad",
            "app",
            "federated-credential",
            "create",
            "--id",
            app_id,
            "--parameters",
            parameters.as_str(),
            "--output",
            "json",
        ]);
        self.tool.json(&spec).await
    }
}

/// Role assignment scope for a whole subscription.
pub fn subscription_scope(subscription_id: &str) -> String {
    format!("/subscriptions/{}", subscription_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::models::{AZURE_AUDIENCE, GITHUB_ISSUER};

    #[test]
    fn test_subscription_scope() {
        assert_eq!(subscription_scope("sub-1"), "/subscriptions/sub-1");
    }

    #[test]
    fn test_credential_parameters_shape() {
        let cred = FederatedCredential {
            name: "github-pull-request".into(),
            issuer: GITHUB_ISSUER.into(),
            subject: "repo:acme/todo:pull_request".into(),
            description: "PRs".into(),
            audiences: vec![AZURE_AUDIENCE.into()],
        };

        let value: serde_json::Value = serde_json::to_value(&cred).unwrap();

        assert_eq!(value["name"], "github-pull-request");
        assert_eq!(value["audiences"][0], "api://AzureADTokenExchange");
        assert_eq!(value["subject"], "repo:acme/todo:pull_request");
    }

    #[tokio::test]
    async fn test_missing_az_is_a_prerequisite_error() {
        let client = AzCli {
            tool: Tool::new("todo-ops-missing-az"),
        };
        let err = client.account().await.unwrap_err();
        assert!(err.is_prerequisite());
    }
}
