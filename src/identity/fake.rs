//! In-memory directory used by the identity tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::DirectoryClient;
use super::ensure::OidcPlan;
use super::models::{
    Account, AccountUser, AppRegistration, FederatedCredential, GitHubTarget, RoleAssignment,
    ServicePrincipal,
};
use crate::error::ToolError;

pub fn plan() -> OidcPlan {
    OidcPlan {
        app_name: "todoapp-github-oidc-todo".into(),
        tenant_id: "tenant-1".into(),
        subscription_id: "sub-1".into(),
        role: "Contributor".into(),
        target: GitHubTarget {
            org: "acme".into(),
            repo: "todo".into(),
            branch: "main".into(),
            environments: vec!["development".into(), "staging".into(), "production".into()],
        },
    }
}

#[derive(Default)]
struct State {
    apps: Vec<AppRegistration>,
    principals: Vec<ServicePrincipal>,
    assignments: Vec<RoleAssignment>,
    credentials: HashMap<String, Vec<FederatedCredential>>,
    fail_on: Option<&'static str>,
}

/// Directory that keeps everything in memory and counts creations.
#[derive(Default)]
pub struct FakeDirectory {
    state: Mutex<State>,
    creations: AtomicUsize,
}

impl FakeDirectory {
    pub fn creations(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    /// Make the named operation fail from now on.
    pub fn fail_on(&self, operation: &'static str) {
        self.state.lock().unwrap().fail_on = Some(operation);
    }

    pub fn credential_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .credentials
            .values()
            .flatten()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Overwrite a stored credential's subject.
    pub fn tamper_subject(&self, name: &str, subject: &str) {
        let mut state = self.state.lock().unwrap();
        for cred in state.credentials.values_mut().flatten() {
            if cred.name == name {
                cred.subject = subject.to_string();
            }
        }
    }

    fn check(&self, operation: &'static str) -> Result<(), ToolError> {
        if self.state.lock().unwrap().fail_on == Some(operation) {
            return Err(ToolError::CommandFailed {
                command: format!("az {}", operation),
                code: "1".into(),
                stderr: "Insufficient privileges to complete the operation.".into(),
            });
        }
        Ok(())
    }

    fn created(&self) {
        self.creations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DirectoryClient for FakeDirectory {
    async fn account(&self) -> Result<Account, ToolError> {
        self.check("account")?;
        Ok(Account {
            id: "sub-1".into(),
            name: "Dev".into(),
            tenant_id: "tenant-1".into(),
            user: Some(AccountUser {
                name: "ops@acme.io".into(),
            }),
        })
    }

    async fn find_app(&self, display_name: &str) -> Result<Option<AppRegistration>, ToolError> {
        self.check("find_app")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .apps
            .iter()
            .find(|a| a.display_name == display_name)
            .cloned())
    }

    async fn create_app(&self, display_name: &str) -> Result<AppRegistration, ToolError> {
        self.check("create_app")?;
        let mut state = self.state.lock().unwrap();
        let n = state.apps.len() + 1;
        let app = AppRegistration {
            app_id: format!("app-{}", n),
            id: format!("obj-{}", n),
            display_name: display_name.to_string(),
        };
        state.apps.push(app.clone());
        self.created();
        Ok(app)
    }

    async fn find_service_principal(
        &self,
        app_id: &str,
    ) -> Result<Option<ServicePrincipal>, ToolError> {
        self.check("find_service_principal")?;
        let state = self.state.lock().unwrap();
        Ok(state.principals.iter().find(|p| p.app_id == app_id).cloned())
    }

    async fn create_service_principal(&self, app_id: &str) -> Result<ServicePrincipal, ToolError> {
        self.check("create_service_principal")?;
        let mut state = self.state.lock().unwrap();
        let sp = ServicePrincipal {
            id: format!("sp-{}", app_id),
            app_id: app_id.to_string(),
        };
        state.principals.push(sp.clone());
        self.created();
        Ok(sp)
    }

    async fn find_role_assignment(
        &self,
        assignee: &str,
        role: &str,
        scope: &str,
    ) -> Result<Option<RoleAssignment>, ToolError> {
        self.check("find_role_assignment")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .iter()
            .find(|a| a.principal_id == assignee && a.role_definition_name == role && a.scope == scope)
            .cloned())
    }

    async fn create_role_assignment(
        &self,
        assignee: &str,
        role: &str,
        scope: &str,
    ) -> Result<RoleAssignment, ToolError> {
        self.check("create_role_assignment")?;
        let mut state = self.state.lock().unwrap();
        let assignment = RoleAssignment {
            id: format!("{}/roleAssignments/{}", scope, state.assignments.len() + 1),
            role_definition_name: role.to_string(),
            scope: scope.to_string(),
            principal_id: assignee.to_string(),
        };
        state.assignments.push(assignment.clone());
        self.created();
        Ok(assignment)
    }

    async fn list_federated_credentials(
        &self,
        app_id: &str,
    ) -> Result<Vec<FederatedCredential>, ToolError> {
        self.check("list_federated_credentials")?;
        let state = self.state.lock().unwrap();
        Ok(state.credentials.get(app_id).cloned().unwrap_or_default())
    }

    async fn create_federated_credential(
        &self,
        app_id: &str,
        credential: &FederatedCredential,
    ) -> Result<FederatedCredential, ToolError> {
        self.check("create_federated_credential")?;
        let mut state = self.state.lock().unwrap();
        state
            .credentials
            .entry(app_id.to_string())
            .or_default()
            .push(credential.clone());
        self.created();
        Ok(credential.clone())
    }
}
