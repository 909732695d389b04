//! Azure AD and OIDC data models.

use serde::{Deserialize, Deserializer, Serialize};

/// Token issuer for GitHub Actions OIDC.
pub const GITHUB_ISSUER: &str = "https://token.actions.githubusercontent.com";

/// Audience Azure AD expects for workload identity federation.
pub const AZURE_AUDIENCE: &str = "api://AzureADTokenExchange";

/// Signed-in account from `az account show`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Subscription ID.
    pub id: String,

    /// Subscription display name.
    #[serde(default)]
    pub name: String,

    pub tenant_id: String,

    #[serde(default)]
    pub user: Option<AccountUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountUser {
    pub name: String,
}

/// Application registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRegistration {
    /// Client ID.
    pub app_id: String,

    /// Directory object ID.
    pub id: String,

    pub display_name: String,
}

/// Service principal bound to an application registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    /// Object ID, used as the role assignment assignee.
    pub id: String,

    pub app_id: String,
}

/// Role assignment of a principal at a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub id: String,

    #[serde(default)]
    pub role_definition_name: String,

    pub scope: String,

    #[serde(default)]
    pub principal_id: String,
}

/// Federated identity credential, both as the desired descriptor and as
/// returned by `az ad app federated-credential list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedCredential {
    pub name: String,
    pub issuer: String,
    pub subject: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    pub audiences: Vec<String>,
}

/// `az` prints `"description": null` for credentials created without one.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl FederatedCredential {
    fn github(name: String, subject: String, description: String) -> Self {
        Self {
            name,
            issuer: GITHUB_ISSUER.to_string(),
            subject,
            description,
            audiences: vec![AZURE_AUDIENCE.to_string()],
        }
    }

    /// Differences between `self` (expected) and `actual`, empty when they match.
    pub fn mismatches(&self, actual: &FederatedCredential) -> Vec<String> {
        let mut out = Vec::new();
        if self.subject != actual.subject {
            out.push(format!(
                "subject is `{}`, expected `{}`",
                actual.subject, self.subject
            ));
        }
        if self.issuer != actual.issuer {
            out.push(format!(
                "issuer is `{}`, expected `{}`",
                actual.issuer, self.issuer
            ));
        }
        if !self.audiences.iter().all(|a| actual.audiences.contains(a)) {
            out.push(format!(
                "audiences are {:?}, expected {:?}",
                actual.audiences, self.audiences
            ));
        }
        out
    }
}

/// The GitHub repository whose workflows get federated access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubTarget {
    pub org: String,
    pub repo: String,
    pub branch: String,
    pub environments: Vec<String>,
}

impl GitHubTarget {
    /// `org/repo`.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.org, self.repo)
    }

    fn subject_prefix(&self) -> String {
        format!("repo:{}", self.slug())
    }

    pub fn branch_subject(&self, branch: &str) -> String {
        format!("{}:ref:refs/heads/{}", self.subject_prefix(), branch)
    }

    pub fn pull_request_subject(&self) -> String {
        format!("{}:pull_request", self.subject_prefix())
    }

    pub fn environment_subject(&self, environment: &str) -> String {
        format!("{}:environment:{}", self.subject_prefix(), environment)
    }

    /// Credentials a fully configured repository has: its default branch,
    /// pull requests, and one per deployment environment.
    pub fn expected_credentials(&self) -> Vec<FederatedCredential> {
        let mut creds = vec![
            FederatedCredential::github(
                format!("github-branch-{}", self.branch),
                self.branch_subject(&self.branch),
                format!("GitHub Actions on {} branch of {}", self.branch, self.slug()),
            ),
            FederatedCredential::github(
                "github-pull-request".to_string(),
                self.pull_request_subject(),
                format!("GitHub Actions for pull requests of {}", self.slug()),
            ),
        ];
        creds.extend(self.environments.iter().map(|env| {
            FederatedCredential::github(
                format!("github-env-{}", env),
                self.environment_subject(env),
                format!("GitHub Actions for the {} environment of {}", env, self.slug()),
            )
        }));
        creds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> GitHubTarget {
        GitHubTarget {
            org: "acme".into(),
            repo: "todo".into(),
            branch: "main".into(),
            environments: vec!["development".into(), "staging".into(), "production".into()],
        }
    }

    #[test]
    fn test_expected_credentials() {
        let creds = target().expected_credentials();

        assert_eq!(creds.len(), 5);
        assert_eq!(creds[0].name, "github-branch-main");
        assert_eq!(creds[0].subject, "repo:acme/todo:ref:refs/heads/main");
        assert_eq!(creds[1].subject, "repo:acme/todo:pull_request");
        assert_eq!(creds[4].name, "github-env-production");
        assert_eq!(creds[4].subject, "repo:acme/todo:environment:production");
        assert!(creds.iter().all(|c| c.issuer == GITHUB_ISSUER));
        assert!(creds.iter().all(|c| c.audiences == vec![AZURE_AUDIENCE]));
    }

    #[test]
    fn test_mismatches() {
        let expected = target().expected_credentials().remove(0);
        assert!(expected.mismatches(&expected).is_empty());

        let mut actual = expected.clone();
        actual.subject = "repo:other/todo:ref:refs/heads/main".into();
        actual.audiences = vec![];
        let diffs = expected.mismatches(&actual);
        assert_eq!(diffs.len(), 2);
        assert!(diffs[0].starts_with("subject"));
    }

    #[test]
    fn test_parse_az_payloads() {
        let app: AppRegistration = serde_json::from_str(
            r#"{"appId":"11111111-2222","id":"obj-1","displayName":"todoapp-github-oidc-todo","signInAudience":"AzureADMyOrg"}"#,
        )
        .unwrap();
        assert_eq!(app.app_id, "11111111-2222");

        let account: Account = serde_json::from_str(
            r#"{"id":"sub-1","name":"Dev","tenantId":"tenant-1","user":{"name":"ops@acme.io","type":"user"}}"#,
        )
        .unwrap();
        assert_eq!(account.tenant_id, "tenant-1");
        assert_eq!(account.user.unwrap().name, "ops@acme.io");

        let cred: FederatedCredential = serde_json::from_str(
            r#"{"audiences":["api://AzureADTokenExchange"],"description":null,"id":"x","issuer":"https://token.actions.githubusercontent.com","name":"github-pull-request","subject":"repo:acme/todo:pull_request"}"#,
        )
        .unwrap();
        assert_eq!(cred.description, "");
        assert_eq!(cred.subject, "repo:acme/todo:pull_request");
    }
}
