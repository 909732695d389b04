//! Pushing secrets and variables into a repository.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;
use zeroize::Zeroizing;

use super::client::RepoSettings;
use crate::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Secret,
    Variable,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret => write!(f, "secret"),
            Self::Variable => write!(f, "variable"),
        }
    }
}

/// A value to store in the repository.
pub struct PushItem {
    pub name: String,
    pub kind: ItemKind,
    value: Zeroizing<String>,
}

impl PushItem {
    pub fn secret(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ItemKind::Secret,
            value: Zeroizing::new(value.into()),
        }
    }

    pub fn variable(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ItemKind::Variable,
            value: Zeroizing::new(value.into()),
        }
    }
}

impl fmt::Debug for PushItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushItem")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// What happened to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushAction {
    Set,
    /// Already present and `force` was not given.
    Skipped,
    /// Variable already holds the same value.
    Unchanged,
}

impl fmt::Display for PushAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Skipped => write!(f, "skipped (exists)"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PushResult {
    pub name: String,
    pub kind: ItemKind,
    pub action: PushAction,
}

#[derive(Debug, Clone, Default)]
pub struct PushReport {
    pub results: Vec<PushResult>,
}

impl PushReport {
    pub fn count(&self, action: PushAction) -> usize {
        self.results.iter().filter(|r| r.action == action).count()
    }
}

/// Store every item in `repo`, in order. Existing names are left alone unless
/// `force` is set; the first failing call stops the push.
pub async fn push<S: RepoSettings + ?Sized>(
    settings: &S,
    repo: &str,
    items: &[PushItem],
    force: bool,
) -> Result<PushReport, ToolError> {
    let secrets: HashSet<String> = if items.iter().any(|i| i.kind == ItemKind::Secret) {
        settings.secret_names(repo).await?.into_iter().collect()
    } else {
        HashSet::new()
    };
    let variables = if items.iter().any(|i| i.kind == ItemKind::Variable) {
        settings.variables(repo).await?
    } else {
        Default::default()
    };

    let mut report = PushReport::default();
    for item in items {
        let action = match item.kind {
            ItemKind::Secret if secrets.contains(&item.name) && !force => PushAction::Skipped,
            ItemKind::Secret => {
                settings.set_secret(repo, &item.name, &item.value).await?;
                PushAction::Set
            }
            ItemKind::Variable => match variables.get(&item.name) {
                Some(current) if current.as_str() == item.value.as_str() => PushAction::Unchanged,
                Some(_) if !force => PushAction::Skipped,
                _ => {
                    settings.set_variable(repo, &item.name, &item.value).await?;
                    PushAction::Set
                }
            },
        };
        debug!("{} {}: {}", item.kind, item.name, action);
        report.results.push(PushResult {
            name: item.name.clone(),
            kind: item.kind,
            action,
        });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRepo {
        secrets: Mutex<BTreeMap<String, String>>,
        variables: Mutex<BTreeMap<String, String>>,
        writes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RepoSettings for FakeRepo {
        async fn auth_status(&self) -> Result<(), ToolError> {
            Ok(())
        }

        async fn secret_names(&self, _repo: &str) -> Result<Vec<String>, ToolError> {
            Ok(self.secrets.lock().unwrap().keys().cloned().collect())
        }

        async fn set_secret(&self, _repo: &str, name: &str, value: &str) -> Result<(), ToolError> {
            self.secrets
                .lock()
                .unwrap()
                .insert(name.to_string(), value.to_string());
            self.writes.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn variables(&self, _repo: &str) -> Result<BTreeMap<String, String>, ToolError> {
            Ok(self.variables.lock().unwrap().clone())
        }

        async fn set_variable(
            &self,
            _repo: &str,
            name: &str,
            value: &str,
        ) -> Result<(), ToolError> {
            self.variables
                .lock()
                .unwrap()
                .insert(name.to_string(), value.to_string());
            self.writes.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }

    fn items() -> Vec<PushItem> {
        vec![
            PushItem::secret("AZURE_CLIENT_ID", "app-1"),
            PushItem::secret("AZURE_TENANT_ID", "tenant-1"),
            PushItem::variable("AZURE_ENV_NAME", "dev"),
            PushItem::variable("AZURE_LOCATION", "eastus"),
        ]
    }

    #[tokio::test]
    async fn test_push_into_empty_repo_sets_everything() {
        let repo = FakeRepo::default();

        let report = push(&repo, "acme/todo", &items(), false).await.unwrap();

        assert_eq!(report.count(PushAction::Set), 4);
        assert_eq!(repo.writes.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_existing_names_are_skipped_without_force() {
        let repo = FakeRepo::default();
        repo.secrets
            .lock()
            .unwrap()
            .insert("AZURE_CLIENT_ID".into(), "old".into());
        repo.variables
            .lock()
            .unwrap()
            .insert("AZURE_LOCATION".into(), "westeurope".into());

        let report = push(&repo, "acme/todo", &items(), false).await.unwrap();

        assert_eq!(report.count(PushAction::Skipped), 2);
        assert_eq!(report.count(PushAction::Set), 2);
        assert_eq!(repo.secrets.lock().unwrap()["AZURE_CLIENT_ID"], "old");
    }

    #[tokio::test]
    async fn test_force_overwrites() {
        let repo = FakeRepo::default();
        repo.secrets
            .lock()
            .unwrap()
            .insert("AZURE_CLIENT_ID".into(), "old".into());
        repo.variables
            .lock()
            .unwrap()
            .insert("AZURE_ENV_NAME".into(), "dev".into());

        let report = push(&repo, "acme/todo", &items(), true).await.unwrap();

        assert_eq!(repo.secrets.lock().unwrap()["AZURE_CLIENT_ID"], "app-1");
        // Same value: no write even with force.
        assert_eq!(report.count(PushAction::Unchanged), 1);
        assert_eq!(report.count(PushAction::Set), 3);
    }

    #[test]
    fn test_debug_hides_value() {
        let item = PushItem::secret("POSTGRES_PASSWORD", "hunter2");
        assert!(!format!("{:?}", item).contains("hunter2"));
    }
}
