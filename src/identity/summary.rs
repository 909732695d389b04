//! Setup summary written after `oidc setup` and read by `secrets push`.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ensure::{OidcPlan, SetupReport};
use crate::error::AppError;

/// Default summary file name, relative to the working directory.
pub const DEFAULT_SUMMARY_FILE: &str = "oidc-setup-summary.json";

/// Values a GitHub repository needs to log in to Azure via OIDC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupSummary {
    pub app_name: String,
    pub app_id: String,
    pub tenant_id: String,
    pub subscription_id: String,
    #[serde(rename = "gitHubOrg")]
    pub github_org: String,
    #[serde(rename = "gitHubRepo")]
    pub github_repo: String,
    pub created_at: DateTime<Utc>,
    pub secrets: SummarySecrets,
    pub variables: SummaryVariables,
}

/// Repository secrets, keyed the way the workflows read them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SummarySecrets {
    pub azure_client_id: String,
    pub azure_tenant_id: String,
    pub azure_subscription_id: String,
}

/// Repository variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SummaryVariables {
    pub azure_env_name: String,
    pub azure_location: String,
}

impl SummarySecrets {
    /// `(name, value)` pairs in push order.
    pub fn entries(&self) -> [(&'static str, &str); 3] {
        [
            ("AZURE_CLIENT_ID", self.azure_client_id.as_str()),
            ("AZURE_TENANT_ID", self.azure_tenant_id.as_str()),
            ("AZURE_SUBSCRIPTION_ID", self.azure_subscription_id.as_str()),
        ]
    }
}

impl SummaryVariables {
    pub fn entries(&self) -> [(&'static str, &str); 2] {
        [
            ("AZURE_ENV_NAME", self.azure_env_name.as_str()),
            ("AZURE_LOCATION", self.azure_location.as_str()),
        ]
    }
}

impl SetupSummary {
    /// Summarize a finished setup run, stamped with the current time.
    pub fn from_setup(
        plan: &OidcPlan,
        report: &SetupReport,
        env_name: &str,
        location: &str,
    ) -> Self {
        let app_id = report.client_id().to_string();
        Self {
            app_name: plan.app_name.clone(),
            app_id: app_id.clone(),
            tenant_id: plan.tenant_id.clone(),
            subscription_id: plan.subscription_id.clone(),
            github_org: plan.target.org.clone(),
            github_repo: plan.target.repo.clone(),
            created_at: Utc::now(),
            secrets: SummarySecrets {
                azure_client_id: app_id,
                azure_tenant_id: plan.tenant_id.clone(),
                azure_subscription_id: plan.subscription_id.clone(),
            },
            variables: SummaryVariables {
                azure_env_name: env_name.to_string(),
                azure_location: location.to_string(),
            },
        }
    }

    /// Write pretty-printed JSON, replacing any previous file.
    pub fn write(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("Wrote setup summary to {}", path.display());
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, AppError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
