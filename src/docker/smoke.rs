//! HTTP smoke test against a running instance of the application.

use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::error::SmokeError;

/// HTTP request timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// What a successful endpoint call returned.
#[derive(Debug, Clone)]
pub struct EndpointReport {
    pub url: String,
    pub status: u16,
    /// `status` field of a JSON body, if any (e.g. "Healthy").
    pub reported_status: Option<String>,
}

/// Smoke tester for `/health` and the API endpoint.
pub struct SmokeTester {
    http_client: reqwest::Client,
    base_url: Url,
    health_path: String,
    api_path: String,
}

impl SmokeTester {
    /// Create a new smoke tester.
    pub fn new(base_url: &str, health_path: &str, api_path: &str) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        let base_url = Url::parse(base_url).context("Invalid base URL")?;

        Ok(Self {
            http_client,
            base_url,
            health_path: health_path.to_string(),
            api_path: api_path.to_string(),
        })
    }

    pub fn health_url(&self) -> String {
        self.join(&self.health_path)
    }

    pub fn api_url(&self) -> String {
        self.join(&self.api_path)
    }

    fn join(&self, path: &str) -> String {
        self.base_url
            .join(path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{}", self.base_url, path))
    }

    /// Poll `/health` until it answers 2xx or the attempts run out.
    pub async fn wait_healthy(
        &self,
        attempts: u32,
        interval: Duration,
    ) -> Result<EndpointReport, SmokeError> {
        let url = self.health_url();
        for attempt in 1..=attempts {
            match self.get(&url).await {
                Ok(report) => {
                    info!("Health endpoint answered after {} attempt(s)", attempt);
                    return Ok(report);
                }
                Err(e) => debug!("Health attempt {}/{}: {}", attempt, attempts, e),
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Err(SmokeError::NotHealthy { url, attempts })
    }

    /// Single call to the API endpoint; must answer 2xx.
    pub async fn check_api(&self) -> Result<EndpointReport, SmokeError> {
        self.get(&self.api_url()).await
    }

    async fn get(&self, url: &str) -> Result<EndpointReport, SmokeError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|source| SmokeError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SmokeError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        Ok(EndpointReport {
            url: url.to_string(),
            status: status.as_u16(),
            reported_status: reported_status(&body),
        })
    }
}

/// Extract a status string from a health payload: either a JSON object with a
/// `status` field or a bare text body such as `Healthy`.
fn reported_status(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => map
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string),
        Ok(_) => None,
        Err(_) if trimmed.len() <= 64 => Some(trimmed.to_string()),
        Err(_) => None,
    }
}
