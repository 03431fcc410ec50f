//! Jira release tracker.
//!
//! Creates project versions through the REST v2 API with basic auth.

use std::time::Duration;

use pitbot_core::TrackerCredentials;

use crate::secrets::resolve_env_vars;
use crate::traits::{NewVersion, NotifyError, ReleaseTracker};

/// Records releases as Jira project versions.
#[derive(Debug)]
pub struct JiraTracker {
    /// `{protocol}://{host}`, no trailing slash.
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl JiraTracker {
    /// Build a tracker from the watch list credentials.
    ///
    /// The password may contain `${VAR}` references. Every request is
    /// abandoned after `timeout`.
    pub fn from_config(
        credentials: &TrackerCredentials,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        if credentials.host.is_empty() {
            return Err(NotifyError::Config("Jira host must not be empty".to_string()));
        }
        let protocol = credentials.protocol.trim_end_matches("://");
        Ok(Self {
            base_url: format!(
                "{}://{}",
                protocol,
                credentials.host.trim_end_matches('/')
            ),
            username: credentials.username.clone(),
            password: resolve_env_vars(&credentials.password)?,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, NotifyError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(NotifyError::Status {
            service: "jira",
            status,
            body,
        })
    }
}

#[async_trait::async_trait]
impl ReleaseTracker for JiraTracker {
    async fn create_version(&self, version: &NewVersion) -> Result<String, NotifyError> {
        let url = format!("{}/rest/api/2/version", self.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(version)
            .send()
            .await?;
        let body: serde_json::Value = Self::check(response).await?.json().await?;

        // Jira returns the id as a string; tolerate a bare number.
        let id = match body.get("id") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                return Err(NotifyError::Response {
                    service: "jira",
                    reason: "created version has no id".to_string(),
                })
            }
        };

        tracing::debug!(version_id = %id, name = %version.name, "Jira version created");
        Ok(id)
    }

    async fn edit_version(&self, version_id: &str, released: bool) -> Result<(), NotifyError> {
        let url = format!("{}/rest/api/2/version/{}", self.base_url, version_id);
        let response = self
            .client
            .put(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&serde_json::json!({ "released": released }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    fn tracker_name(&self) -> &str {
        "jira"
    }
}
