//! HipChat room notifier.
//!
//! Delivers announcements through the v1 `rooms/message` endpoint as HTML
//! messages tagged with the title's color.

use std::time::Duration;

use crate::secrets::resolve_env_vars;
use crate::traits::{Notification, Notifier, NotifyError};

/// Sends room messages via the HipChat v1 API.
#[derive(Debug)]
pub struct HipChatNotifier {
    api_url: String,
    auth_token: String,
    client: reqwest::Client,
}

impl HipChatNotifier {
    /// Creates a notifier for the API at `api_url`.
    ///
    /// `api_key` may be a literal token or contain `${VAR}` references.
    /// Every request is abandoned after `timeout`.
    /// Returns [`NotifyError::Config`] if the resolved token is empty.
    pub fn from_config(api_url: &str, api_key: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let auth_token = resolve_env_vars(api_key)?;
        if auth_token.is_empty() {
            return Err(NotifyError::Config(
                "HipChat api_key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            auth_token,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for HipChatNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let url = format!("{}/v1/rooms/message", self.api_url);
        let notify = if notification.notify { "1" } else { "0" };

        tracing::debug!(
            room_id = %notification.room_id,
            color = %notification.color,
            "Sending HipChat notification"
        );

        let response = self
            .client
            .post(&url)
            .query(&[("format", "json"), ("auth_token", self.auth_token.as_str())])
            .form(&[
                ("room_id", notification.room_id.as_str()),
                ("from", notification.sender.as_str()),
                ("message", notification.message.as_str()),
                ("message_format", "html"),
                ("color", notification.color.as_str()),
                ("notify", notify),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(NotifyError::Status {
                service: "hipchat",
                status,
                body,
            });
        }

        let body: serde_json::Value = response.json().await?;
        if body.get("status").and_then(|v| v.as_str()) == Some("sent") {
            tracing::info!(room_id = %notification.room_id, "HipChat notification sent");
            return Ok(());
        }

        let reason = body
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .unwrap_or("missing status in response")
            .to_string();
        Err(NotifyError::Response {
            service: "hipchat",
            reason,
        })
    }

    fn channel_name(&self) -> &str {
        "hipchat"
    }
}
