//! Notifier and tracker trait definitions and shared error types.

use std::time::Duration;

use serde::Serialize;

/// Errors that can occur while announcing a release.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Unexpected response from {service}: {reason}")]
    Response {
        service: &'static str,
        reason: String,
    },

    #[error("{target} did not answer within {after:?}")]
    Timeout { target: String, after: Duration },

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A rendered chat message ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub room_id: String,
    /// Display name the message is sent as.
    pub sender: String,
    /// HTML body.
    pub message: String,
    pub color: String,
    /// Whether room members get an alert for this message.
    pub notify: bool,
}

/// Trait for chat room implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message to its room.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Test connectivity with a sample message.
    async fn test(&self, room_id: &str, sender: &str) -> Result<(), NotifyError> {
        let test_notification = Notification {
            room_id: room_id.to_string(),
            sender: sender.to_string(),
            message: "[TEST] Release monitor is able to post to this room.".to_string(),
            color: "gray".to_string(),
            notify: false,
        };
        self.send(&test_notification).await
    }

    /// Human-readable name for this channel (e.g., "hipchat").
    fn channel_name(&self) -> &str;
}

/// A version record to create in the issue tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVersion {
    pub project_id: u64,
    pub name: String,
    pub description: String,
    pub released: bool,
    /// `DD/Mon/YYYY`.
    pub user_release_date: String,
}

/// Trait for issue trackers that keep a version per release.
#[async_trait::async_trait]
pub trait ReleaseTracker: Send + Sync {
    /// Create a version, returning its tracker id.
    async fn create_version(&self, version: &NewVersion) -> Result<String, NotifyError>;

    /// Set the released flag of an existing version.
    async fn edit_version(&self, version_id: &str, released: bool) -> Result<(), NotifyError>;

    fn tracker_name(&self) -> &str;
}

/// Result of a single delivery attempt (chat message or tracker version).
#[derive(Debug)]
pub struct DispatchResult {
    pub target: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
