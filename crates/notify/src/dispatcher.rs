//! Turns a release event into a chat announcement and, for release
//! channels, an issue-tracker version.
//!
//! The chat message and the tracker version are delivered concurrently and
//! independently: a failure in one never suppresses the other. Each delivery
//! is bounded by the dispatcher's delivery timeout. Nothing here is retried.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pitbot_core::stamp::{
    archive_stamp, display_stamp, user_release_date, version_description, version_name,
};
use pitbot_core::{Channel, ReleaseEvent, Title, TrackerProject};
use url::Url;

use crate::templating::{
    AnnouncementContext, NamedKey, TemplateRenderer, DEFAULT_ANNOUNCEMENT_TEMPLATE,
};
use crate::traits::{DispatchResult, NewVersion, Notification, Notifier, NotifyError, ReleaseTracker};

/// Chat room announcements are posted to.
#[derive(Debug, Clone)]
pub struct Room {
    pub room_id: String,
    pub sender: String,
}

/// Upper bound on a single delivery unless overridden.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Sends release announcements and records tracker versions.
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    tracker: Option<Arc<dyn ReleaseTracker>>,
    room: Room,
    archive_base_url: String,
    renderer: TemplateRenderer,
    template: String,
    delivery_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher that posts to `room` and links into the public
    /// archive at `archive_base_url`.
    pub fn new(notifier: Arc<dyn Notifier>, room: Room, archive_base_url: impl Into<String>) -> Self {
        Self {
            notifier,
            tracker: None,
            room,
            archive_base_url: archive_base_url.into(),
            renderer: TemplateRenderer::new(),
            template: DEFAULT_ANNOUNCEMENT_TEMPLATE.to_string(),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    /// Give up on a chat message or tracker version after `timeout`.
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Also record versions for release channels in `tracker`.
    pub fn with_tracker(mut self, tracker: Arc<dyn ReleaseTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Replace the announcement template. The template is syntax-checked here.
    pub fn with_template(mut self, template: impl Into<String>) -> Result<Self, NotifyError> {
        let template = template.into();
        self.renderer
            .validate(&template)
            .map_err(|e| NotifyError::Config(format!("invalid announcement template: {e}")))?;
        self.template = template;
        Ok(self)
    }

    /// Check that the archive base url can carry manifest links.
    pub fn validate(&self) -> Result<(), NotifyError> {
        self.archive_base().map(|_| ())
    }

    fn archive_base(&self) -> Result<Url, NotifyError> {
        let url = Url::parse(&self.archive_base_url).map_err(|e| {
            NotifyError::Config(format!("archive base url '{}': {e}", self.archive_base_url))
        })?;
        if url.cannot_be_a_base() {
            return Err(NotifyError::Config(format!(
                "archive base url '{}' cannot carry a path",
                self.archive_base_url
            )));
        }
        Ok(url)
    }

    /// Public link to the archived manifest of `event`.
    ///
    /// Path segments are percent-encoded, so the space in the archive stamp
    /// becomes `%20`.
    pub fn manifest_url(&self, event: &ReleaseEvent) -> Result<String, NotifyError> {
        let mut url = self.archive_base()?;
        let file_name = format!("{}.xml", archive_stamp(&event.published_at()));
        url.path_segments_mut()
            .map_err(|_| {
                NotifyError::Config(format!(
                    "archive base url '{}' cannot carry a path",
                    self.archive_base_url
                ))
            })?
            .pop_if_empty()
            .extend([
                event.title_key.as_str(),
                event.channel_key.as_str(),
                file_name.as_str(),
            ]);
        Ok(url.to_string())
    }

    /// Render the chat message for `event`.
    pub fn announcement(
        &self,
        title: &Title,
        channel: &Channel,
        event: &ReleaseEvent,
    ) -> Result<Notification, NotifyError> {
        let ctx = AnnouncementContext {
            title: NamedKey {
                key: title.key.clone(),
                name: title.name.clone(),
            },
            channel: NamedKey {
                key: channel.key.clone(),
                name: channel.name.clone(),
            },
            time: display_stamp(&event.published_at()),
            manifest_url: self.manifest_url(event)?,
            marker: event.marker().to_string(),
            previous_marker: event.previous.as_ref().map(|m| m.to_string()),
            package_size_kb: event.record.package_size_kb,
        };

        Ok(Notification {
            room_id: self.room.room_id.clone(),
            sender: self.room.sender.clone(),
            message: self.renderer.render(&self.template, &ctx)?,
            color: title.color.clone(),
            notify: true,
        })
    }

    /// Announce `event` and, when applicable, record a tracker version.
    ///
    /// Returns one result for the chat message and, if the tracker was
    /// involved, one for the tracker version.
    pub async fn dispatch(
        &self,
        title: &Title,
        channel: &Channel,
        event: &ReleaseEvent,
    ) -> Vec<DispatchResult> {
        let chat = async {
            let start = Instant::now();
            let target = self.notifier.channel_name();
            let result = match self.announcement(title, channel, event) {
                Ok(notification) => self.bounded(target, self.notifier.send(&notification)).await,
                Err(e) => Err(e),
            };
            finish(target, event, result, start)
        };

        let tracker = async {
            let tracker = self.tracker.as_ref()?;
            let project = title.tracker.as_ref()?;
            if !event.is_release_channel() {
                return None;
            }
            let start = Instant::now();
            let target = tracker.tracker_name();
            let result = self
                .bounded(target, record_release(tracker.as_ref(), project, channel, event))
                .await;
            Some(finish(target, event, result, start))
        };

        let (chat, tracker) = tokio::join!(chat, tracker);

        let mut results = Vec::with_capacity(2);
        results.push(chat);
        results.extend(tracker);
        results
    }

    async fn bounded(
        &self,
        target: &str,
        delivery: impl Future<Output = Result<(), NotifyError>>,
    ) -> Result<(), NotifyError> {
        tokio::time::timeout(self.delivery_timeout, delivery)
            .await
            .unwrap_or_else(|_| {
                Err(NotifyError::Timeout {
                    target: target.to_string(),
                    after: self.delivery_timeout,
                })
            })
    }
}

/// Build the tracker version for a release on `channel`.
pub fn release_version(project: &TrackerProject, channel: &Channel, event: &ReleaseEvent) -> NewVersion {
    let at = event.published_at();
    NewVersion {
        project_id: project.id,
        name: version_name(&channel.name, &at),
        description: version_description(&channel.name, &at),
        released: true,
        user_release_date: user_release_date(&at),
    }
}

/// Create the version, then re-assert `released` on it: not every tracker
/// honours the flag on creation.
async fn record_release(
    tracker: &dyn ReleaseTracker,
    project: &TrackerProject,
    channel: &Channel,
    event: &ReleaseEvent,
) -> Result<(), NotifyError> {
    let version = release_version(project, channel, event);
    let id = tracker.create_version(&version).await?;
    tracing::info!(
        project = %project.key,
        version = %version.name,
        version_id = %id,
        "Created tracker version"
    );
    tracker.edit_version(&id, true).await?;
    tracing::info!(project = %project.key, version = %version.name, "Released tracker version");
    Ok(())
}

fn finish(
    target: &str,
    event: &ReleaseEvent,
    result: Result<(), NotifyError>,
    start: Instant,
) -> DispatchResult {
    let duration_ms = start.elapsed().as_millis() as u64;
    let (success, error) = match result {
        Ok(()) => {
            tracing::info!(
                title = %event.title_key,
                channel = %event.channel_key,
                delivery = target,
                duration_ms,
                "Release notification delivered"
            );
            (true, None)
        }
        Err(e) => {
            tracing::warn!(
                title = %event.title_key,
                channel = %event.channel_key,
                delivery = target,
                error = %e,
                duration_ms,
                "Release notification failed"
            );
            (false, Some(e.to_string()))
        }
    };

    DispatchResult {
        target: target.to_string(),
        success,
        error,
        duration_ms,
    }
}
