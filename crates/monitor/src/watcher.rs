//! One poll of one channel: fetch, detect, persist, then archive and
//! notify.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pitbot_core::{Channel, ReleaseEvent, Title};
use pitbot_notify::{DispatchResult, Dispatcher};

use crate::archive::{ArchiveOutcome, ArchiveWriter};
use crate::detect::detect;
use crate::error::{ArchiveError, FetchError, PollError};
use crate::fetch::ManifestSource;
use crate::store::StateStore;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PERSIST_ATTEMPTS: u32 = 3;
const DEFAULT_PERSIST_BACKOFF: Duration = Duration::from_millis(500);

/// Collaborators shared by every channel.
pub struct Pipeline {
    source: Arc<dyn ManifestSource>,
    store: Arc<dyn StateStore>,
    archive: ArchiveWriter,
    dispatcher: Arc<Dispatcher>,
    fetch_timeout: Duration,
    persist_attempts: u32,
    persist_backoff: Duration,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn ManifestSource>,
        store: Arc<dyn StateStore>,
        archive: ArchiveWriter,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            source,
            store,
            archive,
            dispatcher,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            persist_attempts: DEFAULT_PERSIST_ATTEMPTS,
            persist_backoff: DEFAULT_PERSIST_BACKOFF,
        }
    }

    /// Upper bound on a whole fetch, whatever the source.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Attempts made to persist a new marker (at least one).
    pub fn persist_attempts(mut self, attempts: u32) -> Self {
        self.persist_attempts = attempts.max(1);
        self
    }

    /// Delay before the second persist attempt; doubles after each failure.
    pub fn persist_backoff(mut self, backoff: Duration) -> Self {
        self.persist_backoff = backoff;
        self
    }

    /// Returns whether the marker reached durable storage.
    async fn persist(&self, event: &ReleaseEvent) -> bool {
        let mut backoff = self.persist_backoff;
        for attempt in 1..=self.persist_attempts {
            match self
                .store
                .commit(&event.title_key, &event.channel_key, event.marker())
                .await
            {
                Ok(()) => return true,
                Err(e) if attempt < self.persist_attempts => {
                    tracing::warn!(
                        title = %event.title_key,
                        channel = %event.channel_key,
                        marker = %event.marker(),
                        attempt,
                        error = %e,
                        "Failed to persist marker, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => {
                    tracing::error!(
                        title = %event.title_key,
                        channel = %event.channel_key,
                        marker = %event.marker(),
                        attempts = self.persist_attempts,
                        error = %e,
                        "Giving up persisting marker; it is kept in memory only"
                    );
                }
            }
        }
        false
    }
}

/// What a single poll did.
#[derive(Debug)]
pub enum PollOutcome {
    Unchanged,
    Released(Box<ReleaseReport>),
    /// The previous poll of this channel was still running.
    Busy,
}

#[derive(Debug)]
pub struct ReleaseReport {
    pub event: ReleaseEvent,
    pub persisted: bool,
    pub archive: Result<ArchiveOutcome, ArchiveError>,
    pub deliveries: Vec<DispatchResult>,
}

/// Polls one channel. At most one poll per channel is in flight.
pub struct ChannelWatcher {
    title: Arc<Title>,
    channel: Channel,
    pipeline: Arc<Pipeline>,
    busy: AtomicBool,
}

/// Clears the busy flag however the poll ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ChannelWatcher {
    pub fn new(title: Arc<Title>, channel: Channel, pipeline: Arc<Pipeline>) -> Self {
        Self {
            title,
            channel,
            pipeline,
            busy: AtomicBool::new(false),
        }
    }

    pub fn title(&self) -> &Title {
        &self.title
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Run one poll. Returns [`PollOutcome::Busy`] without doing anything if
    /// another poll of this channel is in flight.
    pub async fn poll(&self) -> Result<PollOutcome, PollError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(PollOutcome::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        let pipeline = &self.pipeline;
        let url = self.channel.manifest_url.as_str();

        let record = tokio::time::timeout(pipeline.fetch_timeout, pipeline.source.fetch(url))
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
                after: pipeline.fetch_timeout,
            })??;

        let last = pipeline
            .store
            .last_marker(&self.title.key, &self.channel.key)
            .await;
        let Some(event) = detect(&self.title.key, &self.channel.key, record, last.as_ref()) else {
            return Ok(PollOutcome::Unchanged);
        };

        tracing::info!(
            title = %self.title.key,
            channel = %self.channel.key,
            marker = %event.marker(),
            previous = ?event.previous.as_ref().map(|m| m.as_str()),
            "Release detected"
        );

        let persisted = pipeline.persist(&event).await;

        let (archive, deliveries) = tokio::join!(
            pipeline.archive.write(&event),
            pipeline.dispatcher.dispatch(&self.title, &self.channel, &event),
        );

        match &archive {
            Ok(outcome) => tracing::info!(
                title = %self.title.key,
                channel = %self.channel.key,
                path = %outcome.path().display(),
                "Manifest archived"
            ),
            Err(e) => tracing::warn!(
                title = %self.title.key,
                channel = %self.channel.key,
                error = %e,
                "Failed to archive manifest"
            ),
        }

        Ok(PollOutcome::Released(Box::new(ReleaseReport {
            event,
            persisted,
            archive,
            deliveries,
        })))
    }

    /// Poll and log the result.
    pub async fn poll_and_log(&self) -> Result<PollOutcome, PollError> {
        let result = self.poll().await;
        self.log_outcome(&result);
        result
    }

    fn log_outcome(&self, result: &Result<PollOutcome, PollError>) {
        match result {
            Ok(PollOutcome::Unchanged) => tracing::debug!(
                title = %self.title.key,
                channel = %self.channel.key,
                "No change"
            ),
            Ok(PollOutcome::Busy) => tracing::debug!(
                title = %self.title.key,
                channel = %self.channel.key,
                "Previous poll still running, skipping tick"
            ),
            Ok(PollOutcome::Released(_)) => {}
            Err(e) => tracing::warn!(
                title = %self.title.key,
                channel = %self.channel.key,
                url = %self.channel.manifest_url,
                error = %e,
                "Poll failed"
            ),
        }
    }
}
