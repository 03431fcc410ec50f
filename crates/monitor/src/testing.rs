//! In-memory fakes for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use pitbot_core::{ManifestRecord, Marker, Title, TrackerProject};
use pitbot_notify::{Dispatcher, Notification, Notifier, NotifyError, Room};

use crate::error::{FetchError, PersistenceError, PollError};
use crate::fetch::ManifestSource;
use crate::store::StateStore;

pub fn manifest(marker: &str) -> ManifestRecord {
    let raw = format!(r#"<digest timestamp="{marker}" packageSizeKB="51200"/>"#);
    let marker = Marker::new(marker);
    ManifestRecord {
        published_at: marker.published_at().unwrap(),
        marker,
        package_size_kb: Some(51200),
        raw: Bytes::from(raw),
    }
}

pub fn title() -> Title {
    Title {
        key: "ps2".to_string(),
        name: "PlanetSide 2".to_string(),
        color: "purple".to_string(),
        tracker: Some(TrackerProject {
            key: "PS".to_string(),
            id: 10100,
        }),
    }
}

pub fn dispatcher(notifier: Arc<RecordingNotifier>) -> Dispatcher {
    Dispatcher::new(
        notifier,
        Room {
            room_id: "1".to_string(),
            sender: "PITBot".to_string(),
        },
        "http://archive.test/manifests",
    )
}

// ── Source ────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSource {
    current: Mutex<Option<ManifestRecord>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every fetch with `record`.
    pub fn serve(&self, record: ManifestRecord) {
        *self.current.lock().unwrap() = Some(record);
    }

    /// Answer every fetch with a timeout error.
    pub fn fail(&self) {
        *self.current.lock().unwrap() = None;
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManifestSource for FakeSource {
    async fn fetch(&self, url: &str) -> Result<ManifestRecord, PollError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let current = self.current.lock().unwrap().clone();
        current.ok_or_else(|| {
            PollError::Fetch(FetchError::Timeout {
                url: url.to_string(),
                after: Duration::from_secs(1),
            })
        })
    }
}

// ── Stores ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    markers: Mutex<HashMap<(String, String), Marker>>,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn set(&self, title: &str, channel: &str, marker: Marker) {
        self.markers
            .lock()
            .unwrap()
            .insert((title.to_string(), channel.to_string()), marker);
    }

    pub fn get(&self, title: &str, channel: &str) -> Option<Marker> {
        self.markers
            .lock()
            .unwrap()
            .get(&(title.to_string(), channel.to_string()))
            .cloned()
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn last_marker(&self, title: &str, channel: &str) -> Option<Marker> {
        self.get(title, channel)
    }

    async fn commit(
        &self,
        title: &str,
        channel: &str,
        marker: &Marker,
    ) -> Result<(), PersistenceError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.set(title, channel, marker.clone());
        Ok(())
    }
}

/// Keeps markers in memory but fails every durable write.
pub struct FailingStore {
    inner: MemoryStore,
    attempts: Arc<AtomicUsize>,
}

impl FailingStore {
    pub fn new(attempts: Arc<AtomicUsize>) -> Self {
        Self {
            inner: MemoryStore::default(),
            attempts,
        }
    }
}

#[async_trait]
impl StateStore for FailingStore {
    async fn last_marker(&self, title: &str, channel: &str) -> Option<Marker> {
        self.inner.get(title, channel)
    }

    async fn commit(
        &self,
        title: &str,
        channel: &str,
        marker: &Marker,
    ) -> Result<(), PersistenceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.set(title, channel, marker.clone());
        Err(PersistenceError::Io {
            path: "data.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

// ── Notifier ──────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

/// Accepts every message and never answers.
pub struct HangingNotifier;

#[async_trait]
impl Notifier for HangingNotifier {
    async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
        std::future::pending().await
    }

    fn channel_name(&self) -> &str {
        "hanging"
    }
}
