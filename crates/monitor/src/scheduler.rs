//! Per-channel polling cadence.
//!
//! Every channel gets its own timer task. On start, enabled channels poll
//! once immediately; after that every channel, enabled or not, polls on each
//! tick of its interval. Each poll runs as its own task so a slow channel
//! never delays another channel's timer, and overlapping ticks of the same
//! channel are skipped by [`ChannelWatcher`].

use std::sync::Arc;

use futures::future::join_all;
use pitbot_core::WatchedTitle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::PollError;
use crate::watcher::{ChannelWatcher, Pipeline, PollOutcome};

pub struct Scheduler {
    watchers: Vec<Arc<ChannelWatcher>>,
}

impl Scheduler {
    pub fn new(titles: Vec<WatchedTitle>, pipeline: Arc<Pipeline>) -> Self {
        let watchers = titles
            .into_iter()
            .flat_map(|watched| {
                let title = Arc::new(watched.title);
                let pipeline = pipeline.clone();
                watched.channels.into_iter().map(move |channel| {
                    Arc::new(ChannelWatcher::new(title.clone(), channel, pipeline.clone()))
                })
            })
            .collect();
        Self { watchers }
    }

    pub fn watchers(&self) -> &[Arc<ChannelWatcher>] {
        &self.watchers
    }

    /// Poll every enabled channel once, concurrently, and wait for all of
    /// them.
    pub async fn poll_enabled_once(&self) -> Vec<Result<PollOutcome, PollError>> {
        join_all(
            self.watchers
                .iter()
                .filter(|w| w.channel().enabled)
                .map(|w| w.poll_and_log()),
        )
        .await
    }

    /// Start one timer task per channel. Tasks exit once `shutdown` turns
    /// `true` or its sender is dropped; polls already in flight finish on
    /// their own.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        tracing::info!(channels = self.watchers.len(), "Starting channel timers");
        self.watchers
            .iter()
            .map(|watcher| tokio::spawn(channel_loop(watcher.clone(), shutdown.clone())))
            .collect()
    }
}

fn spawn_poll(watcher: &Arc<ChannelWatcher>) {
    let watcher = watcher.clone();
    tokio::spawn(async move {
        let _ = watcher.poll_and_log().await;
    });
}

async fn channel_loop(watcher: Arc<ChannelWatcher>, mut shutdown: watch::Receiver<bool>) {
    if *shutdown.borrow() {
        return;
    }

    let channel = watcher.channel();
    let period = channel.interval;
    tracing::debug!(
        title = %watcher.title().key,
        channel = %channel.key,
        enabled = channel.enabled,
        interval_ms = period.as_millis() as u64,
        "Channel timer started"
    );

    if channel.enabled {
        spawn_poll(&watcher);
    }

    // Disabled channels still poll on every tick; only the startup poll
    // honours the flag.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => spawn_poll(&watcher),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::debug!(
        title = %watcher.title().key,
        channel = %watcher.channel().key,
        "Channel timer stopped"
    );
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pitbot_core::{Channel, Marker};

    use super::*;
    use crate::archive::ArchiveWriter;
    use crate::testing::{dispatcher, manifest, title, FakeSource, MemoryStore, RecordingNotifier};

    fn channel(key: &str, interval: Duration, enabled: bool) -> Channel {
        Channel {
            key: key.to_string(),
            name: key.to_string(),
            manifest_url: format!("http://manifests.test/{key}.xml"),
            interval,
            enabled,
        }
    }

    struct Setup {
        scheduler: Scheduler,
        source: Arc<FakeSource>,
        store: Arc<MemoryStore>,
        _dir: tempfile::TempDir,
    }

    fn setup(channels: Vec<Channel>) -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new();
        let store = Arc::new(MemoryStore::default());
        let pipeline = Arc::new(Pipeline::new(
            source.clone(),
            store.clone(),
            ArchiveWriter::new(dir.path()),
            Arc::new(dispatcher(RecordingNotifier::new())),
        ));
        let scheduler = Scheduler::new(
            vec![WatchedTitle {
                title: title(),
                channels,
            }],
            pipeline,
        );
        Setup {
            scheduler,
            source,
            store,
            _dir: dir,
        }
    }

    #[test]
    fn one_watcher_per_channel() {
        let s = setup(vec![
            channel("live", Duration::from_secs(60), true),
            channel("test", Duration::from_secs(60), false),
        ]);
        let keys: Vec<_> = s
            .scheduler
            .watchers()
            .iter()
            .map(|w| w.channel().key.clone())
            .collect();
        assert_eq!(keys, ["live", "test"]);
    }

    #[tokio::test]
    async fn once_skips_disabled_channels() {
        let s = setup(vec![
            channel("live", Duration::from_secs(60), true),
            channel("test", Duration::from_secs(60), false),
        ]);
        s.source.serve(manifest("1690000000"));

        let results = s.scheduler.poll_enabled_once().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Ok(PollOutcome::Released(_))));
        assert_eq!(s.store.get("ps2", "live"), Some(Marker::new("1690000000")));
        assert_eq!(s.store.get("ps2", "test"), None);
    }

    #[tokio::test]
    async fn enabled_channel_polls_immediately() {
        let s = setup(vec![channel("live", Duration::from_secs(3600), true)]);
        s.source.serve(manifest("1690000000"));
        let (tx, rx) = watch::channel(false);

        let handles = s.scheduler.spawn(rx);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(s.source.calls(), 1);

        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn disabled_channel_waits_for_first_tick() {
        let s = setup(vec![channel("test", Duration::from_millis(150), false)]);
        s.source.serve(manifest("1690000000"));
        let (tx, rx) = watch::channel(false);

        let handles = s.scheduler.spawn(rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(s.source.calls(), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(s.source.calls() >= 1);
        assert_eq!(s.store.get("ps2", "test"), Some(Marker::new("1690000000")));

        drop(tx);
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn failed_poll_keeps_timer_running() {
        let s = setup(vec![channel("live", Duration::from_millis(50), true)]);
        s.source.fail();
        let (tx, rx) = watch::channel(false);

        let handles = s.scheduler.spawn(rx);
        tokio::time::sleep(Duration::from_millis(80)).await;
        s.source.serve(manifest("1690000000"));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(s.source.calls() >= 2);
        assert_eq!(s.store.get("ps2", "live"), Some(Marker::new("1690000000")));

        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn slow_polls_are_not_stacked() {
        let s = setup(vec![channel("live", Duration::from_millis(20), true)]);
        s.source.serve(manifest("1690000000"));
        s.source.delay(Duration::from_millis(200));
        let (tx, rx) = watch::channel(false);

        let handles = s.scheduler.spawn(rx);
        tokio::time::sleep(Duration::from_millis(150)).await;
        // Several ticks fired, but only the first poll reached the source.
        assert_eq!(s.source.calls(), 1);

        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
