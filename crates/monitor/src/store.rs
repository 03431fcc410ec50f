//! Durable last-seen markers.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pitbot_core::{ConfigError, Marker, WatchList};
use tokio::sync::Mutex;

use crate::error::PersistenceError;

/// Where channel markers are read from and committed to.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn last_marker(&self, title: &str, channel: &str) -> Option<Marker>;

    /// Record `marker` as the channel's last seen revision and make it
    /// durable. The in-memory value is updated even when the durable write
    /// fails, so calling this again retries the write.
    async fn commit(&self, title: &str, channel: &str, marker: &Marker)
        -> Result<(), PersistenceError>;
}

/// Keeps markers inside the watch list document and rewrites the whole
/// document on every commit.
///
/// Writes go to a sibling temp file that is then renamed over the original,
/// so a crash mid-write never leaves a truncated document. All commits are
/// serialized through one lock.
pub struct JsonStateStore {
    path: PathBuf,
    list: Mutex<WatchList>,
}

impl JsonStateStore {
    /// Load and validate the document at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let list = WatchList::load(&path)?;
        Ok(Self::new(path, list))
    }

    pub fn new(path: impl Into<PathBuf>, list: WatchList) -> Self {
        Self {
            path: path.into(),
            list: Mutex::new(list),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current document, including uncommitted markers.
    pub async fn snapshot(&self) -> WatchList {
        self.list.lock().await.clone()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("state"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn write_document(&self, bytes: &[u8]) -> Result<(), PersistenceError> {
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|source| PersistenceError::Io {
                path: tmp.clone(),
                source,
            })?;
        if let Err(source) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PersistenceError::Io {
                path: self.path.clone(),
                source,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn last_marker(&self, title: &str, channel: &str) -> Option<Marker> {
        self.list.lock().await.last_marker(title, channel).cloned()
    }

    async fn commit(
        &self,
        title: &str,
        channel: &str,
        marker: &Marker,
    ) -> Result<(), PersistenceError> {
        let mut list = self.list.lock().await;
        if !list.set_marker(title, channel, marker.clone()) {
            return Err(PersistenceError::UnknownChannel {
                title: title.to_string(),
                channel: channel.to_string(),
            });
        }
        let bytes = list.to_json_pretty()?;
        self.write_document(&bytes).await?;
        tracing::debug!(title, channel, marker = %marker, path = %self.path.display(), "state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
  "hipchat_configuration": { "api_key": "k" },
  "game_list": {
    "ps2": {
      "name": "PlanetSide 2",
      "query_interval": 60000,
      "custom_note": "kept",
      "manifest_list": {
        "live": {
          "name": "Live",
          "manifest_url": "http://example.com/live.xml",
          "enabled": true,
          "last_updated": "100"
        },
        "beta": {
          "name": "Beta",
          "manifest_url": "http://example.com/beta.xml"
        }
      }
    }
  }
}"#;

    fn store_in(dir: &tempfile::TempDir) -> JsonStateStore {
        let path = dir.path().join("data.json");
        std::fs::write(&path, DOC).unwrap();
        JsonStateStore::open(&path).unwrap()
    }

    #[tokio::test]
    async fn reads_markers() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(
            store.last_marker("ps2", "live").await,
            Some(Marker::new("100"))
        );
        assert_eq!(store.last_marker("ps2", "beta").await, None);
        assert_eq!(store.last_marker("eq", "live").await, None);
    }

    #[tokio::test]
    async fn commit_rewrites_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store
            .commit("ps2", "beta", &Marker::new("1690000000"))
            .await
            .unwrap();

        let reloaded = WatchList::load(store.path()).unwrap();
        assert_eq!(
            reloaded.last_marker("ps2", "beta"),
            Some(&Marker::new("1690000000"))
        );
        assert_eq!(reloaded.last_marker("ps2", "live"), Some(&Marker::new("100")));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["game_list"]["ps2"]["custom_note"], "kept");
        assert!(!dir.path().join("data.json.tmp").exists());
    }

    #[tokio::test]
    async fn unknown_channel() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let err = store
            .commit("ps2", "nope", &Marker::new("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::UnknownChannel { .. }));
    }

    #[tokio::test]
    async fn failed_write_keeps_memory_updated() {
        let dir = tempfile::tempdir().unwrap();
        let list = WatchList::from_json(DOC).unwrap();
        // The parent directory does not exist, so the temp write fails.
        let store = JsonStateStore::new(dir.path().join("missing").join("data.json"), list);

        let err = store
            .commit("ps2", "live", &Marker::new("200"))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Io { .. }));
        assert_eq!(
            store.last_marker("ps2", "live").await,
            Some(Marker::new("200"))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_commits_all_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(store_in(&dir));

        for round in 0..20u32 {
            let live = Marker::new((1000 + round).to_string());
            let beta = Marker::new((2000 + round).to_string());
            let (a, b) = tokio::join!(
                tokio::spawn({
                    let store = store.clone();
                    async move { store.commit("ps2", "live", &live).await }
                }),
                tokio::spawn({
                    let store = store.clone();
                    async move { store.commit("ps2", "beta", &beta).await }
                }),
            );
            a.unwrap().unwrap();
            b.unwrap().unwrap();

            let reloaded = WatchList::load(store.path()).unwrap();
            assert_eq!(
                reloaded.last_marker("ps2", "live"),
                Some(&Marker::new((1000 + round).to_string()))
            );
            assert_eq!(
                reloaded.last_marker("ps2", "beta"),
                Some(&Marker::new((2000 + round).to_string()))
            );
        }
        assert!(!dir.path().join("data.json.tmp").exists());
    }
}
