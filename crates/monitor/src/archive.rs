//! On-disk manifest archive.
//!
//! Layout: `{root}/{title_key}/{channel_key}/{YYYY-MM-DD THH-MM-SS}.xml`,
//! named by the manifest's own timestamp in UTC. Archived files are never
//! overwritten.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use pitbot_core::stamp::archive_stamp;
use pitbot_core::ReleaseEvent;
use tokio::io::AsyncWriteExt;

use crate::error::ArchiveError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Written(PathBuf),
    /// The file already existed with identical content.
    AlreadyArchived(PathBuf),
}

impl ArchiveOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Written(p) | Self::AlreadyArchived(p) => p,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    root: PathBuf,
}

impl ArchiveWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dir_for(&self, event: &ReleaseEvent) -> PathBuf {
        self.root.join(&event.title_key).join(&event.channel_key)
    }

    pub fn path_for(&self, event: &ReleaseEvent) -> PathBuf {
        self.dir_for(event)
            .join(format!("{}.xml", archive_stamp(&event.published_at())))
    }

    /// Store the raw manifest bytes of `event`.
    pub async fn write(&self, event: &ReleaseEvent) -> Result<ArchiveOutcome, ArchiveError> {
        let dir = self.dir_for(event);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ArchiveError::Io {
                path: dir.clone(),
                source,
            })?;

        let path = self.path_for(event);
        let raw = event.record.raw.as_ref();

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return self.compare_existing(path, raw).await;
            }
            Err(source) => return Err(ArchiveError::Io { path, source }),
        };

        let written = match file.write_all(raw).await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };

        if let Err(source) = written {
            // Leave no partial archive behind.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(ArchiveError::Io { path, source });
        }

        tracing::debug!(path = %path.display(), bytes = raw.len(), "manifest archived");
        Ok(ArchiveOutcome::Written(path))
    }

    async fn compare_existing(&self, path: PathBuf, raw: &[u8]) -> Result<ArchiveOutcome, ArchiveError> {
        let existing = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(source) => return Err(ArchiveError::Io { path, source }),
        };
        if existing == raw {
            Ok(ArchiveOutcome::AlreadyArchived(path))
        } else {
            Err(ArchiveError::Conflict { path })
        }
    }
}
