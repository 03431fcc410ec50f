//! Manifest revisions and the release events derived from them.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Channel keys whose releases are also recorded in the issue tracker.
pub const RELEASE_CHANNELS: [&str; 2] = ["live", "test"];

/// Whether releases on `channel_key` get an issue-tracker version.
pub fn is_release_channel(channel_key: &str) -> bool {
    RELEASE_CHANNELS.contains(&channel_key)
}

/// Opaque revision marker of a manifest, taken from the document's
/// `timestamp` attribute.
///
/// Markers are compared by equality only. The watch list may store them as
/// JSON strings or numbers; both deserialize to the same marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Marker(String);

impl Marker {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Interpret the marker as Unix seconds.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.0
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Marker {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Marker(s),
            Raw::Number(n) => Marker(n.to_string()),
        })
    }
}

/// Parsed result of a single manifest fetch.
#[derive(Debug, Clone)]
pub struct ManifestRecord {
    pub marker: Marker,
    /// The marker read as a UTC instant; names archives and notifications.
    pub published_at: DateTime<Utc>,
    pub package_size_kb: Option<u64>,
    /// Response body exactly as received.
    pub raw: Bytes,
}

/// A channel's marker changed.
#[derive(Debug, Clone)]
pub struct ReleaseEvent {
    pub title_key: String,
    pub channel_key: String,
    /// Marker known before this fetch; `None` on the first observation.
    pub previous: Option<Marker>,
    pub record: ManifestRecord,
}

impl ReleaseEvent {
    pub fn marker(&self) -> &Marker {
        &self.record.marker
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.record.published_at
    }

    pub fn is_release_channel(&self) -> bool {
        is_release_channel(&self.channel_key)
    }
}
