//! The watch list document: titles, their channels and the last marker seen
//! on each channel.
//!
//! The on-disk key names (`game_list`, `manifest_list`, `hipchat_color`, ...)
//! are kept compatible with existing data files, and unknown keys are carried
//! through untouched so rewriting a marker never drops operator data.

use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::release::Marker;

type Extra = serde_json::Map<String, serde_json::Value>;

// ── Document ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchList {
    #[serde(rename = "hipchat_configuration", default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<ChatCredentials>,
    #[serde(rename = "jira_configuration", default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<TrackerCredentials>,
    #[serde(rename = "game_list", default)]
    pub titles: IndexMap<String, TitleConfig>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCredentials {
    /// May reference an environment variable as `${NAME}`.
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerCredentials {
    pub host: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub username: String,
    /// May reference an environment variable as `${NAME}`.
    pub password: String,
}

fn default_protocol() -> String {
    "https".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleConfig {
    pub name: String,
    #[serde(rename = "hipchat_color", default = "default_color")]
    pub color: String,
    #[serde(rename = "jira_project_key", default, skip_serializing_if = "Option::is_none")]
    pub tracker_project_key: Option<String>,
    #[serde(rename = "jira_project_id", default, skip_serializing_if = "Option::is_none")]
    pub tracker_project_id: Option<ProjectId>,
    /// Poll interval in milliseconds, inherited by channels without their own.
    #[serde(rename = "query_interval", default, skip_serializing_if = "Option::is_none")]
    pub query_interval_ms: Option<u64>,
    #[serde(rename = "manifest_list", default)]
    pub channels: IndexMap<String, ChannelConfig>,
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_color() -> String {
    "yellow".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub manifest_url: String,
    #[serde(rename = "query_interval", default, skip_serializing_if = "Option::is_none")]
    pub query_interval_ms: Option<u64>,
    #[serde(default)]
    pub enabled: Flag,
    #[serde(rename = "last_updated", default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Marker>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Enabled flag as written by hand: `true`, `"1"`, `1`, ...
///
/// Kept in its original shape so a rewrite preserves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Number(i64),
    Text(String),
}

impl Flag {
    pub fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Number(n) => *n != 0,
            Flag::Text(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        }
    }
}

impl Default for Flag {
    fn default() -> Self {
        Flag::Bool(false)
    }
}

/// Tracker project id, stored either as a number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectId {
    Number(u64),
    Text(String),
}

impl ProjectId {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ProjectId::Number(n) => Some(*n),
            ProjectId::Text(s) => s.trim().parse().ok(),
        }
    }
}

// ── Runtime views ─────────────────────────────────────────────

/// A monitored product. Immutable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct Title {
    pub key: String,
    pub name: String,
    pub color: String,
    pub tracker: Option<TrackerProject>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerProject {
    pub key: String,
    pub id: u64,
}

/// A release channel of a title. The last seen marker lives in the state
/// store, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub key: String,
    pub name: String,
    pub manifest_url: String,
    pub interval: Duration,
    pub enabled: bool,
}

/// A title together with its channels, in document order.
#[derive(Debug, Clone)]
pub struct WatchedTitle {
    pub title: Title,
    pub channels: Vec<Channel>,
}

/// Keys become archive directory names, so they must be a single plain
/// path component.
fn check_key(key: &str) -> Result<(), String> {
    if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
        return Err(format!("key '{key}' is not usable as a directory name"));
    }
    Ok(())
}

impl TitleConfig {
    fn to_title(&self, key: &str) -> Result<Title, ConfigError> {
        check_key(key).map_err(|reason| ConfigError::Title {
            title: key.to_string(),
            reason,
        })?;

        let tracker = match (&self.tracker_project_key, &self.tracker_project_id) {
            (None, _) => None,
            (Some(project), Some(id)) => {
                let id = id.as_u64().ok_or_else(|| ConfigError::Title {
                    title: key.to_string(),
                    reason: format!("jira_project_id {id:?} is not a number"),
                })?;
                Some(TrackerProject {
                    key: project.clone(),
                    id,
                })
            }
            (Some(_), None) => {
                return Err(ConfigError::Title {
                    title: key.to_string(),
                    reason: "jira_project_key is set without jira_project_id".to_string(),
                })
            }
        };

        Ok(Title {
            key: key.to_string(),
            name: self.name.clone(),
            color: self.color.clone(),
            tracker,
        })
    }
}

impl ChannelConfig {
    fn to_channel(
        &self,
        title_key: &str,
        key: &str,
        inherited_interval_ms: Option<u64>,
    ) -> Result<Channel, ConfigError> {
        let invalid = |reason: String| ConfigError::Channel {
            title: title_key.to_string(),
            channel: key.to_string(),
            reason,
        };

        check_key(key).map_err(invalid)?;

        let interval_ms = self
            .query_interval_ms
            .or(inherited_interval_ms)
            .ok_or_else(|| invalid("no query_interval on channel or title".to_string()))?;
        if interval_ms == 0 {
            return Err(invalid("query_interval must be greater than zero".to_string()));
        }

        Url::parse(&self.manifest_url)
            .map_err(|e| invalid(format!("manifest_url '{}': {e}", self.manifest_url)))?;

        Ok(Channel {
            key: key.to_string(),
            name: self.name.clone(),
            manifest_url: self.manifest_url.clone(),
            interval: Duration::from_millis(interval_ms),
            enabled: self.enabled.is_set(),
        })
    }
}

impl WatchList {
    /// Parse and validate a watch list document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let list: Self = serde_json::from_str(json)?;
        list.validate()?;
        Ok(list)
    }

    /// Load a watch list from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Serialize for writing back to disk.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, ConfigError> {
        let mut out = serde_json::to_vec_pretty(self)?;
        out.push(b'\n');
        Ok(out)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.titles().map(|_| ())
    }

    /// Resolve every title and channel into its runtime view.
    pub fn titles(&self) -> Result<Vec<WatchedTitle>, ConfigError> {
        self.titles
            .iter()
            .map(|(key, cfg)| {
                let title = cfg.to_title(key)?;
                let channels = cfg
                    .channels
                    .iter()
                    .map(|(ch_key, ch)| ch.to_channel(key, ch_key, cfg.query_interval_ms))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(WatchedTitle { title, channels })
            })
            .collect()
    }

    /// Last marker recorded for a channel. Blank markers count as absent.
    pub fn last_marker(&self, title: &str, channel: &str) -> Option<&Marker> {
        self.titles
            .get(title)?
            .channels
            .get(channel)?
            .last_updated
            .as_ref()
            .filter(|m| !m.is_empty())
    }

    /// Record a new marker. Returns `false` if the channel is unknown.
    pub fn set_marker(&mut self, title: &str, channel: &str, marker: Marker) -> bool {
        match self
            .titles
            .get_mut(title)
            .and_then(|t| t.channels.get_mut(channel))
        {
            Some(ch) => {
                ch.last_updated = Some(marker);
                true
            }
            None => false,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.titles.values().map(|t| t.channels.len()).sum()
    }
}
