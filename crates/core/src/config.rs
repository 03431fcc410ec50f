use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

/// Process-level settings. Titles, channels and credentials live in the
/// watch list data file, see [`crate::WatchList`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub archive: ArchiveConfig,
    pub chat: ChatConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            monitor: MonitorConfig::from_env(),
            archive: ArchiveConfig::from_env(),
            chat: ChatConfig::from_env(),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  monitor:  data_file={}", self.monitor.data_file.display());
        tracing::info!(
            "  monitor:  fetch_timeout={}s, persist_retries={}",
            self.monitor.fetch_timeout_secs,
            self.monitor.persist_retries
        );
        tracing::info!("  archive:  root={}", self.archive.root.display());
        tracing::info!("  archive:  base_url={}", self.archive.base_url);
        tracing::info!(
            "  chat:     api_url={}, room_id={}, sender={}",
            self.chat.api_url,
            self.chat.room_id,
            self.chat.sender
        );
        tracing::info!(
            "  chat:     notify_timeout={}s, template={}",
            self.chat.notify_timeout_secs,
            self.chat
                .template_file
                .as_ref()
                .map_or_else(|| "<built-in>".to_string(), |p| p.display().to_string())
        );
    }
}

// ── Monitor ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Watch list document, rewritten whenever a channel marker changes.
    pub data_file: PathBuf,
    pub fetch_timeout_secs: u64,
    /// Attempts made to persist an updated marker before giving up.
    pub persist_retries: u32,
}

impl MonitorConfig {
    fn from_env() -> Self {
        Self {
            data_file: PathBuf::from(env_or("PITBOT_DATA_FILE", "data.json")),
            fetch_timeout_secs: env_u64("PITBOT_FETCH_TIMEOUT_SECS", 30),
            persist_retries: env_u32("PITBOT_PERSIST_RETRIES", 3).max(1),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

// ── Archive ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub root: PathBuf,
    /// Public URL that mirrors `root`, used for notification links.
    pub base_url: String,
}

impl ArchiveConfig {
    fn from_env() -> Self {
        Self {
            root: PathBuf::from(env_or("PITBOT_ARCHIVE_DIR", "manifests")),
            base_url: env_or("PITBOT_ARCHIVE_BASE_URL", "http://localhost/manifests"),
        }
    }
}

// ── Chat ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub api_url: String,
    pub room_id: String,
    pub sender: String,
    /// Per-request limit for chat and tracker calls.
    pub notify_timeout_secs: u64,
    /// Announcement template replacing the built-in one.
    pub template_file: Option<PathBuf>,
}

impl ChatConfig {
    fn from_env() -> Self {
        Self {
            api_url: env_or("PITBOT_CHAT_API_URL", "https://api.hipchat.com"),
            room_id: env_or("PITBOT_CHAT_ROOM_ID", "1095869"),
            sender: env_or("PITBOT_CHAT_SENDER", "PITBot"),
            notify_timeout_secs: env_u64("PITBOT_NOTIFY_TIMEOUT_SECS", 10).max(1),
            template_file: env_opt("PITBOT_ANNOUNCEMENT_TEMPLATE").map(PathBuf::from),
        }
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    /// Read the operator's announcement template, if one is configured.
    pub fn announcement_template(&self) -> Result<Option<String>, ConfigError> {
        match &self.template_file {
            Some(path) => Ok(Some(std::fs::read_to_string(path)?)),
            None => Ok(None),
        }
    }
}
