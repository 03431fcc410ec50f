//! UTC timestamp renderings shared by archive paths, announcements and
//! tracker versions.

use chrono::{DateTime, Utc};

/// Filesystem-safe stamp used for archive file names: `2023-07-22 T04-26-40`.
pub fn archive_stamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d T%H-%M-%S").to_string()
}

/// Human-readable stamp for announcements: `2023-07-22 04:26:40 GMT`.
pub fn display_stamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S GMT").to_string()
}

/// Tracker version name: `Live 2023-07-22`.
pub fn version_name(channel_name: &str, at: &DateTime<Utc>) -> String {
    format!("{} {}", channel_name, at.format("%Y-%m-%d"))
}

/// Tracker version description: `Live July 22 Patch`.
pub fn version_description(channel_name: &str, at: &DateTime<Utc>) -> String {
    format!("{} {} Patch", channel_name, at.format("%B %d"))
}

/// Tracker user-facing release date: `22/Jul/2023`.
pub fn user_release_date(at: &DateTime<Utc>) -> String {
    at.format("%d/%b/%Y").to_string()
}
