use thiserror::Error;

/// Errors raised while loading or validating the watch list document.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("title '{title}': {reason}")]
    Title { title: String, reason: String },

    #[error("channel '{title}/{channel}': {reason}")]
    Channel {
        title: String,
        channel: String,
        reason: String,
    },
}
