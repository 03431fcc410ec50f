//! Error types for the polling pipeline.
//!
//! Every variant here is channel-local: it is logged with the title and
//! channel it concerns and the channel simply waits for its next tick.

use std::path::PathBuf;
use std::time::Duration;

use pitbot_core::ConfigError;

/// The manifest could not be retrieved.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("{url} did not respond within {after:?}")]
    Timeout { url: String, after: Duration },
}

/// The manifest body is not a usable digest document.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed manifest: {0}")]
    Malformed(String),

    #[error("manifest has no root element")]
    Empty,

    #[error("manifest root is <{found}>, expected <digest>")]
    UnexpectedRoot { found: String },

    #[error("manifest is missing the '{0}' attribute")]
    MissingAttribute(&'static str),

    #[error("manifest attribute '{name}' has invalid value '{value}'")]
    InvalidAttribute { name: &'static str, value: String },
}

/// Failure of a single poll before any side effect happened.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} already holds a different manifest")]
    Conflict { path: PathBuf },
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("writing state to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoding state: {0}")]
    Encode(#[from] ConfigError),

    #[error("no channel '{title}/{channel}' in the state store")]
    UnknownChannel { title: String, channel: String },
}
