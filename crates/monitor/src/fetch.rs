//! Manifest retrieval.

use std::time::Duration;

use async_trait::async_trait;
use pitbot_core::ManifestRecord;

use crate::error::{FetchError, PollError};
use crate::manifest::parse_manifest;

/// Source of the current manifest for a channel.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch and parse the manifest published at `url`.
    async fn fetch(&self, url: &str) -> Result<ManifestRecord, PollError>;
}

/// Fetches manifests over HTTP(S) with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpManifestFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpManifestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pitbot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, timeout })
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                after: self.timeout,
            }
        } else {
            FetchError::Request {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

#[async_trait]
impl ManifestSource for HttpManifestFetcher {
    async fn fetch(&self, url: &str) -> Result<ManifestRecord, PollError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            }
            .into());
        }

        let body = response.bytes().await.map_err(|e| self.classify(url, e))?;
        tracing::debug!(url, bytes = body.len(), "manifest fetched");
        Ok(parse_manifest(body)?)
    }
}
