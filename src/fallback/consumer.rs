//! Fallback manifest consumer
//!
//! The receiving peer's half: once the relay announces (or the peer
//! suspects) a fallback feed, poll the manifest URL until it is actually
//! servable, then hand the playable URL to the player. The poll is
//! bounded; a feed that never materializes surfaces as
//! [`FallbackError::ManifestUnavailable`] instead of spinning forever.

use std::time::Duration;

use async_trait::async_trait;

use crate::protocol::constants;

use super::error::FallbackError;

/// Probe-and-fetch access to a published manifest.
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    /// Cheap availability probe (HEAD over HTTP).
    async fn exists(&self, url: &str) -> Result<bool, FallbackError>;

    /// Fetch the manifest body.
    async fn fetch(&self, url: &str) -> Result<String, FallbackError>;
}

/// HTTP-backed fetcher against the relay's static media mount.
pub struct HttpManifestFetcher {
    client: reqwest::Client,
}

impl HttpManifestFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpManifestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ManifestFetcher for HttpManifestFetcher {
    async fn exists(&self, url: &str) -> Result<bool, FallbackError> {
        match self.client.head(url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            // Connection-level failures count as "not yet there".
            Err(e) if e.is_connect() || e.is_timeout() => Ok(false),
            Err(e) => Err(FallbackError::WorkerFailure(format!(
                "manifest probe failed: {}",
                e
            ))),
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, FallbackError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            FallbackError::WorkerFailure(format!("manifest fetch failed: {}", e))
        })?;
        if !response.status().is_success() {
            return Err(FallbackError::WorkerFailure(format!(
                "manifest fetch returned {}",
                response.status()
            )));
        }
        response.text().await.map_err(|e| {
            FallbackError::WorkerFailure(format!("manifest body unreadable: {}", e))
        })
    }
}

/// Bounded-poll consumer for one announced manifest.
pub struct ManifestConsumer<F> {
    fetcher: F,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl<F: ManifestFetcher> ManifestConsumer<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            poll_interval: constants::MANIFEST_POLL_INTERVAL,
            poll_attempts: constants::MANIFEST_POLL_ATTEMPTS,
        }
    }

    pub fn with_poll(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    /// Poll until the manifest at `url` is servable, then fetch it.
    /// Returns the manifest body; the caller hands `url` to the player.
    pub async fn await_manifest(&self, url: &str) -> Result<String, FallbackError> {
        for attempt in 1..=self.poll_attempts {
            if self.fetcher.exists(url).await? {
                tracing::info!(url, attempt, "Fallback manifest available");
                return self.fetcher.fetch(url).await;
            }
            tracing::debug!(url, attempt, "Manifest not yet available");
            if attempt < self.poll_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        tracing::warn!(url, "Fallback manifest never appeared");
        Err(FallbackError::ManifestUnavailable {
            attempts: self.poll_attempts,
        })
    }
}
