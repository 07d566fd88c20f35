//! Host-side retrieval and verification of dependency manager installers
//!
//! Used when the recipe pins the installer by checksum: the script is fetched
//! and verified before anything runs, and only verified bytes enter the image.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("Failed to fetch installer from {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Installer checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

#[async_trait]
pub trait InstallerFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, InstallerError>;
}

/// Fetches installers over HTTPS with reqwest
pub struct HttpInstallerFetcher {
    client: reqwest::Client,
}

impl HttpInstallerFetcher {
    pub fn new(timeout: Duration) -> Result<Self, InstallerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("webagent-image/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InstallerError::Fetch {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl InstallerFetcher for HttpInstallerFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, InstallerError> {
        let fetch_error = |message: String| InstallerError::Fetch {
            url: url.to_string(),
            message,
        };

        debug!(url, "Fetching installer");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?
            .error_for_status()
            .map_err(|e| fetch_error(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if bytes.is_empty() {
            return Err(fetch_error("empty response body".to_string()));
        }

        info!(url, bytes = bytes.len(), "Fetched installer");
        Ok(bytes.to_vec())
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compares against the expected digest, case-insensitively.
pub fn verify_checksum(data: &[u8], expected: &str) -> Result<(), InstallerError> {
    let actual = sha256_hex(data);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(InstallerError::ChecksumMismatch {
            expected: expected.to_lowercase(),
            actual,
        })
    }
}

/// Fetches an installer and returns it only if its digest matches.
pub async fn fetch_verified(
    fetcher: &dyn InstallerFetcher,
    url: &str,
    expected_sha256: &str,
) -> Result<Vec<u8>, InstallerError> {
    let data = fetcher.fetch(url).await?;
    verify_checksum(&data, expected_sha256)?;
    debug!(url, sha256 = %expected_sha256, "Installer checksum verified");
    Ok(data)
}

/// Serves fixed bytes; for tests and offline builds with a vendored installer.
pub struct StaticInstallerFetcher {
    data: Vec<u8>,
}

impl StaticInstallerFetcher {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl InstallerFetcher for StaticInstallerFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, InstallerError> {
        Ok(self.data.clone())
    }
}
