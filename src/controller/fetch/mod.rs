//! # Artifact Fetcher
//!
//! Retrieves content-addressed tar.gz artifacts (as published by Flux
//! source-controller) and unpacks them into a directory.
//!
//! ## Flow
//!
//! 1. Download with bounded retries and Fibonacci backoff between attempts
//! 2. Verify the checksum against the digest computed while streaming
//! 3. Check gzip magic bytes
//! 4. Extract member by member, confining every path to the destination

mod download;
mod extract;
mod scratch;
mod secure_path;

pub use download::Checksum;
pub use scratch::ScratchDir;
pub use secure_path::{resolve_within, secure_join};

use crate::controller::backoff::FibonacciBackoff;
use crate::controller::ErrorClass;
use crate::observability::metrics;
use async_trait::async_trait;
use download::AttemptError;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

/// Errors raised while fetching or unpacking an artifact
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to download {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    #[error("failed to download {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unsupported or malformed checksum {0:?}")]
    InvalidChecksum(String),

    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("artifact from {url} is not a gzip archive")]
    NotGzip { url: String },

    #[error("artifact exceeds size limit of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("path {path:?} escapes the artifact root")]
    PathEscape { path: String },

    #[error("failed to extract artifact: {0}")]
    Extract(#[source] std::io::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RetriesExhausted { .. } | Self::Io { .. } => ErrorClass::Transient,
            Self::Status { status, .. } if *status == 404 => ErrorClass::Transient,
            _ => ErrorClass::Data,
        }
    }
}

/// Retry and size settings for artifact downloads
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Attempts after the first one
    pub retries: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub max_download_bytes: Option<u64>,
    pub max_untar_bytes: Option<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            retries: DEFAULT_FETCH_RETRIES,
            backoff_min: Duration::from_millis(DEFAULT_FETCH_BACKOFF_MIN_MS),
            backoff_max: Duration::from_millis(DEFAULT_FETCH_BACKOFF_MAX_MS),
            max_download_bytes: None,
            max_untar_bytes: None,
        }
    }
}

/// Fetches an archive identified by URL and checksum into a directory
#[async_trait]
pub trait ArchiveFetcher: Send + Sync + std::fmt::Debug {
    async fn fetch(&self, url: &str, checksum: &str, dir: &Path) -> Result<(), FetchError>;
}

/// [`ArchiveFetcher`] over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpArchiveFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpArchiveFetcher {
    pub fn new(client: reqwest::Client, config: FetchConfig) -> Self {
        Self { client, config }
    }

    async fn download_with_retries(
        &self,
        url: &str,
        target: &Path,
        checksum: &Checksum,
    ) -> Result<String, FetchError> {
        let mut backoff = FibonacciBackoff::new(self.config.backoff_min, self.config.backoff_max);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match download::download_once(
                &self.client,
                url,
                target,
                checksum,
                self.config.max_download_bytes,
            )
            .await
            {
                Ok(digest) => return Ok(digest),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retryable(reason)) if attempts <= self.config.retries => {
                    let delay = backoff.next_backoff();
                    warn!(
                        attempt = attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        "Artifact download failed: {}",
                        reason
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(AttemptError::Retryable(last)) => {
                    return Err(FetchError::RetriesExhausted {
                        url: url.to_string(),
                        attempts,
                        last,
                    })
                }
            }
        }
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch(&self, url: &str, checksum: &str, dir: &Path) -> Result<(), FetchError> {
        let span = info_span!("artifact.fetch", artifact.url = url);
        async move {
            let start = Instant::now();
            metrics::increment_artifact_fetches();

            let result = async {
                let expected = Checksum::parse(checksum)?;
                let download = tempfile::NamedTempFile::new().map_err(|source| FetchError::Io {
                    path: std::env::temp_dir().display().to_string(),
                    source,
                })?;

                let digest = self
                    .download_with_retries(url, download.path(), &expected)
                    .await?;
                expected.verify(&digest, url)?;
                download::verify_gzip_magic(download.path(), url)?;

                let archive = download.path().to_path_buf();
                let destination: PathBuf = dir.to_path_buf();
                let limit = self.config.max_untar_bytes;
                tokio::task::spawn_blocking(move || {
                    extract::extract_tar_gz(&archive, &destination, limit)
                })
                .await
                .map_err(|e| FetchError::Extract(std::io::Error::other(e)))??;

                // Keeps the download alive until extraction has finished
                drop(download);
                Ok::<(), FetchError>(())
            }
            .await;

            match &result {
                Ok(()) => {
                    metrics::observe_artifact_fetch_duration(start.elapsed().as_secs_f64());
                    info!(destination = %dir.display(), "Artifact fetched and extracted");
                }
                Err(_) => metrics::increment_artifact_fetch_errors(),
            }
            result
        }
        .instrument(span)
        .await
    }
}
