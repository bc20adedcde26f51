//! # Download and Verification
//!
//! Streams an artifact to disk while hashing it, then checks the digest and
//! the gzip magic bytes before anything is extracted.

use super::FetchError;
use futures::StreamExt;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Expected artifact digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    Sha256(String),
    Sha384(String),
    Sha512(String),
}

impl Checksum {
    /// Parse `sha256:<hex>`, `sha384:<hex>`, `sha512:<hex>` or a bare SHA-256 hex digest
    pub fn parse(value: &str) -> Result<Self, FetchError> {
        let value = value.trim();
        let (algorithm, hex) = value.split_once(':').unwrap_or(("sha256", value));
        let hex = hex.to_ascii_lowercase();
        let expected_len = match algorithm {
            "sha256" => 64,
            "sha384" => 96,
            "sha512" => 128,
            _ => return Err(FetchError::InvalidChecksum(value.to_string())),
        };
        if hex.len() != expected_len || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(FetchError::InvalidChecksum(value.to_string()));
        }
        Ok(match algorithm {
            "sha384" => Self::Sha384(hex),
            "sha512" => Self::Sha512(hex),
            _ => Self::Sha256(hex),
        })
    }

    fn hasher(&self) -> Hasher {
        match self {
            Self::Sha256(_) => Hasher::Sha256(Sha256::new()),
            Self::Sha384(_) => Hasher::Sha384(Sha384::new()),
            Self::Sha512(_) => Hasher::Sha512(Sha512::new()),
        }
    }

    fn hex(&self) -> &str {
        match self {
            Self::Sha256(hex) | Self::Sha384(hex) | Self::Sha512(hex) => hex,
        }
    }

    fn algorithm(&self) -> &'static str {
        match self {
            Self::Sha256(_) => "sha256",
            Self::Sha384(_) => "sha384",
            Self::Sha512(_) => "sha512",
        }
    }

    /// Compare against the digest computed during download
    pub fn verify(&self, computed_hex: &str, url: &str) -> Result<(), FetchError> {
        if computed_hex != self.hex() {
            return Err(FetchError::ChecksumMismatch {
                url: url.to_string(),
                expected: format!("{}:{}", self.algorithm(), self.hex()),
                actual: format!("{}:{}", self.algorithm(), computed_hex),
            });
        }
        debug!("Checksum verified: {}:{}", self.algorithm(), self.hex());
        Ok(())
    }
}

enum Hasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl Hasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Sha256(h) => format!("{:x}", h.finalize()),
            Self::Sha384(h) => format!("{:x}", h.finalize()),
            Self::Sha512(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Outcome of a single download attempt
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// Worth another attempt (connection failures, 5xx, 429, broken streams)
    Retryable(String),
    Fatal(FetchError),
}

/// Download `url` into `target`, returning the hex digest of the body
pub(crate) async fn download_once(
    client: &reqwest::Client,
    url: &str,
    target: &Path,
    checksum: &Checksum,
    max_bytes: Option<u64>,
) -> Result<String, AttemptError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AttemptError::Retryable(e.to_string()))?;

    let status = response.status();
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(AttemptError::Retryable(format!("HTTP {status}")));
    }
    if !status.is_success() {
        return Err(AttemptError::Fatal(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }));
    }

    if let (Some(limit), Some(length)) = (max_bytes, response.content_length()) {
        if length > limit {
            return Err(AttemptError::Fatal(FetchError::TooLarge { limit }));
        }
    }

    let io_err = |source: std::io::Error| {
        AttemptError::Fatal(FetchError::Io {
            path: target.display().to_string(),
            source,
        })
    };

    let mut file = tokio::fs::File::create(target).await.map_err(io_err)?;
    let mut hasher = checksum.hasher();
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AttemptError::Retryable(e.to_string()))?;
        downloaded += chunk.len() as u64;
        if max_bytes.is_some_and(|limit| downloaded > limit) {
            return Err(AttemptError::Fatal(FetchError::TooLarge {
                limit: max_bytes.unwrap_or_default(),
            }));
        }
        hasher.update(&chunk);
        file.write_all(&chunk).await.map_err(io_err)?;
    }
    file.flush().await.map_err(io_err)?;

    if downloaded == 0 {
        return Err(AttemptError::Retryable("downloaded artifact is empty".to_string()));
    }

    debug!(bytes = downloaded, "Artifact downloaded");
    Ok(hasher.finalize_hex())
}

/// Verify the file starts with the gzip magic bytes (1f 8b)
pub(crate) fn verify_gzip_magic(path: &Path, url: &str) -> Result<(), FetchError> {
    use std::io::Read;

    let mut magic = [0u8; 2];
    let mut file = std::fs::File::open(path).map_err(|source| FetchError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if file.read_exact(&mut magic).is_err() || magic != [0x1f, 0x8b] {
        return Err(FetchError::NotGzip {
            url: url.to_string(),
        });
    }
    Ok(())
}
