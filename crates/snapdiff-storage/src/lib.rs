//! Digest helper, atomic artifact writes and the HTTP page fetcher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "snapdiff-storage";

const DEFAULT_CHARSET: &str = "utf-8";

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub content_hash: String,
    pub byte_size: usize,
}

/// Write `bytes` to `path` through a sibling temp file and a rename, creating
/// parent directories. Readers never observe a partially written file.
pub async fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<StoredArtifact> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .await
        .with_context(|| format!("creating artifact directory {}", parent.display()))?;

    let temp_name = format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len());
    let temp_path = parent.join(temp_name);

    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp artifact file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp artifact file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp artifact file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming temp artifact {} -> {}",
                temp_path.display(),
                path.display()
            )
        });
    }

    debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
    Ok(StoredArtifact {
        path: path.to_path_buf(),
        content_hash: sha256_hex(bytes),
        byte_size: bytes.len(),
    })
}

/// Serialize `value` as two-space indented UTF-8 JSON (non-ASCII kept as-is)
/// and write it atomically.
pub async fn write_json_pretty<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> anyhow::Result<StoredArtifact> {
    let mut bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;
    bytes.push(b'\n');
    write_bytes_atomic(path, &bytes).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let shift = u32::try_from(attempt_index).unwrap_or(u32::MAX);
        let factor = 1u32.checked_shl(shift).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// A fetched page. Any status code is a successful fetch; the status is data.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: u16,
    pub final_url: String,
    /// Body decoded with the `Content-Type` charset, UTF-8 when none is given.
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{0}")]
    Message(String),
}

/// Source of page bodies for capture.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedResponse, FetchError>;
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            backoff: config.backoff,
        })
    }

    async fn fetch_with_retries(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        debug!(%status, attempt, "retryable status");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    let final_url = resp.url().to_string();
                    let body = resp.text_with_charset(DEFAULT_CHARSET).await?;
                    return Ok(FetchedResponse {
                        status: status.as_u16(),
                        final_url,
                        body,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        debug!(error = %err, attempt, "retryable request error");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", url);
        self.fetch_with_retries(url).instrument(span).await
    }
}
