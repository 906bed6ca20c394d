use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("concurrency limiter is closed")]
    ConcurrencyClosed,
    #[error("download size check failed: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    pub download_concurrency: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_concurrency: 4,
        }
    }
}

#[derive(Clone)]
pub struct TransferClient {
    download_limit: Arc<Semaphore>,
}

impl TransferClient {
    pub fn new() -> Self {
        Self::with_config(TransferConfig::default())
    }

    pub fn with_config(config: TransferConfig) -> Self {
        Self {
            download_limit: Arc::new(Semaphore::new(config.download_concurrency.max(1))),
        }
    }

    /// Streams a response body into `target` and syncs it to disk.
    ///
    /// On any failure the partially written file is removed.
    pub async fn download_to_path(
        &self,
        response: reqwest::Response,
        target: &Path,
        expected_size: Option<u64>,
    ) -> Result<u64, TransferError> {
        let _permit = self
            .download_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransferError::ConcurrencyClosed)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let result = write_stream(response, target).await;
        let written = match result {
            Ok(written) => written,
            Err(err) => {
                let _ = tokio::fs::remove_file(target).await;
                return Err(err);
            }
        };

        if let Some(expected) = expected_size
            && expected != written
        {
            let _ = tokio::fs::remove_file(target).await;
            return Err(TransferError::SizeMismatch {
                expected,
                actual: written,
            });
        }
        Ok(written)
    }
}

impl Default for TransferClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_stream(response: reqwest::Response, target: &Path) -> Result<u64, TransferError> {
    let mut file = tokio::fs::File::create(target).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// Staging location used while content is in flight.
pub fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}

/// Moves fully written content from its staging path into place.
pub async fn commit_partial(target: &Path) -> io::Result<()> {
    tokio::fs::rename(partial_path(target), target).await
}

pub async fn discard_partial(target: &Path) {
    let partial = partial_path(target);
    match tokio::fs::remove_file(&partial).await {
        Ok(()) => tracing::debug!(path = %partial.display(), "removed partial download"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(path = %partial.display(), error = %err, "failed to remove partial download")
        }
    }
}
