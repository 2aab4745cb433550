// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Single-artifact downloader.
//!
//! Streams one URL into one new file, reporting cumulative byte progress
//! after every chunk written.

use std::io;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::progress::ProgressSink;
use crate::error::FetchError;
use crate::types::ProgressEvent;

/// Largest slice written (and reported) at once.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Connect timeout for artifact requests (in seconds).
const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Retrieves one artifact into `destination_dir/filename`.
///
/// Implementations must refuse to overwrite an existing file and must
/// report progress for `filename` through `progress`. Returns the number of
/// bytes written.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(
        &self,
        source_url: &str,
        destination_dir: &Path,
        filename: &str,
        progress: &dyn ProgressSink,
    ) -> Result<u64, FetchError>;
}

/// [`ArtifactFetcher`] over plain HTTP(S) GET.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self::with_client(client)
    }

    /// Use a preconfigured client (proxies, timeouts, test servers).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(
        &self,
        source_url: &str,
        destination_dir: &Path,
        filename: &str,
        progress: &dyn ProgressSink,
    ) -> Result<u64, FetchError> {
        let path = destination_dir.join(filename);

        // Cheap pre-check; the exclusive create below settles races.
        if tokio::fs::metadata(&path).await.is_ok() {
            return Err(FetchError::AlreadyExists { path });
        }

        tracing::debug!(url = source_url, path = %path.display(), "starting transfer");

        let response = self
            .client
            .get(source_url)
            .send()
            .await
            .map_err(|e| FetchError::transfer(source_url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Transfer {
                url: source_url.to_string(),
                message: format!("invalid status code: {}", status.as_u16()),
                status: Some(status.as_u16()),
            });
        }

        let total = response
            .content_length()
            .and_then(|len| i64::try_from(len).ok())
            .unwrap_or(-1);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(FetchError::AlreadyExists { path });
            }
            Err(e) => return Err(FetchError::io(&path, e)),
        };

        let mut downloaded: i64 = 0;
        let mut stream = response.bytes_stream();

        let transfer: Result<(), FetchError> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| FetchError::transfer(source_url, &e))?;
                for piece in chunk.chunks(CHUNK_SIZE) {
                    file.write_all(piece)
                        .await
                        .map_err(|e| FetchError::io(&path, e))?;
                    downloaded += piece.len() as i64;
                    progress.report(&ProgressEvent {
                        filename: filename.to_string(),
                        bytes_downloaded: downloaded,
                        bytes_total: total,
                    });
                }
            }
            Ok(())
        }
        .await;

        // Flush and fsync run on every path; their errors only matter if the
        // transfer succeeded. The descriptor itself is closed on drop.
        let closed = match file.flush().await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };
        drop(file);

        match (transfer, closed) {
            (Err(e), _) => {
                tracing::debug!(path = %path.display(), bytes = downloaded, "transfer aborted, partial file left on disk");
                Err(e)
            }
            (Ok(()), Err(e)) => Err(FetchError::io(&path, e)),
            (Ok(()), Ok(())) => {
                tracing::debug!(path = %path.display(), bytes = downloaded, "transfer complete");
                Ok(downloaded as u64)
            }
        }
    }
}
