//! Byte transfer primitives.
//!
//! Two mechanisms: a streaming GET that reports progress per chunk, and a
//! buffered single-shot GET used as the fallback. Which ones run, and in
//! which order, is decided by the caller through [`TransferStrategy`].

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::domain::DownloadError;

/// One attemptable transfer mechanism. The fallback policy is a list of
/// these, evaluated in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStrategy {
    /// Chunked read with per-chunk progress callbacks.
    Streaming,
    /// Whole-body read, no progress reporting.
    Simple,
}

/// Try streaming first, then the buffered fallback.
pub const DEFAULT_STRATEGIES: [TransferStrategy; 2] =
    [TransferStrategy::Streaming, TransferStrategy::Simple];

#[derive(Clone, Default)]
pub struct TransferClient {
    client: Client,
}

impl TransferClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Run one strategy against `url`. `on_progress` is only invoked by the
    /// streaming path, and only when the server advertises a total size.
    pub async fn transfer<F>(
        &self,
        strategy: TransferStrategy,
        url: &Url,
        max_bytes: u64,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<Bytes, DownloadError>
    where
        F: FnMut(u8),
    {
        match strategy {
            TransferStrategy::Streaming => {
                self.transfer_with_progress(url, max_bytes, cancel, on_progress)
                    .await
            }
            TransferStrategy::Simple => self.transfer_simple(url, max_bytes, cancel).await,
        }
    }

    /// Streaming GET. Accumulates the body in memory, invoking `on_progress`
    /// with `floor(received / total * 100)` after each chunk when the server
    /// advertised a total. With no advertised total the callbacks are
    /// withheld entirely rather than reporting a made-up percentage.
    ///
    /// Successive percentages are non-decreasing; duplicates are dropped.
    pub async fn transfer_with_progress<F>(
        &self,
        url: &Url,
        max_bytes: u64,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<Bytes, DownloadError>
    where
        F: FnMut(u8),
    {
        let response = self.send(url, cancel).await?;

        let total = response.content_length().filter(|t| *t > 0);
        if let Some(total) = total {
            if total > max_bytes {
                return Err(DownloadError::TooLarge {
                    size: total,
                    limit: max_bytes,
                });
            }
        }

        let mut stream = response.bytes_stream();
        let mut buf = BytesMut::with_capacity(total.unwrap_or(0) as usize);
        let mut received: u64 = 0;
        let mut last_percent: Option<u8> = None;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    received += chunk.len() as u64;
                    if received > max_bytes {
                        return Err(DownloadError::TooLarge {
                            size: received,
                            limit: max_bytes,
                        });
                    }
                    buf.extend_from_slice(&chunk);

                    if let Some(total) = total {
                        let percent = ((received.min(total) * 100) / total) as u8;
                        if last_percent != Some(percent) {
                            last_percent = Some(percent);
                            on_progress(percent);
                        }
                    }
                }
                Some(Err(e)) => return Err(DownloadError::Network(e.to_string())),
                None => break,
            }
        }

        debug!(url = %url, bytes = received, "streaming transfer finished");
        Ok(buf.freeze())
    }

    /// Buffered GET without progress reporting. Used when streaming is not
    /// wanted or has already failed.
    pub async fn transfer_simple(
        &self,
        url: &Url,
        max_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<Bytes, DownloadError> {
        let response = self.send(url, cancel).await?;

        if let Some(total) = response.content_length() {
            if total > max_bytes {
                return Err(DownloadError::TooLarge {
                    size: total,
                    limit: max_bytes,
                });
            }
        }

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            body = response.bytes() => body.map_err(|e| DownloadError::Network(e.to_string()))?,
        };

        if body.len() as u64 > max_bytes {
            return Err(DownloadError::TooLarge {
                size: body.len() as u64,
                limit: max_bytes,
            });
        }

        debug!(url = %url, bytes = body.len(), "simple transfer finished");
        Ok(body)
    }

    async fn send(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, DownloadError> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            resp = self.client.get(url.clone()).send() => {
                resp.map_err(|e| DownloadError::Network(e.to_string()))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}
