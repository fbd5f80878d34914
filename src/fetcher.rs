//! Attachment fetcher.
//!
//! Downloads remote attachments into owned bytes, bounded by a size
//! ceiling and a per-attachment timeout. A failed download only loses
//! that attachment; the message around it is still captured.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::models::{Attachment, AttachmentRef};
use crate::store::{CacheError, CacheResult};

/// Outcome of a download that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Bytes(Vec<u8>),
    /// Declared or actual size is above the ceiling.
    TooLarge,
}

#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    async fn fetch(&self, attachment: &AttachmentRef, ceiling: u64) -> CacheResult<Fetched>;
}

/// HTTP downloader on a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// `timeout` bounds each request end to end, body included.
    pub fn new(timeout: Duration) -> CacheResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AttachmentFetcher for HttpFetcher {
    async fn fetch(&self, attachment: &AttachmentRef, ceiling: u64) -> CacheResult<Fetched> {
        if attachment.size > ceiling {
            return Ok(Fetched::TooLarge);
        }

        let mut response = self
            .client
            .get(attachment.url.clone())
            .send()
            .await?
            .error_for_status()?;

        if response.content_length().is_some_and(|len| len > ceiling) {
            return Ok(Fetched::TooLarge);
        }

        let mut data = Vec::with_capacity(attachment.size as usize);
        while let Some(chunk) = response.chunk().await? {
            if (data.len() + chunk.len()) as u64 > ceiling {
                return Ok(Fetched::TooLarge);
            }
            data.extend_from_slice(&chunk);
        }

        Ok(Fetched::Bytes(data))
    }
}

/// Download every attachment at or under `ceiling`, concurrently.
///
/// Each download gets its own `timeout`. The result keeps the input
/// order and silently drops oversized, failed and timed-out entries.
pub async fn capture_all(
    fetcher: &dyn AttachmentFetcher,
    attachments: &[AttachmentRef],
    ceiling: u64,
    timeout: Duration,
) -> Vec<Attachment> {
    let downloads = attachments
        .iter()
        .map(|attachment| capture_one(fetcher, attachment, ceiling, timeout));

    join_all(downloads).await.into_iter().flatten().collect()
}

async fn capture_one(
    fetcher: &dyn AttachmentFetcher,
    attachment: &AttachmentRef,
    ceiling: u64,
    timeout: Duration,
) -> Option<Attachment> {
    if attachment.size > ceiling {
        debug!(
            "Skipping attachment {} ({} bytes > {} ceiling)",
            attachment.filename, attachment.size, ceiling
        );
        return None;
    }

    let outcome = tokio::time::timeout(timeout, fetcher.fetch(attachment, ceiling))
        .await
        .unwrap_or(Err(CacheError::Timeout(timeout)));

    match outcome {
        Ok(Fetched::Bytes(data)) => Some(Attachment {
            filename: attachment.filename.clone(),
            size: attachment.size,
            data,
        }),
        Ok(Fetched::TooLarge) => {
            debug!("Attachment {} exceeded the ceiling while downloading", attachment.filename);
            None
        }
        Err(e) => {
            warn!("Failed to download attachment {}: {}", attachment.filename, e);
            None
        }
    }
}
