//! Audit cache - member snapshots, message records and the author index.
//!
//! One `AuditCache` is built at startup and cloned into every consumer;
//! clones share the same engine and fetcher.
//!
//! ## Tables
//!
//! - `member:*` - last-known member state, no TTL (`members.rs`)
//! - `message:*` - captured messages, TTL = retention (`messages.rs`)
//! - `index:*` - per-author pointers to messages, same TTL, written in the
//!   same transaction as the record they point to
//!
//! Engine calls block, so every operation hops onto tokio's blocking pool.

mod config;
mod members;
mod messages;

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::fetcher::AttachmentFetcher;
use crate::store::{CacheError, CacheResult, KvEngine, keys};

pub use config::{
    AuditConfig, DEFAULT_ATTACHMENT_MAX_BYTES, DEFAULT_ATTACHMENT_TIMEOUT, DEFAULT_RETENTION,
};

/// Live entry counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub members: u64,
    pub messages: u64,
    pub index_entries: u64,
}

/// Retention-bounded audit store.
#[derive(Clone)]
pub struct AuditCache {
    engine: Arc<KvEngine>,
    fetcher: Arc<dyn AttachmentFetcher>,
    config: AuditConfig,
}

impl AuditCache {
    pub fn new(
        engine: Arc<KvEngine>,
        fetcher: Arc<dyn AttachmentFetcher>,
        config: AuditConfig,
    ) -> Self {
        Self {
            engine,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Count live entries in every table.
    pub async fn stats(&self) -> CacheResult<CacheStats> {
        self.run("stats", |engine| {
            let view = engine.read()?;
            Ok(CacheStats {
                members: view.count_prefix(keys::member_prefix())?,
                messages: view.count_prefix(keys::message_prefix())?,
                index_entries: view.count_prefix(keys::index_prefix())?,
            })
        })
        .await
    }

    /// Reclaim up to `batch` expired entries. `0` means nothing was due.
    pub async fn purge_expired(&self, batch: usize) -> CacheResult<usize> {
        self.run("purge_expired", move |engine| engine.purge_expired(batch))
            .await
    }

    /// Run a blocking engine closure off the async executor.
    async fn run<T, F>(&self, op: &'static str, f: F) -> CacheResult<T>
    where
        F: FnOnce(&KvEngine) -> CacheResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let result = tokio::task::spawn_blocking(move || f(&engine))
            .await
            .unwrap_or_else(|e| Err(CacheError::Task(e.to_string())));

        if let Err(e) = &result {
            log_failure(op, e);
        }
        result
    }
}

impl std::fmt::Debug for AuditCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditCache")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn log_failure(op: &str, e: &CacheError) {
    match e {
        CacheError::NotFound => {}
        CacheError::Invalid(_) => debug!("{} rejected: {}", op, e),
        CacheError::Encode(_) | CacheError::Corrupt(_) => {
            warn!("{} hit an unusable entry: {}", op, e)
        }
        _ => error!("{} failed: {}", op, e),
    }
}
