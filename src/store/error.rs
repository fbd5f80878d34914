//! Error type shared by the engine, the cache and the attachment fetcher.

use thiserror::Error;
use tracing::warn;

/// Result alias used across the audit cache.
pub type CacheResult<T> = Result<T, CacheError>;

/// Everything the audit cache can report back to its callers.
///
/// `NotFound` is ordinary control flow. The encode-class variants
/// (`Encode`, `Corrupt`) mean a stored value is unusable and read paths
/// treat them like `NotFound`, but they stay distinct so diagnostics can
/// tell corruption apart from absence.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Key absent or expired.
    #[error("entry not found")]
    NotFound,

    /// The embedded engine failed (disk, transaction, corruption).
    #[error("storage engine error: {0}")]
    Engine(#[from] redb::Error),

    /// Attachment download failed.
    #[error("attachment download failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// Attachment download exceeded its time budget.
    #[error("attachment download timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A blocking engine task could not complete.
    #[error("storage task failed: {0}")]
    Task(String),

    /// A stored value could not be serialized or deserialized.
    #[error("failed to encode or decode value: {0}")]
    Encode(#[from] bincode::Error),

    /// A stored value has a malformed envelope.
    #[error("corrupt entry: {0}")]
    Corrupt(String),

    /// Rejected input.
    #[error("invalid input: {0}")]
    Invalid(String),
}

impl CacheError {
    /// Key absent or expired.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Entry is unusable for a read: absent, expired or undecodable.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::NotFound | Self::Encode(_) | Self::Corrupt(_))
    }

    /// Underlying engine, network or task failure.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::Engine(_) | Self::Fetch(_) | Self::Timeout(_) | Self::Task(_)
        )
    }
}

macro_rules! engine_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for CacheError {
                fn from(e: $ty) -> Self {
                    Self::Engine(redb::Error::from(e))
                }
            }
        )*
    };
}

engine_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Presence helpers for callers that branch on a miss.
pub trait OptionalExt<T> {
    /// `NotFound` becomes `Ok(None)`.
    fn found(self) -> CacheResult<Option<T>>;

    /// Every absent-class error becomes `Ok(None)`. Unusable entries are
    /// logged before they are dropped.
    fn usable(self) -> CacheResult<Option<T>>;
}

impl<T> OptionalExt<T> for CacheResult<T> {
    fn found(self) -> CacheResult<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(CacheError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn usable(self) -> CacheResult<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(CacheError::NotFound) => Ok(None),
            Err(e) if e.is_absent() => {
                warn!("Treating unusable entry as absent: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
