//! Audit cache configuration.

use std::time::Duration;

/// Default retention window for messages and their index entries.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 3600);

/// Default attachment size ceiling (10 MiB).
pub const DEFAULT_ATTACHMENT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Default time budget for a single attachment download.
pub const DEFAULT_ATTACHMENT_TIMEOUT: Duration = Duration::from_secs(20);

/// Tunables of the audit cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    /// Time-to-live of message records and index entries, counted from
    /// the moment the message is first written.
    pub retention: Duration,

    /// Attachments declared larger than this are not downloaded.
    pub attachment_max_bytes: u64,

    /// Upper bound for downloading one attachment.
    pub attachment_timeout: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            attachment_max_bytes: DEFAULT_ATTACHMENT_MAX_BYTES,
            attachment_timeout: DEFAULT_ATTACHMENT_TIMEOUT,
        }
    }
}

impl AuditConfig {
    /// Set the retention window.
    #[must_use]
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the attachment size ceiling.
    #[must_use]
    pub fn attachment_max_bytes(mut self, max_bytes: u64) -> Self {
        self.attachment_max_bytes = max_bytes;
        self
    }

    /// Set the per-attachment download timeout.
    #[must_use]
    pub fn attachment_timeout(mut self, timeout: Duration) -> Self {
        self.attachment_timeout = timeout;
        self
    }
}
