//! Message records and the inbound message payload they are built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::Snowflake;

/// A captured attachment.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    /// Size declared by the platform, in bytes.
    pub size: u64,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// A stored message plus whatever attachments were retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub guild_id: String,
    pub channel_id: String,
    pub message_id: Snowflake,
    pub author_id: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl MessageRecord {
    /// Creation time, derived from the message ID.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.message_id.timestamp()
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Remote attachment as announced by the platform, not yet downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub filename: String,
    pub url: Url,
    /// Declared size in bytes.
    pub size: u64,
}

impl AttachmentRef {
    pub fn new(filename: impl Into<String>, url: Url, size: u64) -> Self {
        Self {
            filename: filename.into(),
            url,
            size,
        }
    }
}

/// Message-create payload handed over by the gateway layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub guild_id: String,
    pub channel_id: String,
    pub message_id: Snowflake,
    pub author_id: String,
    pub content: String,
    pub attachments: Vec<AttachmentRef>,
}

impl IncomingMessage {
    pub fn new(
        guild_id: impl Into<String>,
        channel_id: impl Into<String>,
        message_id: impl Into<Snowflake>,
        author_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
            message_id: message_id.into(),
            author_id: author_id.into(),
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Build the record to store, given the attachments that were captured.
    pub(crate) fn into_record(self, attachments: Vec<Attachment>) -> MessageRecord {
        MessageRecord {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            message_id: self.message_id,
            author_id: self.author_id,
            content: self.content,
            attachments,
        }
    }
}
