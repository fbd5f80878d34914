//! Gateway event routing.
//!
//! The gateway layer turns platform payloads into [`AuditEvent`]s and
//! hands them to [`AuditEvents::handle`]. Write-only events produce no
//! report; events a moderation log cares about return an [`AuditReport`]
//! built from what the cache still remembers.
//!
//! Handlers live next to their concern:
//! - `members` - joins, updates, chunks, leaves and bans
//! - `messages` - creates, edits and deletes

mod members;
mod messages;

use crate::cache::AuditCache;
use crate::models::{IncomingMessage, MemberSnapshot, MessageRecord, Snowflake};
use crate::store::CacheResult;

/// Every event the audit cache consumes.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    MemberJoined(MemberSnapshot),
    MemberUpdated(MemberSnapshot),
    /// Bulk member list, sent when a guild becomes available.
    MembersChunk(Vec<MemberSnapshot>),
    MemberLeft {
        guild_id: String,
        user_id: String,
    },
    MemberBanned {
        guild_id: String,
        user_id: String,
    },
    MessageCreated {
        message: IncomingMessage,
        author_is_bot: bool,
    },
    MessageUpdated {
        guild_id: String,
        channel_id: String,
        message_id: Snowflake,
        content: String,
    },
    MessageDeleted {
        guild_id: String,
        channel_id: String,
        message_id: Snowflake,
    },
    MessagesBulkDeleted {
        guild_id: String,
        channel_id: String,
        message_ids: Vec<Snowflake>,
    },
}

/// What a moderation log should post for an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditReport {
    /// A known member left; their last roles and nickname.
    Left { snapshot: MemberSnapshot },
    /// A known member was banned, with their recent messages.
    Banned {
        snapshot: MemberSnapshot,
        history: Vec<MessageRecord>,
    },
    /// Ban of a user never seen as a member.
    Hackban { guild_id: String, user_id: String },
    Edited {
        before: MessageRecord,
        after: MessageRecord,
    },
    Deleted(MessageRecord),
    BulkDeleted {
        guild_id: String,
        channel_id: String,
        /// IDs the platform reported deleted, captured or not.
        deleted: usize,
        /// The captured subset.
        messages: Vec<MessageRecord>,
    },
}

/// Routes events into the cache.
#[derive(Debug, Clone)]
pub struct AuditEvents {
    cache: AuditCache,
}

impl AuditEvents {
    pub fn new(cache: AuditCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &AuditCache {
        &self.cache
    }

    /// Apply one event. A missing snapshot or message is never an error
    /// here; it just means there is less to report.
    pub async fn handle(&self, event: AuditEvent) -> CacheResult<Option<AuditReport>> {
        match event {
            AuditEvent::MemberJoined(snapshot) | AuditEvent::MemberUpdated(snapshot) => {
                members::on_member_upsert(&self.cache, snapshot).await
            }
            AuditEvent::MembersChunk(snapshots) => {
                members::on_members_chunk(&self.cache, snapshots).await
            }
            AuditEvent::MemberLeft { guild_id, user_id } => {
                members::on_member_left(&self.cache, &guild_id, &user_id).await
            }
            AuditEvent::MemberBanned { guild_id, user_id } => {
                members::on_member_banned(&self.cache, guild_id, user_id).await
            }
            AuditEvent::MessageCreated {
                message,
                author_is_bot,
            } => messages::on_message_created(&self.cache, message, author_is_bot).await,
            AuditEvent::MessageUpdated {
                guild_id,
                channel_id,
                message_id,
                content,
            } => {
                let (guild, channel) = (&guild_id, &channel_id);
                messages::on_message_updated(&self.cache, guild, channel, message_id, content).await
            }
            AuditEvent::MessageDeleted {
                guild_id,
                channel_id,
                message_id,
            } => {
                messages::on_message_deleted(&self.cache, &guild_id, &channel_id, message_id).await
            }
            AuditEvent::MessagesBulkDeleted {
                guild_id,
                channel_id,
                message_ids,
            } => {
                messages::on_messages_bulk_deleted(&self.cache, guild_id, channel_id, &message_ids)
                    .await
            }
        }
    }
}
