//! Message event handlers.

use tracing::debug;

use crate::cache::AuditCache;
use crate::models::{IncomingMessage, Snowflake};
use crate::store::{CacheResult, OptionalExt};

use super::AuditReport;

pub(super) async fn on_message_created(
    cache: &AuditCache,
    message: IncomingMessage,
    author_is_bot: bool,
) -> CacheResult<Option<AuditReport>> {
    if author_is_bot {
        debug!("Ignoring bot message {}", message.message_id);
        return Ok(None);
    }
    cache.put_message(message).await?;
    Ok(None)
}

pub(super) async fn on_message_updated(
    cache: &AuditCache,
    guild_id: &str,
    channel_id: &str,
    message_id: Snowflake,
    content: String,
) -> CacheResult<Option<AuditReport>> {
    // Embed unfurls arrive as updates without content.
    if content.is_empty() {
        return Ok(None);
    }

    let Some(before) = cache
        .update_message_content(guild_id, channel_id, message_id, content.clone())
        .await
        .usable()?
    else {
        debug!("Edit of uncaptured message {}", message_id);
        return Ok(None);
    };

    if before.content == content {
        return Ok(None);
    }

    let mut after = before.clone();
    after.content = content;
    Ok(Some(AuditReport::Edited { before, after }))
}

pub(super) async fn on_message_deleted(
    cache: &AuditCache,
    guild_id: &str,
    channel_id: &str,
    message_id: Snowflake,
) -> CacheResult<Option<AuditReport>> {
    let record = cache
        .get_message(guild_id, channel_id, message_id)
        .await
        .usable()?;
    if record.is_none() {
        debug!("Delete of uncaptured message {}", message_id);
    }
    Ok(record.map(AuditReport::Deleted))
}

pub(super) async fn on_messages_bulk_deleted(
    cache: &AuditCache,
    guild_id: String,
    channel_id: String,
    message_ids: &[Snowflake],
) -> CacheResult<Option<AuditReport>> {
    let messages = cache.get_messages(&guild_id, &channel_id, message_ids).await?;
    debug!(
        "Bulk delete in {}/{}: {} of {} captured",
        guild_id,
        channel_id,
        messages.len(),
        message_ids.len()
    );
    Ok(Some(AuditReport::BulkDeleted {
        guild_id,
        channel_id,
        deleted: message_ids.len(),
        messages,
    }))
}
