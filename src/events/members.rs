//! Member event handlers.

use tracing::{debug, info, warn};

use crate::cache::AuditCache;
use crate::models::MemberSnapshot;
use crate::store::{CacheResult, OptionalExt};

use super::AuditReport;

pub(super) async fn on_member_upsert(
    cache: &AuditCache,
    snapshot: MemberSnapshot,
) -> CacheResult<Option<AuditReport>> {
    cache.put_member(snapshot).await?;
    Ok(None)
}

pub(super) async fn on_members_chunk(
    cache: &AuditCache,
    snapshots: Vec<MemberSnapshot>,
) -> CacheResult<Option<AuditReport>> {
    let written = cache.put_members(snapshots).await?;
    debug!("Member chunk applied ({} snapshots)", written);
    Ok(None)
}

/// Read the snapshot, then drop it. Unreadable snapshots are dropped too.
pub(super) async fn on_member_left(
    cache: &AuditCache,
    guild_id: &str,
    user_id: &str,
) -> CacheResult<Option<AuditReport>> {
    let snapshot = cache.get_member(guild_id, user_id).await.usable()?;

    // A concurrent leave may have removed it already.
    let removed = cache.delete_member(guild_id, user_id).await.found()?.is_some();

    match snapshot {
        Some(snapshot) => Ok(Some(AuditReport::Left { snapshot })),
        None => {
            if removed {
                warn!("Dropped unreadable snapshot of {} in guild {}", user_id, guild_id);
            } else {
                debug!("Member {} left guild {} without a snapshot", user_id, guild_id);
            }
            Ok(None)
        }
    }
}

/// The snapshot stays; the leave event that follows a ban removes it.
pub(super) async fn on_member_banned(
    cache: &AuditCache,
    guild_id: String,
    user_id: String,
) -> CacheResult<Option<AuditReport>> {
    match cache.get_member(&guild_id, &user_id).await.usable()? {
        Some(snapshot) => {
            let history = cache.get_message_log(&guild_id, &user_id).await?;
            info!(
                "Member {} banned from {} with {} recent message(s)",
                user_id,
                guild_id,
                history.len()
            );
            Ok(Some(AuditReport::Banned { snapshot, history }))
        }
        None => {
            info!("User {} hackbanned from {}", user_id, guild_id);
            Ok(Some(AuditReport::Hackban { guild_id, user_id }))
        }
    }
}
