//! Member snapshot table.
//!
//! Snapshots carry no TTL. The leave handler reads a snapshot and only
//! then deletes it; the store offers no atomic get-and-delete.

use tracing::debug;

use crate::models::MemberSnapshot;
use crate::store::{CacheError, CacheResult, codec, keys};

use super::AuditCache;

fn validate(snapshot: &MemberSnapshot) -> CacheResult<()> {
    keys::validate_id("guild", &snapshot.guild_id)?;
    keys::validate_id("user", &snapshot.user_id)
}

impl AuditCache {
    /// Upsert a snapshot by (guild, user).
    pub async fn put_member(&self, snapshot: MemberSnapshot) -> CacheResult<()> {
        validate(&snapshot)?;
        let key = keys::member(&snapshot.guild_id, &snapshot.user_id);
        let value = codec::encode(&snapshot)?;

        self.run("put_member", move |engine| {
            engine.write(|batch| batch.put(&key, &value, None))
        })
        .await?;

        debug!("Stored member {} in guild {}", snapshot.user_id, snapshot.guild_id);
        Ok(())
    }

    /// Upsert a batch (member chunk) in one transaction.
    ///
    /// Returns the number of snapshots written. Any invalid snapshot
    /// rejects the whole batch before anything is written.
    pub async fn put_members(&self, snapshots: Vec<MemberSnapshot>) -> CacheResult<usize> {
        let mut rows = Vec::with_capacity(snapshots.len());
        for snapshot in &snapshots {
            validate(snapshot)?;
            rows.push((
                keys::member(&snapshot.guild_id, &snapshot.user_id),
                codec::encode(snapshot)?,
            ));
        }

        let written = self
            .run("put_members", move |engine| {
                engine.write(|batch| {
                    for (key, value) in &rows {
                        batch.put(key, value, None)?;
                    }
                    Ok(rows.len())
                })
            })
            .await?;

        debug!("Stored member chunk of {}", written);
        Ok(written)
    }

    pub async fn get_member(&self, guild_id: &str, user_id: &str) -> CacheResult<MemberSnapshot> {
        keys::validate_id("guild", guild_id)?;
        keys::validate_id("user", user_id)?;
        let key = keys::member(guild_id, user_id);

        self.run("get_member", move |engine| {
            let entry = engine.get(&key)?.ok_or(CacheError::NotFound)?;
            codec::decode(&entry.value)
        })
        .await
    }

    /// Remove a snapshot. `NotFound` means it was already gone.
    pub async fn delete_member(&self, guild_id: &str, user_id: &str) -> CacheResult<()> {
        keys::validate_id("guild", guild_id)?;
        keys::validate_id("user", user_id)?;
        let key = keys::member(guild_id, user_id);

        let removed = self
            .run("delete_member", move |engine| {
                engine.write(|batch| batch.delete(&key))
            })
            .await?;

        if removed {
            Ok(())
        } else {
            Err(CacheError::NotFound)
        }
    }
}
