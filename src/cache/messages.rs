//! Message records and the per-author index.
//!
//! A record and its index entry are written in one engine transaction
//! with the same TTL, so neither can exist without the other. Edits
//! rewrite the record under its original deadline and never touch the
//! index.

use tracing::{debug, warn};

use crate::fetcher;
use crate::models::{IncomingMessage, MessageRecord, Snowflake};
use crate::store::{CacheError, CacheResult, ReadView, codec, keys};

use super::AuditCache;

/// Decode a record read through `view`, logging and skipping unusable ones.
fn resolve(view: &ReadView, key: &str) -> CacheResult<Option<MessageRecord>> {
    let decoded = view.get(key).and_then(|entry| {
        entry
            .map(|entry| codec::decode::<MessageRecord>(&entry.value))
            .transpose()
    });
    match decoded {
        Ok(record) => Ok(record),
        Err(e) if !e.is_absent() => Err(e),
        Err(e) => {
            warn!("Skipping corrupt message record {}: {}", key, e);
            Ok(None)
        }
    }
}

impl AuditCache {
    /// Capture a new message.
    ///
    /// Downloads attachments at or under the size ceiling, then writes the
    /// record and its index entry atomically. If the message is already
    /// captured the stored record is returned untouched, so a replayed
    /// create never extends retention.
    pub async fn put_message(&self, message: IncomingMessage) -> CacheResult<MessageRecord> {
        keys::validate_id("guild", &message.guild_id)?;
        keys::validate_id("channel", &message.channel_id)?;
        keys::validate_id("author", &message.author_id)?;

        let key = keys::message(&message.guild_id, &message.channel_id, message.message_id);
        match self.message_by_key("put_message", key.clone()).await {
            Ok(existing) => {
                debug!("Message {} already captured", existing.message_id);
                return Ok(existing);
            }
            Err(e) if e.is_absent() => {}
            Err(e) => return Err(e),
        }

        let attachments = fetcher::capture_all(
            self.fetcher.as_ref(),
            &message.attachments,
            self.config.attachment_max_bytes,
            self.config.attachment_timeout,
        )
        .await;

        let record = message.into_record(attachments);
        let index_key = keys::index(&record.guild_id, &record.author_id, record.message_id);
        let value = codec::encode(&record)?;
        let ttl = self.config.retention;

        let existing = self
            .run("put_message", move |engine| {
                engine.write(|batch| {
                    // Lost a race with a concurrent create of the same message.
                    if let Some(entry) = batch.get(&key)? {
                        if let Ok(existing) = codec::decode::<MessageRecord>(&entry.value) {
                            return Ok(Some(existing));
                        }
                    }
                    batch.put(&key, &value, Some(ttl))?;
                    batch.put(&index_key, key.as_bytes(), Some(ttl))?;
                    Ok(None)
                })
            })
            .await?;

        if let Some(existing) = existing {
            return Ok(existing);
        }

        debug!(
            "Captured message {} by {} in {}/{} with {} attachment(s)",
            record.message_id,
            record.author_id,
            record.guild_id,
            record.channel_id,
            record.attachments.len()
        );
        Ok(record)
    }

    /// Replace the content of a captured message.
    ///
    /// Returns the record as it was before the edit. Attachments and the
    /// retention deadline are left alone. `NotFound` means the message
    /// expired or was never captured.
    pub async fn update_message_content(
        &self,
        guild_id: &str,
        channel_id: &str,
        message_id: Snowflake,
        content: impl Into<String>,
    ) -> CacheResult<MessageRecord> {
        keys::validate_id("guild", guild_id)?;
        keys::validate_id("channel", channel_id)?;
        let key = keys::message(guild_id, channel_id, message_id);
        let content = content.into();

        self.run("update_message_content", move |engine| {
            engine.write(|batch| {
                let entry = batch.get(&key)?.ok_or(CacheError::NotFound)?;
                let before: MessageRecord = codec::decode(&entry.value)?;

                let mut after = before.clone();
                after.content = content;
                batch.replace_value(&key, &codec::encode(&after)?)?;

                Ok(before)
            })
        })
        .await
    }

    pub async fn get_message(
        &self,
        guild_id: &str,
        channel_id: &str,
        message_id: Snowflake,
    ) -> CacheResult<MessageRecord> {
        keys::validate_id("guild", guild_id)?;
        keys::validate_id("channel", channel_id)?;
        self.message_by_key("get_message", keys::message(guild_id, channel_id, message_id))
            .await
    }

    /// Captured messages among `message_ids` (bulk deletes), ascending by ID.
    ///
    /// IDs that were never captured, expired or are corrupt are left out.
    pub async fn get_messages(
        &self,
        guild_id: &str,
        channel_id: &str,
        message_ids: &[Snowflake],
    ) -> CacheResult<Vec<MessageRecord>> {
        keys::validate_id("guild", guild_id)?;
        keys::validate_id("channel", channel_id)?;

        let mut ids = message_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let wanted: Vec<String> = ids
            .into_iter()
            .map(|id| keys::message(guild_id, channel_id, id))
            .collect();

        self.run("get_messages", move |engine| {
            let view = engine.read()?;
            let mut records = Vec::with_capacity(wanted.len());
            for key in &wanted {
                if let Some(record) = resolve(&view, key)? {
                    records.push(record);
                }
            }
            Ok(records)
        })
        .await
    }

    /// Every live message of `author_id` in the guild, ascending by ID.
    ///
    /// Index entries whose record is gone or unreadable are skipped; they
    /// never fail the call.
    pub async fn get_message_log(
        &self,
        guild_id: &str,
        author_id: &str,
    ) -> CacheResult<Vec<MessageRecord>> {
        keys::validate_id("guild", guild_id)?;
        keys::validate_id("author", author_id)?;
        let prefix = keys::index_author_prefix(guild_id, author_id);
        let author = author_id.to_string();

        let mut records = self
            .run("get_message_log", move |engine| {
                let view = engine.read()?;
                let mut records = Vec::new();

                for (index_key, pointer) in view.scan_prefix(&prefix)? {
                    let Ok(message_key) = String::from_utf8(pointer) else {
                        warn!("Skipping corrupt index entry {}", index_key);
                        continue;
                    };
                    match resolve(&view, &message_key)? {
                        Some(record) if record.author_id == author => records.push(record),
                        Some(_) => {
                            warn!("Index entry {} points at another author's message", index_key)
                        }
                        None => debug!("Skipping dangling index entry {}", index_key),
                    }
                }
                Ok(records)
            })
            .await?;

        records.sort_by_key(|record| record.message_id);
        records.dedup_by_key(|record| record.message_id);
        Ok(records)
    }

    async fn message_by_key(&self, op: &'static str, key: String) -> CacheResult<MessageRecord> {
        self.run(op, move |engine| {
            let entry = engine.get(&key)?.ok_or(CacheError::NotFound)?;
            codec::decode(&entry.value)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use url::Url;

    use crate::cache::AuditConfig;
    use crate::cache::testing::{cache, cache_with, engine};
    use crate::fetcher::stub::{Script, StubFetcher};
    use crate::models::{AttachmentRef, IncomingMessage, Snowflake};
    use crate::store::{OptionalExt, keys};

    const M1: u64 = 1000000000000000001;
    const M2: u64 = 1000000000000000002;
    const M3: u64 = 1000000000000000003;

    fn attachment(name: &str, size: u64) -> AttachmentRef {
        let url = Url::parse(&format!("https://cdn.test/{name}")).unwrap();
        AttachmentRef::new(name, url, size)
    }

    fn ids(records: &[crate::models::MessageRecord]) -> Vec<u64> {
        records.iter().map(|r| r.message_id.0).collect()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let fetcher = StubFetcher::default()
            .with("https://cdn.test/cat.png", Script::Bytes(vec![1, 2, 3]));
        let (cache, _) = cache_with(fetcher, AuditConfig::default());

        let stored = cache
            .put_message(
                IncomingMessage::new("g1", "c1", M1, "u1", "look at this")
                    .with_attachment(attachment("cat.png", 3)),
            )
            .await
            .unwrap();

        let fetched = cache.get_message("g1", "c1", Snowflake(M1)).await.unwrap();
        assert_eq!(fetched, stored);
        assert_eq!(fetched.content, "look at this");
        assert_eq!(fetched.attachments[0].filename, "cat.png");
        assert_eq!(fetched.attachments[0].data, vec![1, 2, 3]);
        assert_eq!(fetched.created_at(), Snowflake(M1).timestamp());
    }

    #[tokio::test]
    async fn test_size_ceiling_filtering() {
        let fetcher = StubFetcher::default()
            .with("https://cdn.test/big.bin", Script::Bytes(vec![0; 16]))
            .with("https://cdn.test/small.bin", Script::Bytes(vec![7; 4]));
        let (cache, _) = cache_with(fetcher, AuditConfig::default().attachment_max_bytes(8));

        let message = IncomingMessage::new("g1", "c1", M1, "u1", "two files")
            .with_attachment(attachment("big.bin", 16))
            .with_attachment(attachment("small.bin", 4));
        cache.put_message(message).await.unwrap();

        let stored = cache.get_message("g1", "c1", Snowflake(M1)).await.unwrap();
        assert_eq!(stored.content, "two files");
        assert_eq!(stored.attachments.len(), 1);
        assert_eq!(stored.attachments[0].filename, "small.bin");
    }

    #[tokio::test]
    async fn test_failed_download_still_stores_message() {
        let fetcher = StubFetcher::default()
            .with("https://cdn.test/broken.png", Script::Fail)
            .with("https://cdn.test/stalled.png", Script::Hang);
        let config = AuditConfig::default().attachment_timeout(Duration::from_millis(50));
        let (cache, _) = cache_with(fetcher, config);

        let message = IncomingMessage::new("g1", "c1", M1, "u1", "hello")
            .with_attachment(attachment("broken.png", 10))
            .with_attachment(attachment("stalled.png", 10));
        let stored = cache.put_message(message).await.unwrap();

        assert!(!stored.has_attachments());
        assert!(cache.get_message("g1", "c1", Snowflake(M1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_chronological_index() {
        let (cache, _) = cache();
        let order = [5u64, 1, 4, 2, 3];
        for (n, id) in order.iter().enumerate() {
            let channel = if n % 2 == 0 { "c1" } else { "c2" };
            cache
                .put_message(IncomingMessage::new(
                    "g1",
                    channel,
                    M1 + id * 1000,
                    "u1",
                    format!("msg {id}"),
                ))
                .await
                .unwrap();
        }
        // Noise: another author, another guild, and a replayed create.
        cache
            .put_message(IncomingMessage::new("g1", "c1", M1 + 2500, "u2", "other"))
            .await
            .unwrap();
        cache
            .put_message(IncomingMessage::new("g2", "c1", M1 + 3500, "u1", "elsewhere"))
            .await
            .unwrap();
        cache
            .put_message(IncomingMessage::new("g1", "c1", M1 + 5000, "u1", "msg 5"))
            .await
            .unwrap();

        let log = cache.get_message_log("g1", "u1").await.unwrap();
        let expected: Vec<u64> = (1..=5).map(|id| M1 + id * 1000).collect();
        assert_eq!(ids(&log), expected);
        assert!(log.iter().all(|r| r.author_id == "u1" && r.guild_id == "g1"));
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let (cache, _) = cache();
        for (id, channel) in [(M3, "c1"), (M1, "c1"), (M2, "c2")] {
            cache
                .put_message(IncomingMessage::new("g1", channel, id, "u1", format!("message {id}")))
                .await
                .unwrap();
        }

        let log = cache.get_message_log("g1", "u1").await.unwrap();
        assert_eq!(ids(&log), vec![M1, M2, M3]);
        let channels: Vec<_> = log.iter().map(|r| r.channel_id.as_str()).collect();
        assert_eq!(channels, vec!["c1", "c2", "c1"]);
    }

    #[tokio::test]
    async fn test_expiry() {
        let (cache, clock) = cache();
        cache
            .put_message(IncomingMessage::new("g1", "c1", M1, "u1", "soon gone"))
            .await
            .unwrap();

        clock.advance(cache.config().retention - Duration::from_secs(1));
        assert!(cache.get_message("g1", "c1", Snowflake(M1)).await.is_ok());

        clock.advance(Duration::from_secs(1));
        let err = cache.get_message("g1", "c1", Snowflake(M1)).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(cache.get_message_log("g1", "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_does_not_refresh_ttl() {
        let (cache, clock) = cache();
        cache
            .put_message(IncomingMessage::new("g1", "c1", M1, "u1", "before"))
            .await
            .unwrap();

        clock.advance(cache.config().retention - Duration::from_secs(60));
        let before = cache
            .update_message_content("g1", "c1", Snowflake(M1), "after")
            .await
            .unwrap();
        assert_eq!(before.content, "before");
        assert_eq!(
            cache.get_message("g1", "c1", Snowflake(M1)).await.unwrap().content,
            "after"
        );

        clock.advance(Duration::from_secs(60));
        assert!(cache.get_message("g1", "c1", Snowflake(M1)).await.found().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_attachments() {
        let fetcher = StubFetcher::default().with("https://cdn.test/a.png", Script::Bytes(vec![9]));
        let (cache, _) = cache_with(fetcher, AuditConfig::default());
        cache
            .put_message(
                IncomingMessage::new("g1", "c1", M1, "u1", "v1")
                    .with_attachment(attachment("a.png", 1)),
            )
            .await
            .unwrap();

        cache.update_message_content("g1", "c1", Snowflake(M1), "v2").await.unwrap();

        let stored = cache.get_message("g1", "c1", Snowflake(M1)).await.unwrap();
        assert_eq!(stored.content, "v2");
        assert_eq!(stored.attachments.len(), 1);
    }

    #[tokio::test]
    async fn test_update_uncaptured_message() {
        let (cache, _) = cache();
        let err = cache
            .update_message_content("g1", "c1", Snowflake(M1), "edit")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_replayed_create_keeps_original() {
        let (cache, clock) = cache();
        cache
            .put_message(IncomingMessage::new("g1", "c1", M1, "u1", "first"))
            .await
            .unwrap();

        clock.advance(cache.config().retention / 2);
        let replay = cache
            .put_message(IncomingMessage::new("g1", "c1", M1, "u1", "second"))
            .await
            .unwrap();
        assert_eq!(replay.content, "first");

        clock.advance(cache.config().retention / 2);
        assert!(cache.get_message("g1", "c1", Snowflake(M1)).await.is_err());
        assert!(cache.get_message_log("g1", "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dangling_pointer_tolerance() {
        let (cache, _) = cache();
        for id in [M1, M2] {
            cache
                .put_message(IncomingMessage::new("g1", "c1", id, "u1", "hi"))
                .await
                .unwrap();
        }

        let doomed = keys::message("g1", "c1", Snowflake(M1));
        assert!(engine(&cache).write(|batch| batch.delete(&doomed)).unwrap());

        let log = cache.get_message_log("g1", "u1").await.unwrap();
        assert_eq!(ids(&log), vec![M2]);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_skipped() {
        let (cache, _) = cache();
        cache
            .put_message(IncomingMessage::new("g1", "c1", M2, "u1", "fine"))
            .await
            .unwrap();

        let key = keys::message("g1", "c1", Snowflake(M1));
        let index = keys::index("g1", "u1", Snowflake(M1));
        engine(&cache)
            .write(|batch| {
                batch.put(&key, b"\xFF\xFF\xFF", Some(Duration::from_secs(60)))?;
                batch.put(&index, key.as_bytes(), Some(Duration::from_secs(60)))
            })
            .unwrap();

        let err = cache.get_message("g1", "c1", Snowflake(M1)).await.unwrap_err();
        assert!(err.is_absent() && !err.is_not_found());

        let log = cache.get_message_log("g1", "u1").await.unwrap();
        assert_eq!(ids(&log), vec![M2]);
    }

    #[tokio::test]
    async fn test_get_messages_for_bulk_delete() {
        let (cache, _) = cache();
        for id in [M1, M3] {
            cache
                .put_message(IncomingMessage::new("g1", "c1", id, "u1", "hi"))
                .await
                .unwrap();
        }

        let found = cache
            .get_messages("g1", "c1", &[Snowflake(M3), Snowflake(M2), Snowflake(M1), Snowflake(M3)])
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![M1, M3]);
    }

    #[tokio::test]
    async fn test_invalid_message_rejected() {
        let (cache, _) = cache();
        let err = cache
            .put_message(IncomingMessage::new("g1", "c1", M1, "", "no author"))
            .await
            .unwrap_err();
        assert!(!err.is_absent());
        assert_eq!(cache.stats().await.unwrap().messages, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates() {
        let (cache, _) = cache();
        let count = 24u64;

        let tasks: Vec<_> = (0..count)
            .map(|n| {
                let cache = cache.clone();
                let channel = format!("c{}", n % 3);
                tokio::spawn(async move {
                    let message = IncomingMessage::new("g1", channel, M1 + n * 1000, "u1", "hi");
                    cache.put_message(message).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stats = cache.stats().await.unwrap();
        assert_eq!((stats.messages, stats.index_entries), (count, count));

        let log = cache.get_message_log("g1", "u1").await.unwrap();
        let expected: Vec<u64> = (0..count).map(|n| M1 + n * 1000).collect();
        assert_eq!(ids(&log), expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_creates_of_one_message() {
        let (cache, _) = cache();

        let race = |content: &'static str| {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .put_message(IncomingMessage::new("g1", "c1", M1, "u1", content))
                    .await
            })
        };
        let (first, second) = (race("first"), race("second"));
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(first, second);
        let stats = cache.stats().await.unwrap();
        assert_eq!((stats.messages, stats.index_entries), (1, 1));

        let stored = cache.get_message("g1", "c1", Snowflake(M1)).await.unwrap();
        assert_eq!(stored, first);
    }
}
