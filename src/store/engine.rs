//! Ordered key-value engine with per-entry TTL.
//!
//! Wraps a `redb` database. Every value is stored behind an 8-byte
//! little-endian deadline (Unix millis, `0` = never expires). Reads treat
//! entries at or past their deadline as absent, so expiry is exact even
//! before the sweeper reclaims the space. A second table maps
//! `{deadline:020}:{key}` to `key` so expired entries can be found in
//! deadline order without scanning the whole keyspace.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::backends::InMemoryBackend;
use redb::{Database, ReadOnlyTable, ReadTransaction, ReadableTable, Table, TableDefinition};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::keys;
use super::{CacheError, CacheResult};

const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");
const EXPIRY: TableDefinition<&str, &str> = TableDefinition::new("expiry");

const DEADLINE_LEN: usize = 8;
const DEADLINE_DIGITS: usize = 20;

/// A live value together with its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Unix millis after which the entry is gone. `None` = no TTL.
    pub expires_at: Option<u64>,
    pub value: Vec<u8>,
}

fn seal(expires_at: Option<u64>, payload: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(DEADLINE_LEN + payload.len());
    raw.extend_from_slice(&expires_at.unwrap_or(0).to_le_bytes());
    raw.extend_from_slice(payload);
    raw
}

fn unseal(raw: &[u8]) -> CacheResult<(Option<u64>, &[u8])> {
    if raw.len() < DEADLINE_LEN {
        return Err(CacheError::Corrupt(format!(
            "value is {} bytes, shorter than its deadline header",
            raw.len()
        )));
    }
    let (head, payload) = raw.split_at(DEADLINE_LEN);
    let mut deadline = [0u8; DEADLINE_LEN];
    deadline.copy_from_slice(head);
    let deadline = u64::from_le_bytes(deadline);
    Ok(((deadline != 0).then_some(deadline), payload))
}

fn expiry_key(deadline: u64, key: &str) -> String {
    format!("{deadline:0width$}:{key}", width = DEADLINE_DIGITS)
}

fn is_expired(expires_at: Option<u64>, now: u64) -> bool {
    expires_at.is_some_and(|deadline| deadline <= now)
}

fn lookup<T>(table: &T, key: &str, now: u64) -> CacheResult<Option<Entry>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let Some(guard) = table.get(key)? else {
        return Ok(None);
    };
    let (expires_at, payload) = unseal(guard.value())?;
    if is_expired(expires_at, now) {
        return Ok(None);
    }
    Ok(Some(Entry {
        expires_at,
        value: payload.to_vec(),
    }))
}

fn scan<T>(table: &T, prefix: &str, now: u64, mut visit: impl FnMut(&str, &[u8])) -> CacheResult<()>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let end = keys::prefix_end(prefix);
    let range = match end.as_deref() {
        Some(end) => table.range(prefix..end)?,
        None => table.range(prefix..)?,
    };

    for item in range {
        let (key, raw) = item?;
        let key = key.value();
        if !key.starts_with(prefix) {
            continue;
        }
        match unseal(raw.value()) {
            Ok((expires_at, _)) if is_expired(expires_at, now) => {}
            Ok((_, payload)) => visit(key, payload),
            Err(e) => warn!("Skipping corrupt entry {}: {}", key, e),
        }
    }
    Ok(())
}

/// Point-in-time read view.
pub struct ReadView {
    entries: ReadOnlyTable<&'static str, &'static [u8]>,
    now: u64,
    _txn: ReadTransaction,
}

impl ReadView {
    pub fn get(&self, key: &str) -> CacheResult<Option<Entry>> {
        lookup(&self.entries, key, self.now)
    }

    /// Live entries whose key starts with `prefix`, in key order.
    pub fn scan_prefix(&self, prefix: &str) -> CacheResult<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        scan(&self.entries, prefix, self.now, |key, value| {
            out.push((key.to_string(), value.to_vec()));
        })?;
        Ok(out)
    }

    pub fn count_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let mut count = 0;
        scan(&self.entries, prefix, self.now, |_, _| count += 1)?;
        Ok(count)
    }
}

/// Mutations staged inside one engine transaction.
///
/// Nothing is visible to readers until the surrounding
/// [`KvEngine::write`] call commits.
pub struct WriteBatch<'txn> {
    entries: Table<'txn, &'static str, &'static [u8]>,
    expiry: Table<'txn, &'static str, &'static str>,
    now: u64,
}

impl WriteBatch<'_> {
    /// Instant (Unix millis) the transaction runs at.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn get(&self, key: &str) -> CacheResult<Option<Entry>> {
        lookup(&self.entries, key, self.now)
    }

    /// Insert or overwrite `key`. `ttl` starts counting now.
    pub fn put(&mut self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let previous = match self.entries.get(key)? {
            Some(guard) => unseal(guard.value()).ok().and_then(|(deadline, _)| deadline),
            None => None,
        };
        if let Some(deadline) = previous {
            self.expiry.remove(expiry_key(deadline, key).as_str())?;
        }

        let expires_at = ttl.map(|ttl| self.now.saturating_add(ttl.as_millis() as u64));
        self.entries.insert(key, seal(expires_at, value).as_slice())?;
        if let Some(deadline) = expires_at {
            self.expiry.insert(expiry_key(deadline, key).as_str(), key)?;
        }
        Ok(())
    }

    /// Replace the value of a live entry, keeping its deadline.
    ///
    /// Returns `false` if the entry is absent or expired.
    pub fn replace_value(&mut self, key: &str, value: &[u8]) -> CacheResult<bool> {
        let Some(entry) = self.get(key)? else {
            return Ok(false);
        };
        self.entries.insert(key, seal(entry.expires_at, value).as_slice())?;
        Ok(true)
    }

    /// Remove `key`. Returns `true` if a live entry was removed.
    pub fn delete(&mut self, key: &str) -> CacheResult<bool> {
        let removed = match self.entries.remove(key)? {
            Some(guard) => Some(unseal(guard.value()).map(|(deadline, _)| deadline)),
            None => None,
        };

        match removed {
            None => Ok(false),
            Some(Ok(deadline)) => {
                if let Some(deadline) = deadline {
                    self.expiry.remove(expiry_key(deadline, key).as_str())?;
                }
                Ok(!is_expired(deadline, self.now))
            }
            // A corrupt value is still something that was there.
            Some(Err(_)) => Ok(true),
        }
    }

    /// Drop up to `limit` entries whose deadline has passed.
    ///
    /// Returns the number of expiry records processed; `0` means there is
    /// nothing left to reclaim right now.
    pub fn purge_expired(&mut self, limit: usize) -> CacheResult<usize> {
        let upper = format!("{:0width$}", self.now.saturating_add(1), width = DEADLINE_DIGITS);

        let mut due = Vec::new();
        for item in self.expiry.range(..upper.as_str())?.take(limit) {
            let (expiry, key) = item?;
            due.push((expiry.value().to_string(), key.value().to_string()));
        }

        for (expiry, key) in &due {
            self.expiry.remove(expiry.as_str())?;

            let deadline = expiry
                .get(..DEADLINE_DIGITS)
                .and_then(|digits| digits.parse::<u64>().ok());
            let stale = match self.entries.get(key.as_str())? {
                Some(guard) => match unseal(guard.value()) {
                    Ok((current, _)) => current.is_some() && current == deadline,
                    Err(_) => true,
                },
                None => false,
            };
            if stale {
                self.entries.remove(key.as_str())?;
            }
        }

        Ok(due.len())
    }
}

/// Embedded ordered KV store with TTL, prefix scans and transactions.
pub struct KvEngine {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl KvEngine {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> CacheResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Engine(redb::Error::Io(e)))?;
        }

        let db = Database::create(path)?;
        info!("Opened audit store at {}", path.display());
        Self::init(db, clock)
    }

    /// Volatile engine, used by tests and dry runs.
    pub fn in_memory(clock: Arc<dyn Clock>) -> CacheResult<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db, clock)
    }

    fn init(db: Database, clock: Arc<dyn Clock>) -> CacheResult<Self> {
        // Read transactions fail on tables that were never created.
        let txn = db.begin_write()?;
        {
            txn.open_table(ENTRIES)?;
            txn.open_table(EXPIRY)?;
        }
        txn.commit()?;

        Ok(Self { db, clock })
    }

    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    pub fn read(&self) -> CacheResult<ReadView> {
        let txn = self.db.begin_read()?;
        let entries = txn.open_table(ENTRIES)?;
        Ok(ReadView {
            entries,
            now: self.now_millis(),
            _txn: txn,
        })
    }

    /// Run `f` in a write transaction.
    ///
    /// Commits when `f` returns `Ok`; aborts and discards every staged
    /// mutation when it returns `Err`.
    pub fn write<T>(
        &self,
        f: impl FnOnce(&mut WriteBatch<'_>) -> CacheResult<T>,
    ) -> CacheResult<T> {
        let txn = self.db.begin_write()?;
        let outcome = {
            let mut batch = WriteBatch {
                entries: txn.open_table(ENTRIES)?,
                expiry: txn.open_table(EXPIRY)?,
                now: self.now_millis(),
            };
            f(&mut batch)
        };

        match outcome {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.abort()?;
                Err(e)
            }
        }
    }

    pub fn get(&self, key: &str) -> CacheResult<Option<Entry>> {
        self.read()?.get(key)
    }

    pub fn scan_prefix(&self, prefix: &str) -> CacheResult<Vec<(String, Vec<u8>)>> {
        self.read()?.scan_prefix(prefix)
    }

    pub fn count_prefix(&self, prefix: &str) -> CacheResult<u64> {
        self.read()?.count_prefix(prefix)
    }

    /// One reclamation pass of at most `limit` expired entries.
    pub fn purge_expired(&self, limit: usize) -> CacheResult<usize> {
        let purged = self.write(|batch| batch.purge_expired(limit))?;
        if purged > 0 {
            debug!("Purged {} expired entries", purged);
        }
        Ok(purged)
    }
}

impl std::fmt::Debug for KvEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvEngine").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ManualClock;

    fn engine() -> (KvEngine, ManualClock) {
        let clock = ManualClock::default();
        let engine = KvEngine::in_memory(Arc::new(clock.clone())).unwrap();
        (engine, clock)
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_put_get_without_ttl() {
        let (engine, clock) = engine();
        engine.write(|b| b.put("member:g:u", b"alice", None)).unwrap();

        clock.advance(HOUR * 1000);

        let entry = engine.get("member:g:u").unwrap().unwrap();
        assert_eq!(entry.value, b"alice");
        assert_eq!(entry.expires_at, None);
    }

    #[test]
    fn test_ttl_expiry_is_exact() {
        let (engine, clock) = engine();
        engine.write(|b| b.put("k", b"v", Some(HOUR))).unwrap();

        clock.advance(HOUR - Duration::from_millis(1));
        assert!(engine.get("k").unwrap().is_some());

        clock.advance(Duration::from_millis(1));
        assert!(engine.get("k").unwrap().is_none());
    }

    #[test]
    fn test_scan_prefix_in_key_order_skips_expired() {
        let (engine, clock) = engine();
        engine
            .write(|b| {
                b.put("index:g:u:2", b"two", Some(HOUR * 2))?;
                b.put("index:g:u:1", b"one", Some(HOUR * 2))?;
                b.put("index:g:u:3", b"three", Some(HOUR))?;
                b.put("index:g:v:1", b"other", Some(HOUR * 2))?;
                Ok(())
            })
            .unwrap();

        clock.advance(HOUR);

        let hits = engine.scan_prefix("index:g:u:").unwrap();
        let keys: Vec<_> = hits.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["index:g:u:1", "index:g:u:2"]);
        assert_eq!(engine.count_prefix("index:").unwrap(), 3);
    }

    #[test]
    fn test_failed_write_is_rolled_back() {
        let (engine, _) = engine();
        let result: CacheResult<()> = engine.write(|b| {
            b.put("message:g:c:1", b"record", Some(HOUR))?;
            Err(CacheError::Invalid("boom".into()))
        });

        assert!(result.is_err());
        assert!(engine.get("message:g:c:1").unwrap().is_none());
    }

    #[test]
    fn test_replace_value_keeps_deadline() {
        let (engine, clock) = engine();
        engine.write(|b| b.put("k", b"old", Some(HOUR))).unwrap();
        let before = engine.get("k").unwrap().unwrap().expires_at;

        clock.advance(HOUR / 2);
        assert!(engine.write(|b| b.replace_value("k", b"new")).unwrap());

        let after = engine.get("k").unwrap().unwrap();
        assert_eq!(after.value, b"new");
        assert_eq!(after.expires_at, before);

        clock.advance(HOUR / 2);
        assert!(engine.get("k").unwrap().is_none());
        assert!(!engine.write(|b| b.replace_value("k", b"late")).unwrap());
    }

    #[test]
    fn test_delete() {
        let (engine, _) = engine();
        engine.write(|b| b.put("k", b"v", None)).unwrap();

        assert!(engine.write(|b| b.delete("k")).unwrap());
        assert!(!engine.write(|b| b.delete("k")).unwrap());
        assert!(engine.get("k").unwrap().is_none());
    }

    #[test]
    fn test_purge_expired() {
        let (engine, clock) = engine();
        engine
            .write(|b| {
                b.put("a", b"1", Some(HOUR))?;
                b.put("b", b"2", Some(HOUR))?;
                b.put("c", b"3", Some(HOUR * 3))?;
                b.put("d", b"4", None)?;
                Ok(())
            })
            .unwrap();

        assert_eq!(engine.purge_expired(10).unwrap(), 0);

        clock.advance(HOUR * 2);
        assert_eq!(engine.purge_expired(1).unwrap(), 1);
        assert_eq!(engine.purge_expired(10).unwrap(), 1);
        assert_eq!(engine.purge_expired(10).unwrap(), 0);

        // Nothing live was touched.
        assert!(engine.get("c").unwrap().is_some());
        assert!(engine.get("d").unwrap().is_some());
    }

    #[test]
    fn test_overwrite_moves_deadline_record() {
        let (engine, clock) = engine();
        engine.write(|b| b.put("k", b"v1", Some(HOUR))).unwrap();
        engine.write(|b| b.put("k", b"v2", Some(HOUR * 3))).unwrap();

        clock.advance(HOUR * 2);
        // The stale first deadline must not reclaim the rewritten entry.
        assert_eq!(engine.purge_expired(10).unwrap(), 0);
        assert_eq!(engine.get("k").unwrap().unwrap().value, b"v2");
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.redb");
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());

        {
            let engine = KvEngine::open(&path, clock.clone()).unwrap();
            engine.write(|b| b.put("member:g:u", b"kept", None)).unwrap();
        }

        let engine = KvEngine::open(&path, clock).unwrap();
        assert_eq!(engine.get("member:g:u").unwrap().unwrap().value, b"kept");
    }

    #[test]
    fn test_unseal_rejects_short_values() {
        assert!(matches!(unseal(b"abc"), Err(CacheError::Corrupt(_))));
        assert_eq!(unseal(&seal(None, b"x")).unwrap(), (None, &b"x"[..]));
        assert_eq!(unseal(&seal(Some(7), b"")).unwrap(), (Some(7), &b""[..]));
    }
}
