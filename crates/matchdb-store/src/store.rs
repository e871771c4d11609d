use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

use matchdb_backend::{EngineError, Locator, RecordEngine, RecordEnvelope, TypeScan};
use matchdb_types::{LongKey, MatchRecord, Progress, StoredRecord, TypeTag};

use crate::cache::ObjectCache;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

/// The resources serialized by the store-wide gate: the engine connection
/// and the long-key → locator directory. Nothing else needs it.
struct Gate {
    engine: Option<RecordEngine>,
    directory: HashMap<LongKey, Locator>,
}

/// An open streaming type scan, consumed batch by batch through
/// [`ObjectStore::next_scan_batch`].
pub struct ScanSession {
    scan: TypeScan,
}

impl ScanSession {
    /// The tag this session enumerates.
    pub fn tag(&self) -> &TypeTag {
        self.scan.tag()
    }

    /// Whether the underlying scan has reached its bound.
    pub fn is_exhausted(&self) -> bool {
        self.scan.is_exhausted()
    }
}

/// Cached, gated object store over one record-engine directory.
///
/// Callers address records by string key; the store derives the 64-bit long
/// key, probes the cache, and falls through to the backing engine on miss.
/// Every engine-touching operation serializes on one store-wide gate; cache
/// hits synchronize only on the cache's own lock and never contend with
/// engine I/O. The store runs no threads of its own.
pub struct ObjectStore {
    name: String,
    dir: PathBuf,
    config: StoreConfig,
    cache: ObjectCache,
    gate: Mutex<Gate>,
    /// Lets cache-only paths fail fast after `close` without taking the gate.
    closed: AtomicBool,
}

/// Engine failures that mean "this record is gone", not "the store broke".
fn dangling(error: &EngineError) -> bool {
    matches!(
        error,
        EngineError::RecordMissing
            | EngineError::CorruptRecord { .. }
            | EngineError::Serialization(_)
    )
}

/// Translate an engine failure that the store cannot absorb.
fn fatal(error: EngineError) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

impl ObjectStore {
    /// Establish a store named `name` under `parent`.
    ///
    /// With `reset_existing`, a store already present at that location is
    /// deleted before a fresh one is created. The key directory is seeded
    /// from the engine's live table, so records written in earlier sessions
    /// are addressable immediately.
    pub fn open(
        parent: &Path,
        name: &str,
        reset_existing: bool,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        std::fs::create_dir_all(parent).map_err(|e| {
            StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
        })?;
        let dir = parent.join(name);
        if reset_existing && RecordEngine::exists(&dir) {
            std::fs::remove_dir_all(&dir).map_err(|e| {
                StoreError::Unavailable(format!("cannot reset {}: {e}", dir.display()))
            })?;
        }
        let engine = if RecordEngine::exists(&dir) {
            RecordEngine::open(&dir)
        } else {
            RecordEngine::create(&dir, name)
        }
        .map_err(fatal)?;

        let directory = engine.directory().into_iter().collect();
        Ok(Self {
            name: name.to_string(),
            dir,
            cache: ObjectCache::new(config.cache_budget),
            config,
            gate: Mutex::new(Gate {
                engine: Some(engine),
                directory,
            }),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// The store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The object cache in front of the engine.
    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// Persist one record under `string_key` and return its long key.
    ///
    /// Existing keys are overwritten in place (the previous record is
    /// tombstoned). The engine write, the directory update, and the cache
    /// admission form a single gated critical section, so no concurrent
    /// reader can observe the key half-inserted.
    pub fn insert<R: MatchRecord>(
        &self,
        string_key: &str,
        record: &R,
        try_cache: bool,
    ) -> StoreResult<LongKey> {
        let long_key = LongKey::derive(string_key);
        let stored = record
            .encode()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let envelope = RecordEnvelope {
            long_key,
            tag: stored.tag.clone(),
            data: stored.data.clone(),
        };

        let mut guard = self.gate.lock().expect("store gate poisoned");
        let gate = &mut *guard;
        let engine = gate.engine.as_ref().ok_or(StoreError::Closed)?;

        if let Some(old) = gate.directory.get(&long_key).copied() {
            engine.delete(old).map_err(fatal)?;
        }
        let locator = engine.save(&envelope).map_err(fatal)?;
        gate.directory.insert(long_key, locator);
        self.cache.put(long_key, Arc::new(stored), try_cache);
        Ok(long_key)
    }

    /// Persist many records, checking for cancellation between objects.
    ///
    /// Returns the long keys of the records actually inserted. On
    /// cancellation the records already written stay persisted; nothing is
    /// rolled back.
    pub fn insert_batch<R: MatchRecord>(
        &self,
        entries: &[(String, R)],
        progress: &dyn Progress,
    ) -> StoreResult<Vec<LongKey>> {
        let mut inserted = Vec::with_capacity(entries.len());
        for (string_key, record) in entries {
            if progress.is_cancelled() {
                break;
            }
            inserted.push(self.insert(string_key, record, true)?);
            progress.advance(1);
        }
        Ok(inserted)
    }

    /// Retrieve the record with the given long key.
    ///
    /// Cache hits return without touching the gate. On a miss the record is
    /// loaded from the engine, the directory entry is refreshed, and the
    /// cache is warmed. A directory entry whose locator no longer resolves
    /// is logged, dropped, and reported as absent.
    pub fn get(&self, long_key: LongKey) -> StoreResult<Option<Arc<StoredRecord>>> {
        self.ensure_open()?;
        if let Some(hit) = self.cache.get(long_key) {
            return Ok(Some(hit));
        }

        let loaded = {
            let mut guard = self.gate.lock().expect("store gate poisoned");
            let gate = &mut *guard;
            let engine = gate.engine.as_ref().ok_or(StoreError::Closed)?;

            // Another thread may have warmed the cache while we waited.
            if let Some(hit) = self.cache.get(long_key) {
                return Ok(Some(hit));
            }
            let Some(locator) = gate.directory.get(&long_key).copied() else {
                return Ok(None);
            };
            match engine.load(locator) {
                Ok(envelope) => Arc::new(StoredRecord::new(envelope.tag, envelope.data)),
                Err(e) if dangling(&e) => {
                    warn!(key = %long_key, error = %e, "dropping dangling directory entry");
                    gate.directory.remove(&long_key);
                    return Ok(None);
                }
                Err(e) => return Err(fatal(e)),
            }
        };

        self.cache.put(long_key, Arc::clone(&loaded), false);
        Ok(Some(loaded))
    }

    /// Retrieve and decode the record with the given long key.
    pub fn get_as<R: MatchRecord>(&self, long_key: LongKey) -> StoreResult<Option<R>> {
        match self.get(long_key)? {
            Some(record) => {
                let decoded = R::decode(&record)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }

    /// Resolve string keys to long keys, loading every cache miss in one
    /// gated session and warming the cache with the loaded batch.
    ///
    /// The result preserves input order. Keys not reached before a
    /// cancellation are omitted; keys with no persisted record still
    /// resolve (the long key is a pure function of the string key).
    pub fn get_batch(
        &self,
        string_keys: &[String],
        progress: &dyn Progress,
    ) -> StoreResult<Vec<LongKey>> {
        let mut resolved = Vec::with_capacity(string_keys.len());
        let mut warm: Vec<(LongKey, Arc<StoredRecord>)> = Vec::new();
        {
            let mut guard = self.gate.lock().expect("store gate poisoned");
            let gate = &mut *guard;
            let engine = gate.engine.as_ref().ok_or(StoreError::Closed)?;

            for string_key in string_keys {
                if progress.is_cancelled() {
                    break;
                }
                let long_key = LongKey::derive(string_key);
                resolved.push(long_key);

                if self.cache.contains(long_key) {
                    progress.advance(1);
                    continue;
                }
                let Some(locator) = gate.directory.get(&long_key).copied() else {
                    progress.advance(1);
                    continue;
                };
                match engine.load(locator) {
                    Ok(envelope) => {
                        warm.push((
                            long_key,
                            Arc::new(StoredRecord::new(envelope.tag, envelope.data)),
                        ));
                    }
                    Err(e) if dangling(&e) => {
                        warn!(key = %long_key, error = %e, "dropping dangling directory entry");
                        gate.directory.remove(&long_key);
                    }
                    Err(e) => return Err(fatal(e)),
                }
                progress.advance(1);
            }
        }
        if !progress.is_cancelled() {
            self.cache.put_all(warm, false);
        }
        Ok(resolved)
    }

    /// Open a streaming scan over all persisted records of one type.
    pub fn open_scan(&self, tag: &TypeTag) -> StoreResult<ScanSession> {
        let guard = self.gate.lock().expect("store gate poisoned");
        let engine = guard.engine.as_ref().ok_or(StoreError::Closed)?;
        let scan = engine.browse_by_type(tag).map_err(fatal)?;
        Ok(ScanSession { scan })
    }

    /// Pull the next batch of at most `max` long keys from a scan session,
    /// refreshing the directory and warming the cache for the batch.
    ///
    /// Returns an empty batch once the scan is exhausted or cancellation is
    /// observed.
    pub fn next_scan_batch(
        &self,
        session: &mut ScanSession,
        max: usize,
        progress: &dyn Progress,
    ) -> StoreResult<Vec<LongKey>> {
        if progress.is_cancelled() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        let mut warm = Vec::new();
        {
            let mut guard = self.gate.lock().expect("store gate poisoned");
            let gate = &mut *guard;
            if gate.engine.is_none() {
                return Err(StoreError::Closed);
            }
            let chunk = session.scan.next_chunk(max).map_err(fatal)?;
            for (locator, envelope) in chunk {
                keys.push(envelope.long_key);
                gate.directory.insert(envelope.long_key, locator);
                warm.push((
                    envelope.long_key,
                    Arc::new(StoredRecord::new(envelope.tag, envelope.data)),
                ));
            }
        }
        progress.advance(keys.len() as u64);
        self.cache.put_all(warm, false);
        Ok(keys)
    }

    /// Enumerate all persisted records of one type, warming the cache.
    pub fn scan_by_type(&self, tag: &TypeTag, progress: &dyn Progress) -> StoreResult<Vec<LongKey>> {
        self.scan_by_type_batched(tag, self.config.scan_batch, progress)
    }

    /// Enumerate all persisted records of one type in bounded batches of
    /// `batch_size`, one gated session per batch.
    pub fn scan_by_type_batched(
        &self,
        tag: &TypeTag,
        batch_size: usize,
        progress: &dyn Progress,
    ) -> StoreResult<Vec<LongKey>> {
        let mut session = self.open_scan(tag)?;
        let mut keys = Vec::new();
        loop {
            let batch = self.next_scan_batch(&mut session, batch_size, progress)?;
            if batch.is_empty() {
                break;
            }
            keys.extend(batch);
        }
        Ok(keys)
    }

    /// Number of persisted records of one type, read from the engine.
    pub fn count(&self, tag: &TypeTag) -> StoreResult<u64> {
        let guard = self.gate.lock().expect("store gate poisoned");
        let engine = guard.engine.as_ref().ok_or(StoreError::Closed)?;
        Ok(engine.count_by_type(tag))
    }

    /// All tags with at least one persisted record, with counts.
    pub fn type_counts(&self) -> StoreResult<Vec<(TypeTag, u64)>> {
        let guard = self.gate.lock().expect("store gate poisoned");
        let engine = guard.engine.as_ref().ok_or(StoreError::Closed)?;
        Ok(engine.tag_counts())
    }

    /// Whether a record for `string_key` is resident in the cache or
    /// present in the key directory.
    pub fn exists(&self, string_key: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        let long_key = LongKey::derive(string_key);
        if self.cache.contains(long_key) {
            return Ok(true);
        }
        let guard = self.gate.lock().expect("store gate poisoned");
        if guard.engine.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(guard.directory.contains_key(&long_key))
    }

    /// Delete the record for `string_key`: cache entry, directory entry,
    /// then the engine record, in that order. Unknown keys are a no-op.
    pub fn delete(&self, string_key: &str) -> StoreResult<()> {
        let long_key = LongKey::derive(string_key);
        self.cache.remove(long_key);

        let mut guard = self.gate.lock().expect("store gate poisoned");
        let gate = &mut *guard;
        let engine = gate.engine.as_ref().ok_or(StoreError::Closed)?;
        if let Some(locator) = gate.directory.remove(&long_key) {
            engine.delete(locator).map_err(fatal)?;
        }
        Ok(())
    }

    /// Flush and release the engine connection. Idempotent; every other
    /// operation afterwards fails with [`StoreError::Closed`].
    pub fn close(&self) -> StoreResult<()> {
        let mut guard = self.gate.lock().expect("store gate poisoned");
        self.closed.store(true, Ordering::SeqCst);
        match guard.engine.take() {
            Some(engine) => engine.close().map_err(fatal),
            None => Ok(()),
        }
    }
}
