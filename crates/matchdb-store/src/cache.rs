use std::sync::{Arc, Mutex};

use lru::LruCache;

use matchdb_types::{LongKey, StoredRecord};

/// Estimated per-entry bookkeeping cost beyond the record bytes.
const ENTRY_OVERHEAD: u64 = 64;

struct Inner {
    map: LruCache<LongKey, Arc<StoredRecord>>,
    resident: u64,
}

/// Capacity-bounded in-memory table of long key → record.
///
/// The cache is a best-effort accelerator in front of the backing store:
/// it never reports errors, and a failed or skipped admission only means a
/// slower read later. Entries are always persisted before admission, so
/// eviction is a pure drop — there is no flush path. Records are held
/// behind `Arc`, so an entry evicted while another operation still reads
/// it stays valid for that reader.
///
/// Eviction is least-recently-used, triggered when resident bytes exceed
/// the budget. Admission with `try_cache = false` is advisory: the entry
/// is skipped when it would not fit without evicting.
pub struct ObjectCache {
    inner: Mutex<Inner>,
    budget: u64,
}

impl ObjectCache {
    /// Create a cache with the given resident-byte budget.
    pub fn new(budget: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: LruCache::unbounded(),
                resident: 0,
            }),
            budget,
        }
    }

    fn cost(record: &StoredRecord) -> u64 {
        record.size + ENTRY_OVERHEAD
    }

    fn admit(&self, inner: &mut Inner, key: LongKey, record: Arc<StoredRecord>, try_cache: bool) {
        let cost = Self::cost(&record);
        if !try_cache && !inner.map.contains(&key) && inner.resident + cost > self.budget {
            return;
        }
        if let Some(old) = inner.map.put(key, record) {
            inner.resident -= Self::cost(&old);
        }
        inner.resident += cost;
        while inner.resident > self.budget {
            match inner.map.pop_lru() {
                Some((_, evicted)) => inner.resident -= Self::cost(&evicted),
                None => break,
            }
        }
    }

    /// Insert or overwrite an entry. `try_cache = false` marks the entry
    /// as not worth retaining when the cache is near budget.
    pub fn put(&self, key: LongKey, record: Arc<StoredRecord>, try_cache: bool) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        self.admit(&mut inner, key, record, try_cache);
    }

    /// Batch insert, used after bulk loads.
    pub fn put_all(
        &self,
        entries: impl IntoIterator<Item = (LongKey, Arc<StoredRecord>)>,
        try_cache: bool,
    ) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        for (key, record) in entries {
            self.admit(&mut inner, key, record, try_cache);
        }
    }

    /// Look up an entry, marking it most recently used.
    /// Absence means "not resident, consult the backing store".
    pub fn get(&self, key: LongKey) -> Option<Arc<StoredRecord>> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.map.get(&key).cloned()
    }

    /// Whether the key is resident. Does not touch recency.
    pub fn contains(&self, key: LongKey) -> bool {
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner.map.contains(&key)
    }

    /// Drop an entry without touching the backing store.
    pub fn remove(&self, key: LongKey) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if let Some(old) = inner.map.pop(&key) {
            inner.resident -= Self::cost(&old);
        }
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").map.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resident bytes, including per-entry overhead.
    pub fn resident_bytes(&self) -> u64 {
        self.inner.lock().expect("cache lock poisoned").resident
    }

    /// The configured byte budget.
    pub fn budget(&self) -> u64 {
        self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchdb_types::TypeTag;

    fn record(len: usize) -> Arc<StoredRecord> {
        Arc::new(StoredRecord::new(TypeTag::new("t"), vec![0u8; len]))
    }

    fn key(n: u64) -> LongKey {
        LongKey::from_raw(n)
    }

    #[test]
    fn put_get_remove() {
        let cache = ObjectCache::new(10_000);
        cache.put(key(1), record(100), true);
        assert!(cache.contains(key(1)));
        assert_eq!(cache.get(key(1)).unwrap().size, 100);

        cache.remove(key(1));
        assert!(!cache.contains(key(1)));
        assert!(cache.get(key(1)).is_none());
        assert_eq!(cache.resident_bytes(), 0);
    }

    #[test]
    fn eviction_is_least_recently_used() {
        // Budget fits two entries of cost 100 + overhead.
        let cache = ObjectCache::new(2 * (100 + ENTRY_OVERHEAD));
        cache.put(key(1), record(100), true);
        cache.put(key(2), record(100), true);

        // Touch 1 so 2 becomes the eviction victim.
        assert!(cache.get(key(1)).is_some());
        cache.put(key(3), record(100), true);

        assert!(cache.contains(key(1)));
        assert!(!cache.contains(key(2)));
        assert!(cache.contains(key(3)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn advisory_put_skips_when_full() {
        let cache = ObjectCache::new(100 + ENTRY_OVERHEAD);
        cache.put(key(1), record(100), true);

        cache.put(key(2), record(100), false);
        assert!(!cache.contains(key(2)));
        assert!(cache.contains(key(1)));
    }

    #[test]
    fn advisory_put_admits_when_room() {
        let cache = ObjectCache::new(10_000);
        cache.put(key(1), record(100), false);
        assert!(cache.contains(key(1)));
    }

    #[test]
    fn advisory_put_still_overwrites_resident_entry() {
        let cache = ObjectCache::new(100 + ENTRY_OVERHEAD);
        cache.put(key(1), record(100), true);
        cache.put(key(1), record(100), false);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn overwrite_adjusts_resident_bytes() {
        let cache = ObjectCache::new(10_000);
        cache.put(key(1), record(100), true);
        cache.put(key(1), record(50), true);
        assert_eq!(cache.resident_bytes(), 50 + ENTRY_OVERHEAD);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicted_entry_stays_valid_for_holder() {
        let cache = ObjectCache::new(100 + ENTRY_OVERHEAD);
        cache.put(key(1), record(100), true);
        let held = cache.get(key(1)).unwrap();

        cache.put(key(2), record(100), true); // evicts 1
        assert!(!cache.contains(key(1)));
        assert_eq!(held.size, 100);
        assert_eq!(held.data.len(), 100);
    }

    #[test]
    fn put_all_admits_batch() {
        let cache = ObjectCache::new(10_000);
        cache.put_all((0..5).map(|i| (key(i), record(10))), false);
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn oversized_entry_does_not_stick() {
        let cache = ObjectCache::new(64);
        cache.put(key(1), record(1000), true);
        assert!(cache.is_empty());
        assert_eq!(cache.resident_bytes(), 0);
    }

    #[test]
    fn remove_unknown_key_is_noop() {
        let cache = ObjectCache::new(1000);
        cache.remove(key(42));
        assert!(cache.is_empty());
    }
}
