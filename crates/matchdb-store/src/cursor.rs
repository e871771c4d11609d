use std::collections::VecDeque;
use std::sync::Arc;

use matchdb_types::{LongKey, MatchRecord, Progress, StoredRecord, TypeTag};

use crate::error::StoreResult;
use crate::store::{ObjectStore, ScanSession};

/// Long keys prefetched per batch, balancing engine round-trips against
/// memory held per prefetch.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Lifecycle of a [`BatchCursor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorState {
    /// Constructed, nothing consumed yet.
    Created,
    /// At least one record consumed.
    Iterating,
    /// All records consumed.
    Exhausted,
    /// Cancellation observed; no further records will be returned.
    Cancelled,
}

enum Source {
    /// Explicit ordered key list.
    Keys(Vec<String>),
    /// Streaming type scan; keys are pulled lazily in fixed chunks and
    /// never materialized up front.
    Scan(ScanSession),
}

/// Forward-only, single-pass cursor streaming records in prefetched batches.
///
/// The cursor prefetches [`DEFAULT_BATCH_SIZE`] long keys at a time through
/// the store's batch-load path (which warms the cache), then resolves each
/// record through [`ObjectStore::get`]. It is not restartable, and its
/// position never decreases.
///
/// Cancellation is cooperative: once the progress sink reports it,
/// [`next`](BatchCursor::next) returns `Ok(None)` and the cursor stays
/// cancelled. No error is raised.
pub struct BatchCursor<'a> {
    store: &'a ObjectStore,
    progress: &'a dyn Progress,
    source: Source,
    buffer: VecDeque<LongKey>,
    position: u64,
    total: u64,
    state: CursorState,
    batch_size: usize,
}

impl<'a> BatchCursor<'a> {
    /// Cursor over an explicit ordered list of string keys.
    pub fn over_keys(
        store: &'a ObjectStore,
        keys: Vec<String>,
        progress: &'a dyn Progress,
    ) -> Self {
        let total = keys.len() as u64;
        Self {
            store,
            progress,
            source: Source::Keys(keys),
            buffer: VecDeque::new(),
            position: 0,
            total,
            state: CursorState::Created,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Cursor over every persisted record of one type.
    ///
    /// The total is the type count at construction; records inserted or
    /// deleted while iterating are not reflected in it.
    pub fn over_type(
        store: &'a ObjectStore,
        tag: &TypeTag,
        progress: &'a dyn Progress,
    ) -> StoreResult<Self> {
        let total = store.count(tag)?;
        let session = store.open_scan(tag)?;
        Ok(Self {
            store,
            progress,
            source: Source::Scan(session),
            buffer: VecDeque::new(),
            position: 0,
            total,
            state: CursorState::Created,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Override the prefetch batch size. Intended for tests and tooling.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Whether another record may be available.
    ///
    /// Like the total, this is advisory under concurrent mutation of the
    /// store: `next` is the authority.
    pub fn has_next(&self) -> bool {
        !matches!(self.state, CursorState::Exhausted | CursorState::Cancelled)
            && self.position < self.total
    }

    /// Records consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Records the cursor was constructed over.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Return the next record, or `Ok(None)` once exhausted or cancelled.
    ///
    /// This is the sole mutator: it refills the lookahead buffer when empty
    /// and advances the position. Records deleted between prefetch and
    /// resolution are skipped.
    pub fn next(&mut self) -> StoreResult<Option<Arc<StoredRecord>>> {
        loop {
            if matches!(self.state, CursorState::Exhausted | CursorState::Cancelled) {
                return Ok(None);
            }
            if self.progress.is_cancelled() {
                self.state = CursorState::Cancelled;
                return Ok(None);
            }
            if self.position >= self.total {
                self.state = CursorState::Exhausted;
                return Ok(None);
            }
            if self.buffer.is_empty() {
                self.refill()?;
                if self.buffer.is_empty() {
                    self.state = if self.progress.is_cancelled() {
                        CursorState::Cancelled
                    } else {
                        CursorState::Exhausted
                    };
                    return Ok(None);
                }
            }
            let Some(long_key) = self.buffer.pop_front() else {
                self.state = CursorState::Exhausted;
                return Ok(None);
            };
            self.position += 1;
            self.state = CursorState::Iterating;
            match self.store.get(long_key)? {
                Some(record) => return Ok(Some(record)),
                None => continue, // deleted between prefetch and resolve
            }
        }
    }

    /// Return and decode the next record.
    pub fn next_as<R: MatchRecord>(&mut self) -> StoreResult<Option<R>> {
        match self.next()? {
            Some(record) => {
                let decoded = R::decode(&record)
                    .map_err(|e| crate::error::StoreError::Serialization(e.to_string()))?;
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }

    fn refill(&mut self) -> StoreResult<()> {
        match &mut self.source {
            Source::Keys(keys) => {
                let start = self.position as usize;
                let end = start.saturating_add(self.batch_size).min(keys.len());
                if start >= end {
                    return Ok(());
                }
                let resolved = self.store.get_batch(&keys[start..end], self.progress)?;
                self.buffer.extend(resolved);
            }
            Source::Scan(session) => {
                let batch =
                    self.store
                        .next_scan_batch(session, self.batch_size, self.progress)?;
                self.buffer.extend(batch);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use matchdb_types::{CancelFlag, Never, PeptideMatch, SpectrumMatch};
    use std::path::Path;

    fn spectrum_match(title: &str) -> SpectrumMatch {
        SpectrumMatch {
            title: title.to_string(),
            best_sequence: None,
            score: 1.0,
            charge: 2,
        }
    }

    fn open_store(dir: &Path) -> ObjectStore {
        ObjectStore::open(dir, "proj", false, StoreConfig::default()).unwrap()
    }

    fn populate(store: &ObjectStore, n: usize) -> Vec<String> {
        let keys: Vec<String> = (0..n).map(|i| format!("scan={i}")).collect();
        for key in &keys {
            store.insert(key, &spectrum_match(key), false).unwrap();
        }
        keys
    }

    #[test]
    fn over_keys_yields_everything_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let keys = populate(&store, 30);

        let mut cursor =
            BatchCursor::over_keys(&store, keys.clone(), &Never).with_batch_size(7);
        assert_eq!(cursor.state(), CursorState::Created);
        assert_eq!(cursor.total(), 30);

        let mut seen = Vec::new();
        while let Some(record) = cursor.next().unwrap() {
            let m = SpectrumMatch::decode(&record).unwrap();
            seen.push(m.title);
        }
        assert_eq!(seen, keys);
        assert_eq!(cursor.state(), CursorState::Exhausted);
        assert!(!cursor.has_next());
        assert_eq!(cursor.position(), 30);
    }

    #[test]
    fn over_type_streams_all_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        populate(&store, 50);
        store
            .insert("pep", &PeptideMatch {
                sequence: "pep".into(),
                spectrum_count: 1,
                confidence: 0.5,
            }, false)
            .unwrap();

        let mut cursor = BatchCursor::over_type(&store, &SpectrumMatch::tag(), &Never)
            .unwrap()
            .with_batch_size(16);
        assert_eq!(cursor.total(), 50);

        let mut count = 0;
        while let Some(record) = cursor.next().unwrap() {
            assert_eq!(record.tag, SpectrumMatch::tag());
            count += 1;
        }
        assert_eq!(count, 50);
        assert_eq!(cursor.state(), CursorState::Exhausted);
    }

    #[test]
    fn next_as_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        populate(&store, 3);

        let mut cursor = BatchCursor::over_type(&store, &SpectrumMatch::tag(), &Never).unwrap();
        let first: SpectrumMatch = cursor.next_as().unwrap().unwrap();
        assert!(first.title.starts_with("scan="));
    }

    #[test]
    fn cancellation_stops_iteration_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let keys = populate(&store, 100);

        let flag = CancelFlag::new();
        let mut cursor = BatchCursor::over_keys(&store, keys, &flag).with_batch_size(10);

        let mut consumed = 0;
        for _ in 0..25 {
            assert!(cursor.next().unwrap().is_some());
            consumed += 1;
        }
        flag.cancel();

        assert!(cursor.next().unwrap().is_none());
        assert_eq!(cursor.state(), CursorState::Cancelled);
        assert!(!cursor.has_next());
        assert_eq!(cursor.position(), consumed);

        // The cursor stays cancelled.
        assert!(cursor.next().unwrap().is_none());
        assert_eq!(cursor.position(), consumed);
    }

    #[test]
    fn empty_key_list_is_immediately_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let mut cursor = BatchCursor::over_keys(&store, Vec::new(), &Never);
        assert!(!cursor.has_next());
        assert!(cursor.next().unwrap().is_none());
        assert_eq!(cursor.state(), CursorState::Exhausted);
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        populate(&store, 2);

        let keys = vec![
            "scan=0".to_string(),
            "never-stored".to_string(),
            "scan=1".to_string(),
        ];
        let mut cursor = BatchCursor::over_keys(&store, keys, &Never);

        let mut titles = Vec::new();
        while let Some(record) = cursor.next().unwrap() {
            titles.push(SpectrumMatch::decode(&record).unwrap().title);
        }
        assert_eq!(titles, vec!["scan=0", "scan=1"]);
    }

    #[test]
    fn record_deleted_mid_iteration_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let keys = populate(&store, 5);

        let mut cursor =
            BatchCursor::over_keys(&store, keys, &Never).with_batch_size(5);
        assert!(cursor.next().unwrap().is_some());

        // Deleted after prefetch, before resolution.
        store.delete("scan=1").unwrap();

        let mut remaining = Vec::new();
        while let Some(record) = cursor.next().unwrap() {
            remaining.push(SpectrumMatch::decode(&record).unwrap().title);
        }
        assert_eq!(remaining, vec!["scan=2", "scan=3", "scan=4"]);
        assert_eq!(cursor.position(), 5);
    }

    #[test]
    fn over_type_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let mut cursor = BatchCursor::over_type(&store, &SpectrumMatch::tag(), &Never).unwrap();
        assert_eq!(cursor.total(), 0);
        assert!(!cursor.has_next());
        assert!(cursor.next().unwrap().is_none());
    }

    #[test]
    fn position_is_monotone_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let keys = populate(&store, 12);

        let mut cursor = BatchCursor::over_keys(&store, keys, &Never).with_batch_size(5);
        let mut last = 0;
        while cursor.next().unwrap().is_some() {
            assert_eq!(cursor.position(), last + 1);
            last = cursor.position();
            assert!(cursor.position() <= cursor.total());
        }
        assert_eq!(last, 12);
    }
}
