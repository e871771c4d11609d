use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use matchdb_types::{LongKey, TypeTag};

use crate::error::{EngineError, EngineResult};
use crate::log::{
    self, read_put_body, scan_frames, Locator, RecordLog, ScannedFrame, KIND_PUT,
};
use crate::snapshot::{IndexSnapshot, SnapshotEntry};

const META_FILE: &str = "store.json";
const LOG_FILE: &str = "records.log";
const INDEX_FILE: &str = "records.idx";
const META_FORMAT: u32 = 1;

/// The engine's unit of storage: a record plus its own identity.
///
/// Carrying the long key inside the envelope is what allows the key
/// directory to be rebuilt from a full log scan when the index snapshot is
/// missing or stale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordEnvelope {
    /// Canonical identity of the record.
    pub long_key: LongKey,
    /// Category the record is enumerated under.
    pub tag: TypeTag,
    /// Serialized record bytes, uncompressed.
    pub data: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct StoreMeta {
    format: u32,
    name: String,
}

#[derive(Debug)]
struct LiveEntry {
    long_key: LongKey,
    tag: TypeTag,
}

/// Offset-ordered table of the records that have not been tombstoned.
#[derive(Debug, Default)]
struct LiveTable {
    records: BTreeMap<u64, LiveEntry>,
    counts: HashMap<TypeTag, u64>,
}

impl LiveTable {
    fn insert(&mut self, offset: u64, long_key: LongKey, tag: TypeTag) {
        *self.counts.entry(tag.clone()).or_insert(0) += 1;
        self.records.insert(offset, LiveEntry { long_key, tag });
    }

    fn remove(&mut self, offset: u64) -> Option<LiveEntry> {
        let entry = self.records.remove(&offset)?;
        if let Some(count) = self.counts.get_mut(&entry.tag) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(&entry.tag);
            }
        }
        Some(entry)
    }

    fn contains(&self, offset: u64) -> bool {
        self.records.contains_key(&offset)
    }

    fn count(&self, tag: &TypeTag) -> u64 {
        self.counts.get(tag).copied().unwrap_or(0)
    }
}

/// Persistent record engine over one store directory.
///
/// The engine exposes save/load/delete, type-scoped enumeration and counts,
/// and the live key→locator pairs used to seed the object store's directory
/// at open. It performs no caching, and callers are expected to serialize
/// access to it.
#[derive(Debug)]
pub struct RecordEngine {
    dir: PathBuf,
    name: String,
    log: RecordLog,
    live: Arc<RwLock<LiveTable>>,
}

impl RecordEngine {
    /// Whether a store exists in `dir`.
    pub fn exists(dir: &Path) -> bool {
        dir.join(META_FILE).is_file()
    }

    /// Create a fresh store in `dir`. Fails if one already exists there.
    pub fn create(dir: &Path, name: &str) -> EngineResult<Self> {
        if Self::exists(dir) {
            return Err(EngineError::AlreadyExists(dir.to_path_buf()));
        }
        std::fs::create_dir_all(dir)?;
        let meta = StoreMeta {
            format: META_FORMAT,
            name: name.to_string(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        std::fs::write(dir.join(META_FILE), meta_json)?;

        let log = RecordLog::open(&dir.join(LOG_FILE))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            name: meta.name,
            log,
            live: Arc::new(RwLock::new(LiveTable::default())),
        })
    }

    /// Open an existing store in `dir`.
    ///
    /// Restores the live table from the index snapshot when it covers the
    /// whole log; otherwise rebuilds it by scanning the log, truncating any
    /// torn tail left by a crash.
    pub fn open(dir: &Path) -> EngineResult<Self> {
        if !Self::exists(dir) {
            return Err(EngineError::NotFound(dir.to_path_buf()));
        }
        let meta_bytes = std::fs::read(dir.join(META_FILE))?;
        let meta: StoreMeta = serde_json::from_slice(&meta_bytes)
            .map_err(|e| EngineError::Serialization(format!("unreadable store.json: {e}")))?;
        if meta.format != META_FORMAT {
            return Err(EngineError::UnsupportedVersion(meta.format));
        }

        let log_path = dir.join(LOG_FILE);
        let log_len = match std::fs::metadata(&log_path) {
            Ok(m) => m.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let index_path = dir.join(INDEX_FILE);
        let live = match IndexSnapshot::read(&index_path) {
            Ok(Some(snapshot)) if snapshot.covered_len == log_len => {
                let mut table = LiveTable::default();
                for entry in snapshot.entries {
                    table.insert(entry.offset, entry.long_key, entry.tag);
                }
                table
            }
            Ok(Some(_)) => {
                warn!(path = %index_path.display(), "stale index snapshot, rescanning log");
                Self::rebuild_from_log(&log_path, log_len)?
            }
            Ok(None) => Self::rebuild_from_log(&log_path, log_len)?,
            Err(e) => {
                warn!(path = %index_path.display(), error = %e, "corrupt index snapshot, rescanning log");
                Self::rebuild_from_log(&log_path, log_len)?
            }
        };

        let log = RecordLog::open(&log_path)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            name: meta.name,
            log,
            live: Arc::new(RwLock::new(live)),
        })
    }

    fn rebuild_from_log(log_path: &Path, log_len: u64) -> EngineResult<LiveTable> {
        let mut table = LiveTable::default();
        if log_len == 0 {
            return Ok(table);
        }
        let (frames, valid_len) = scan_frames(log_path)?;
        for (offset, frame) in frames {
            match frame {
                ScannedFrame::Put { long_key, tag } => table.insert(offset, long_key, tag),
                ScannedFrame::Tombstone { target } => {
                    table.remove(target);
                }
            }
        }
        if valid_len < log_len {
            warn!(
                valid_len,
                log_len, "truncating torn tail of record log"
            );
            let file = std::fs::OpenOptions::new().write(true).open(log_path)?;
            file.set_len(valid_len)?;
        }
        Ok(table)
    }

    /// The store name recorded in `store.json`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a record. Returns the locator for later loads and deletes.
    pub fn save(&self, envelope: &RecordEnvelope) -> EngineResult<Locator> {
        let locator = self.log.append_put(envelope)?;
        self.live.write().expect("live table lock poisoned").insert(
            locator.offset(),
            envelope.long_key,
            envelope.tag.clone(),
        );
        Ok(locator)
    }

    /// Load the record at `locator`.
    ///
    /// `RecordMissing` if the locator is tombstoned or was never handed out.
    pub fn load(&self, locator: Locator) -> EngineResult<RecordEnvelope> {
        let live = self
            .live
            .read()
            .expect("live table lock poisoned")
            .contains(locator.offset());
        if !live {
            return Err(EngineError::RecordMissing);
        }
        self.log.read_put(locator)
    }

    /// Delete the record at `locator`. Idempotent: unknown or already
    /// deleted locators are a no-op.
    pub fn delete(&self, locator: Locator) -> EngineResult<()> {
        let removed = self
            .live
            .write()
            .expect("live table lock poisoned")
            .remove(locator.offset());
        if removed.is_some() {
            self.log.append_tombstone(locator)?;
        }
        Ok(())
    }

    /// Streaming enumeration of all live records of one type.
    ///
    /// The scan reads the log front-to-back through its own file handle and
    /// is bounded by the log length at creation; records appended afterwards
    /// are not seen, and records deleted mid-scan are skipped.
    pub fn browse_by_type(&self, tag: &TypeTag) -> EngineResult<TypeScan> {
        let file = File::open(self.log.path())?;
        Ok(TypeScan {
            tag: tag.clone(),
            reader: BufReader::new(file),
            offset: 0,
            end: self.log.len(),
            live: Arc::clone(&self.live),
        })
    }

    /// Number of live records of one type, from the live table.
    pub fn count_by_type(&self, tag: &TypeTag) -> u64 {
        self.live
            .read()
            .expect("live table lock poisoned")
            .count(tag)
    }

    /// All tags with at least one live record, with their counts.
    pub fn tag_counts(&self) -> Vec<(TypeTag, u64)> {
        let live = self.live.read().expect("live table lock poisoned");
        let mut counts: Vec<(TypeTag, u64)> = live
            .counts
            .iter()
            .map(|(tag, count)| (tag.clone(), *count))
            .collect();
        counts.sort_by(|a, b| a.0.cmp(&b.0));
        counts
    }

    /// The live key→locator pairs, in log-offset order.
    ///
    /// Used to seed the object store's directory at open. If the log ever
    /// holds two live frames for one long key, the later offset wins in any
    /// map built from this list.
    pub fn directory(&self) -> Vec<(LongKey, Locator)> {
        self.live
            .read()
            .expect("live table lock poisoned")
            .records
            .iter()
            .map(|(offset, entry)| (entry.long_key, Locator::new(*offset)))
            .collect()
    }

    /// Flush the log and write the index snapshot, releasing the engine.
    pub fn close(self) -> EngineResult<()> {
        self.log.sync()?;
        let live = self.live.read().expect("live table lock poisoned");
        let snapshot = IndexSnapshot {
            covered_len: self.log.len(),
            entries: live
                .records
                .iter()
                .map(|(offset, entry)| SnapshotEntry {
                    offset: *offset,
                    long_key: entry.long_key,
                    tag: entry.tag.clone(),
                })
                .collect(),
        };
        snapshot.write(&self.dir.join(INDEX_FILE))?;
        Ok(())
    }
}

/// Streaming cursor over live records of one type.
///
/// Handed out by [`RecordEngine::browse_by_type`]; pull records in bounded
/// chunks with [`next_chunk`](TypeScan::next_chunk). The scan owns its file
/// handle, so it stays valid while other records are appended.
pub struct TypeScan {
    tag: TypeTag,
    reader: BufReader<File>,
    offset: u64,
    end: u64,
    live: Arc<RwLock<LiveTable>>,
}

impl TypeScan {
    /// The tag this scan enumerates.
    pub fn tag(&self) -> &TypeTag {
        &self.tag
    }

    /// Whether the scan has reached its bound.
    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.end
    }

    /// Pull up to `max` matching records, advancing the scan position.
    ///
    /// Returns an empty vector once the scan is exhausted.
    pub fn next_chunk(&mut self, max: usize) -> EngineResult<Vec<(Locator, RecordEnvelope)>> {
        let mut out = Vec::new();
        if max == 0 {
            return Ok(out);
        }
        while out.len() < max && self.offset < self.end {
            let header = log::read_header(&mut self.reader)?.ok_or_else(|| {
                EngineError::CorruptRecord {
                    offset: self.offset,
                    reason: "frame truncated inside scan bound".into(),
                }
            })?;
            let frame_end = self.offset + log::HEADER_SIZE + u64::from(header.len);

            let wanted = header.kind == KIND_PUT
                && self
                    .live
                    .read()
                    .expect("live table lock poisoned")
                    .contains(self.offset);
            if wanted {
                let envelope = read_put_body(&mut self.reader, self.offset, &header)?;
                if envelope.tag == self.tag {
                    out.push((Locator::new(self.offset), envelope));
                }
            } else {
                self.reader.seek_relative(i64::from(header.len))?;
            }
            self.offset = frame_end;
        }
        Ok(out)
    }
}
