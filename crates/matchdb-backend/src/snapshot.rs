use std::io;
use std::path::Path;

use matchdb_types::{LongKey, TypeTag};

use crate::error::{EngineError, EngineResult};

const MAGIC: &[u8; 4] = b"MDIX";
const VERSION: u32 = 1;

/// One live record in the snapshot.
#[derive(Debug)]
pub(crate) struct SnapshotEntry {
    pub offset: u64,
    pub long_key: LongKey,
    pub tag: TypeTag,
}

/// Point-in-time image of the engine's live table.
///
/// Written on close so the next open can skip the full log scan.
/// `covered_len` records the log length the snapshot describes; a snapshot
/// whose `covered_len` differs from the actual log length is stale and must
/// be discarded in favour of a rescan.
#[derive(Debug)]
pub(crate) struct IndexSnapshot {
    pub covered_len: u64,
    pub entries: Vec<SnapshotEntry>,
}

impl IndexSnapshot {
    /// Serialize to bytes: magic, version, covered length, entry count,
    /// entries, trailing CRC32 of everything before it.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_be_bytes());
        buf.extend_from_slice(&self.covered_len.to_be_bytes());
        buf.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for entry in &self.entries {
            buf.extend_from_slice(&entry.offset.to_be_bytes());
            buf.extend_from_slice(&entry.long_key.as_u64().to_be_bytes());
            let tag = entry.tag.as_str().as_bytes();
            buf.extend_from_slice(&(tag.len() as u16).to_be_bytes());
            buf.extend_from_slice(tag);
        }
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_be_bytes());
        buf
    }

    /// Deserialize from bytes.
    pub(crate) fn from_bytes(data: &[u8]) -> EngineResult<Self> {
        if data.len() < 8 {
            return Err(corrupt("too short"));
        }
        if &data[0..4] != MAGIC {
            return Err(EngineError::InvalidMagic {
                expected: String::from_utf8_lossy(MAGIC).into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = u32::from_be_bytes(data[4..8].try_into().expect("slice is 4 bytes"));
        if version != VERSION {
            return Err(EngineError::UnsupportedVersion(version));
        }
        if data.len() < 24 {
            return Err(corrupt("header truncated"));
        }

        let body_end = data.len() - 4;
        let stored_crc = u32::from_be_bytes(data[body_end..].try_into().expect("slice is 4 bytes"));
        if crc32fast::hash(&data[..body_end]) != stored_crc {
            return Err(corrupt("CRC mismatch"));
        }

        let covered_len = u64::from_be_bytes(data[8..16].try_into().expect("slice is 8 bytes"));
        let count = u32::from_be_bytes(data[16..20].try_into().expect("slice is 4 bytes")) as usize;

        let mut entries = Vec::with_capacity(count);
        let mut pos = 20;
        for _ in 0..count {
            if body_end < pos + 18 {
                return Err(corrupt("entry truncated"));
            }
            let offset = u64::from_be_bytes(data[pos..pos + 8].try_into().expect("8 bytes"));
            let long_key =
                u64::from_be_bytes(data[pos + 8..pos + 16].try_into().expect("8 bytes"));
            let tag_len =
                u16::from_be_bytes(data[pos + 16..pos + 18].try_into().expect("2 bytes")) as usize;
            pos += 18;
            if body_end < pos + tag_len {
                return Err(corrupt("tag truncated"));
            }
            let tag = std::str::from_utf8(&data[pos..pos + tag_len])
                .map_err(|_| corrupt("tag is not UTF-8"))?;
            pos += tag_len;
            entries.push(SnapshotEntry {
                offset,
                long_key: LongKey::from_raw(long_key),
                tag: TypeTag::new(tag),
            });
        }
        if pos != body_end {
            return Err(corrupt("trailing bytes"));
        }

        Ok(Self {
            covered_len,
            entries,
        })
    }

    /// Write the snapshot file.
    pub(crate) fn write(&self, path: &Path) -> EngineResult<()> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Read a snapshot file. `Ok(None)` when the file does not exist;
    /// corruption is an error so the caller can log and rescan.
    pub(crate) fn read(path: &Path) -> EngineResult<Option<Self>> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(Self::from_bytes(&data)?))
    }
}

fn corrupt(reason: &str) -> EngineError {
    EngineError::CorruptRecord {
        offset: 0,
        reason: format!("index snapshot: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexSnapshot {
        IndexSnapshot {
            covered_len: 4096,
            entries: vec![
                SnapshotEntry {
                    offset: 0,
                    long_key: LongKey::derive("a"),
                    tag: TypeTag::new("spectrum_match"),
                },
                SnapshotEntry {
                    offset: 130,
                    long_key: LongKey::derive("b"),
                    tag: TypeTag::new("peptide_match"),
                },
            ],
        }
    }

    #[test]
    fn roundtrip() {
        let snapshot = sample();
        let parsed = IndexSnapshot::from_bytes(&snapshot.to_bytes()).unwrap();
        assert_eq!(parsed.covered_len, 4096);
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.entries[0].long_key, LongKey::derive("a"));
        assert_eq!(parsed.entries[1].offset, 130);
        assert_eq!(parsed.entries[1].tag.as_str(), "peptide_match");
    }

    #[test]
    fn empty_snapshot_roundtrips() {
        let snapshot = IndexSnapshot {
            covered_len: 0,
            entries: vec![],
        };
        let parsed = IndexSnapshot::from_bytes(&snapshot.to_bytes()).unwrap();
        assert_eq!(parsed.covered_len, 0);
        assert!(parsed.entries.is_empty());
    }

    #[test]
    fn bad_magic() {
        let err = IndexSnapshot::from_bytes(b"BADMxxxxxxxxxxxxxxxxxxxx").unwrap_err();
        assert!(matches!(err, EngineError::InvalidMagic { .. }));
    }

    #[test]
    fn bad_version() {
        let mut data = Vec::new();
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&99u32.to_be_bytes());
        data.extend_from_slice(&[0u8; 16]);
        let err = IndexSnapshot::from_bytes(&data).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedVersion(99)));
    }

    #[test]
    fn flipped_byte_is_detected() {
        let mut bytes = sample().to_bytes();
        let idx = bytes.len() / 2;
        bytes[idx] ^= 0x01;
        assert!(IndexSnapshot::from_bytes(&bytes).is_err());
    }

    #[test]
    fn truncated_is_detected() {
        let bytes = sample().to_bytes();
        assert!(IndexSnapshot::from_bytes(&bytes[..bytes.len() - 5]).is_err());
    }

    #[test]
    fn read_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = IndexSnapshot::read(&dir.path().join("records.idx")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.idx");
        sample().write(&path).unwrap();
        let parsed = IndexSnapshot::read(&path).unwrap().unwrap();
        assert_eq!(parsed.entries.len(), 2);
    }
}
