use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use matchdb_types::{LongKey, TypeTag};

use crate::engine::RecordEnvelope;
use crate::error::{EngineError, EngineResult};

/// Opaque handle identifying where a record lives in the log.
///
/// Locators are handed out by [`save`](crate::RecordEngine::save) and are
/// meaningful only to the engine that produced them.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator(u64);

impl Locator {
    pub(crate) const fn new(offset: u64) -> Self {
        Self(offset)
    }

    pub(crate) const fn offset(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator(@{})", self.0)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Frame kind byte: a stored record.
pub(crate) const KIND_PUT: u8 = 1;
/// Frame kind byte: a delete marker for an earlier frame.
pub(crate) const KIND_TOMBSTONE: u8 = 2;

/// Header size: 1 byte kind + 4 bytes length + 4 bytes CRC.
pub(crate) const HEADER_SIZE: u64 = 9;

/// zstd compression level for record payloads.
const ZSTD_LEVEL: i32 = 3;

/// Serialized form of a Put frame payload. `data` is zstd-compressed;
/// `uncompressed_len` validates the decompression.
#[derive(Serialize, Deserialize)]
struct PutPayload {
    long_key: LongKey,
    tag: TypeTag,
    uncompressed_len: u64,
    data: Vec<u8>,
}

/// Parsed frame header.
pub(crate) struct FrameHeader {
    pub kind: u8,
    pub len: u32,
    pub crc: u32,
}

/// Read one frame header. Returns `Ok(None)` on clean EOF at a frame
/// boundary; a partial header is reported as `Ok(None)` as well, since it
/// can only be the torn tail of a crashed append.
pub(crate) fn read_header(reader: &mut impl Read) -> io::Result<Option<FrameHeader>> {
    let mut buf = [0u8; HEADER_SIZE as usize];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Ok(None);
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Some(FrameHeader {
        kind: buf[0],
        len: u32::from_le_bytes(buf[1..5].try_into().expect("slice is 4 bytes")),
        crc: u32::from_le_bytes(buf[5..9].try_into().expect("slice is 4 bytes")),
    }))
}

fn decode_put(offset: u64, payload: &[u8]) -> EngineResult<(LongKey, TypeTag, Vec<u8>)> {
    let put: PutPayload = bincode::deserialize(payload).map_err(|e| {
        EngineError::CorruptRecord {
            offset,
            reason: format!("undecodable frame payload: {e}"),
        }
    })?;
    let data = zstd::decode_all(put.data.as_slice()).map_err(|e| EngineError::CorruptRecord {
        offset,
        reason: format!("decompression failed: {e}"),
    })?;
    if data.len() as u64 != put.uncompressed_len {
        return Err(EngineError::CorruptRecord {
            offset,
            reason: format!(
                "size mismatch: expected {}, got {}",
                put.uncompressed_len,
                data.len()
            ),
        });
    }
    Ok((put.long_key, put.tag, data))
}

/// Read, CRC-check, and decode a Put frame whose header was already read.
pub(crate) fn read_put_body(
    reader: &mut impl Read,
    offset: u64,
    header: &FrameHeader,
) -> EngineResult<RecordEnvelope> {
    let mut payload = vec![0u8; header.len as usize];
    reader.read_exact(&mut payload)?;
    if crc32fast::hash(&payload) != header.crc {
        return Err(EngineError::CorruptRecord {
            offset,
            reason: "CRC mismatch".into(),
        });
    }
    let (long_key, tag, data) = decode_put(offset, &payload)?;
    Ok(RecordEnvelope {
        long_key,
        tag,
        data,
    })
}

#[derive(Debug)]
struct LogWriter {
    writer: io::BufWriter<File>,
    /// Current write offset, which is also the length of the valid log.
    offset: u64,
}

/// The append-only record log.
///
/// Frames are `[kind: u8][payload_len: u32 LE][crc32: u32 LE][payload]`.
/// Put payloads carry the record envelope with zstd-compressed data;
/// tombstone payloads carry the byte offset of the frame they delete.
#[derive(Debug)]
pub(crate) struct RecordLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
}

impl RecordLog {
    /// Open (or create) the log for appending.
    pub(crate) fn open(path: &Path) -> EngineResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LogWriter {
                writer: io::BufWriter::new(file),
                offset,
            }),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the log, which is also the offset of the next frame.
    pub(crate) fn len(&self) -> u64 {
        self.writer.lock().expect("log mutex poisoned").offset
    }

    fn append_frame(&self, kind: u8, payload: &[u8]) -> EngineResult<u64> {
        let crc = crc32fast::hash(payload);
        let mut w = self.writer.lock().expect("log mutex poisoned");
        let frame_offset = w.offset;

        w.writer.write_all(&[kind])?;
        w.writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        w.writer.write_all(&crc.to_le_bytes())?;
        w.writer.write_all(payload)?;
        w.writer.flush()?;

        w.offset += HEADER_SIZE + payload.len() as u64;
        Ok(frame_offset)
    }

    /// Append a record frame. Returns its locator.
    pub(crate) fn append_put(&self, envelope: &RecordEnvelope) -> EngineResult<Locator> {
        let compressed = zstd::encode_all(envelope.data.as_slice(), ZSTD_LEVEL)
            .map_err(|e| EngineError::Serialization(format!("compression failed: {e}")))?;
        let payload = bincode::serialize(&PutPayload {
            long_key: envelope.long_key,
            tag: envelope.tag.clone(),
            uncompressed_len: envelope.data.len() as u64,
            data: compressed,
        })
        .map_err(|e| EngineError::Serialization(e.to_string()))?;

        let offset = self.append_frame(KIND_PUT, &payload)?;
        tracing::debug!(offset, len = payload.len(), "record append");
        Ok(Locator::new(offset))
    }

    /// Append a tombstone for an earlier frame.
    pub(crate) fn append_tombstone(&self, target: Locator) -> EngineResult<()> {
        let payload = bincode::serialize(&target.offset())
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        self.append_frame(KIND_TOMBSTONE, &payload)?;
        tracing::debug!(target = target.offset(), "tombstone append");
        Ok(())
    }

    /// Random-access read of the Put frame at `locator`.
    pub(crate) fn read_put(&self, locator: Locator) -> EngineResult<RecordEnvelope> {
        let offset = locator.offset();
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let header = read_header(&mut file)?.ok_or(EngineError::CorruptRecord {
            offset,
            reason: "frame truncated".into(),
        })?;
        if header.kind != KIND_PUT {
            return Err(EngineError::CorruptRecord {
                offset,
                reason: format!("expected record frame, found kind {}", header.kind),
            });
        }
        read_put_body(&mut file, offset, &header)
    }

    /// Flush and fsync the log.
    pub(crate) fn sync(&self) -> EngineResult<()> {
        let mut w = self.writer.lock().expect("log mutex poisoned");
        w.writer.flush()?;
        w.writer.get_ref().sync_all()?;
        Ok(())
    }
}

/// A frame seen during a full-log scan, without record data.
pub(crate) enum ScannedFrame {
    Put { long_key: LongKey, tag: TypeTag },
    Tombstone { target: u64 },
}

/// Scan the whole log front-to-back.
///
/// Returns the frames in offset order plus the length of the valid prefix.
/// The scan stops at the first torn or corrupt frame: everything after it
/// is unreachable (frame boundaries are lost) and the caller is expected to
/// truncate to the returned length.
pub(crate) fn scan_frames(path: &Path) -> EngineResult<(Vec<(u64, ScannedFrame)>, u64)> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut frames = Vec::new();
    let mut offset: u64 = 0;

    while offset < file_len {
        let header = match read_header(&mut reader)? {
            Some(h) => h,
            None => break, // torn header
        };
        let frame_end = offset + HEADER_SIZE + u64::from(header.len);
        if frame_end > file_len {
            break; // torn payload
        }
        let mut payload = vec![0u8; header.len as usize];
        reader.read_exact(&mut payload)?;
        if crc32fast::hash(&payload) != header.crc {
            break; // torn or corrupt write
        }
        match header.kind {
            KIND_PUT => {
                let (long_key, tag, _) = decode_put(offset, &payload)?;
                frames.push((offset, ScannedFrame::Put { long_key, tag }));
            }
            KIND_TOMBSTONE => {
                let target: u64 = bincode::deserialize(&payload)
                    .map_err(|e| EngineError::Serialization(e.to_string()))?;
                frames.push((offset, ScannedFrame::Tombstone { target }));
            }
            other => {
                return Err(EngineError::CorruptRecord {
                    offset,
                    reason: format!("unknown frame kind {other}"),
                });
            }
        }
        offset = frame_end;
    }

    Ok((frames, offset))
}
