use std::path::PathBuf;

/// Errors from the record engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No store exists at the given directory.
    #[error("no record store at {}", .0.display())]
    NotFound(PathBuf),

    /// A store already exists where `create` was asked to make one.
    #[error("record store already exists at {}", .0.display())]
    AlreadyExists(PathBuf),

    /// A file carries the wrong magic bytes.
    #[error("invalid magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    /// A file carries a format version this build does not read.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),

    /// A frame failed validation (CRC, length, or decode).
    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    /// The locator does not resolve to a live record (deleted or unknown).
    #[error("record missing (deleted or never stored)")]
    RecordMissing,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
