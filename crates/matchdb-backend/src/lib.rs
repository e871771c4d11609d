//! Append-only record engine for matchdb.
//!
//! The engine is the persistent collaborator behind the object store. It
//! owns a single directory containing:
//!
//! - `store.json` — format version and store name
//! - `records.log` — CRC-framed, zstd-compressed record frames and
//!   tombstones, append-only
//! - `records.idx` — index snapshot written on close; on open it is used
//!   only when it covers the whole log, otherwise the log is rescanned
//!
//! Records are addressed by [`Locator`] (the frame's byte offset), which is
//! opaque to everything above the engine. Every record travels as a
//! [`RecordEnvelope`] carrying its own long key, which is what makes
//! full-scan recovery of the key directory possible when the snapshot is
//! missing or stale.
//!
//! The engine does no caching and knows nothing about the store's
//! mutual-exclusion gate; callers serialize access to it.

pub mod engine;
pub mod error;
mod log;
mod snapshot;

pub use engine::{RecordEngine, RecordEnvelope, TypeScan};
pub use error::{EngineError, EngineResult};
pub use log::Locator;
