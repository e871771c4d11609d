//! Cached object store for matchdb.
//!
//! This crate implements the persistence core: callers see a simple
//! string-key → record map, and the store decides what stays resident in
//! memory, what is evicted, and when engine I/O happens.
//!
//! # Components
//!
//! - [`ObjectStore`] — owns the engine connection and the long-key → locator
//!   directory; every engine-touching operation serializes on one store-wide
//!   gate, while cache hits synchronize only on the cache's own lock
//! - [`ObjectCache`] — byte-budgeted LRU table in front of the engine;
//!   best-effort, never an error source
//! - [`BatchCursor`] — forward-only, single-pass, cancellable cursor that
//!   prefetches fixed-size batches of keys and streams records through the
//!   same cache/store path
//!
//! # Design Rules
//!
//! 1. Records are persisted before or during cache admission, so eviction
//!    is always a pure drop.
//! 2. Absence is `Ok(None)`, never an error; only an unavailable or closed
//!    store interrupts a workflow.
//! 3. Cancellation is cooperative and never rolls back committed writes.
//! 4. Backing-engine error types never leak through this crate's API.

pub mod cache;
pub mod config;
pub mod cursor;
pub mod error;
pub mod store;

pub use cache::ObjectCache;
pub use config::StoreConfig;
pub use cursor::{BatchCursor, CursorState, DEFAULT_BATCH_SIZE};
pub use error::{StoreError, StoreResult};
pub use store::{ObjectStore, ScanSession};
