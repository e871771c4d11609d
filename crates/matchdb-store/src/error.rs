/// Errors surfaced by the object store.
///
/// Only these conditions interrupt a calling workflow. Absence is `Ok(None)`,
/// a dangling directory entry degrades to absence after a warning, and
/// cancellation of a batch operation is a normal partial result — none of
/// them appear here. Backing-engine errors are translated at the store
/// boundary and never leak their own types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store cannot be created, opened, or written.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Operation attempted after `close`.
    #[error("store is closed")]
    Closed,

    /// Record encoding or decoding failure.
    #[error("record serialization failed: {0}")]
    Serialization(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
