use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Cooperative cancellation and progress reporting for batch operations.
///
/// Batch operations poll [`is_cancelled`](Progress::is_cancelled) between
/// objects or between batches. Cancellation is cooperative: the current
/// object or batch completes, and writes already committed stay committed.
pub trait Progress: Send + Sync {
    /// Whether the caller has requested cancellation.
    fn is_cancelled(&self) -> bool;

    /// Report `n` objects processed.
    fn advance(&self, n: u64) {
        let _ = n;
    }
}

/// A progress sink that never cancels. Use when no cancellation is needed.
pub struct Never;

impl Progress for Never {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shareable cancellation flag with a processed-object counter.
#[derive(Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
    processed: AtomicU64,
}

impl CancelFlag {
    /// Create a new, un-cancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect at the next poll.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Total objects reported through [`Progress::advance`].
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }
}

impl Progress for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn advance(&self, n: u64) {
        self.processed.fetch_add(n, Ordering::SeqCst);
    }
}
