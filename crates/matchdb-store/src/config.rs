/// Configuration for an object store instance.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Resident-byte budget for the object cache (default: 256 MiB).
    /// Exceeding it triggers least-recently-used eviction.
    pub cache_budget: u64,
    /// Records loaded per gated session during batched type scans
    /// (default: 1024).
    pub scan_batch: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_budget: 256 * 1024 * 1024, // 256 MiB
            scan_batch: 1024,
        }
    }
}

impl StoreConfig {
    /// A configuration with a small cache, for tests and tooling that only
    /// pass through records once.
    pub fn with_cache_budget(cache_budget: u64) -> Self {
        Self {
            cache_budget,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = StoreConfig::default();
        assert_eq!(config.cache_budget, 256 * 1024 * 1024);
        assert_eq!(config.scan_batch, 1024);
    }

    #[test]
    fn with_cache_budget_overrides_only_budget() {
        let config = StoreConfig::with_cache_budget(4096);
        assert_eq!(config.cache_budget, 4096);
        assert_eq!(config.scan_batch, StoreConfig::default().scan_batch);
    }
}
