use std::time::Duration;

/// Tunables for the storage engine. Constructed once by the host application
/// and threaded down through `SaveService -> RegionStore -> RegionCache`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Maximum number of open `RegionFile` handles held by the `RegionCache`.
    pub region_cache_capacity: usize,
    /// Size of the bounded worker pool serving `RegionStore` futures.
    pub worker_pool_size: usize,
    /// Period between scheduled auto-save ticks.
    pub auto_save_interval: Duration,
    /// Number of dirty chunks saved per parallel batch.
    pub chunk_save_batch_size: usize,
    /// How long `flush_saves_blocking` waits for outstanding saves to drain.
    pub flush_timeout: Duration,
    /// An auto-save cycle running longer than this emits a `SlowSave` warning.
    pub slow_save_threshold: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            region_cache_capacity: 32,
            worker_pool_size: 4,
            auto_save_interval: Duration::from_secs(30),
            chunk_save_batch_size: 50,
            flush_timeout: Duration::from_secs(15),
            slow_save_threshold: Duration::from_secs(5),
        }
    }
}
