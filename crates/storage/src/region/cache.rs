//! Bounded LRU of open `RegionFile` handles.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::error::StorageResult;

use super::coord::RegionCoord;
use super::file::RegionFile;

pub type RegionHandle = Arc<Mutex<RegionFile>>;

/// Evicted entries that still had an outstanding caller at eviction time.
/// Reaped opportunistically on the next cache access rather than the moment
/// the last reference drops -- the cache has no async notification channel
/// to call back on, so "defer close" here means "close on the next touch",
/// not "close instantly".
type PendingCloses = Mutex<Vec<(RegionCoord, RegionHandle)>>;

pub struct RegionCache {
    root: PathBuf,
    inner: Mutex<LruCache<RegionCoord, RegionHandle>>,
    pending_close: PendingCloses,
    closes: AtomicUsize,
}

impl RegionCache {
    pub fn new(root: impl Into<PathBuf>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            root: root.into(),
            inner: Mutex::new(LruCache::new(capacity)),
            pending_close: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }

    /// Get the cached handle for `coord`, opening (and creating, if `create`)
    /// it on a miss. Returns `Ok(None)` only when `create` is false and no
    /// region file exists on disk yet.
    pub fn get_or_open(&self, coord: RegionCoord, create: bool) -> StorageResult<Option<RegionHandle>> {
        self.reap_pending();

        if let Some(handle) = self.inner.lock().unwrap().get(&coord) {
            return Ok(Some(handle.clone()));
        }

        let path = self.root.join(coord.file_name());
        if !create && !path.exists() {
            return Ok(None);
        }

        let file = RegionFile::open(coord, &path, create)?;
        let handle: RegionHandle = Arc::new(Mutex::new(file));
        self.insert(coord, handle.clone());
        Ok(Some(handle))
    }

    fn insert(&self, coord: RegionCoord, handle: RegionHandle) {
        let evicted = self.inner.lock().unwrap().push(coord, handle);
        if let Some((evicted_coord, evicted_handle)) = evicted {
            self.close_or_defer(evicted_coord, evicted_handle);
        }
    }

    fn close_or_defer(&self, coord: RegionCoord, handle: RegionHandle) {
        match Arc::try_unwrap(handle) {
            Ok(mutex) => {
                let file = mutex.into_inner().unwrap();
                if let Err(err) = file.close() {
                    tracing::warn!(rx = coord.rx, rz = coord.rz, %err, "error closing evicted region file");
                }
                self.closes.fetch_add(1, Ordering::SeqCst);
            }
            Err(handle) => {
                self.pending_close.lock().unwrap().push((coord, handle));
            }
        }
    }

    fn reap_pending(&self) {
        let mut pending = self.pending_close.lock().unwrap();
        if pending.is_empty() {
            return;
        }
        let mut still_pending = Vec::new();
        for (coord, handle) in pending.drain(..) {
            if Arc::strong_count(&handle) == 1 {
                match Arc::try_unwrap(handle) {
                    Ok(mutex) => {
                        let file = mutex.into_inner().unwrap();
                        if let Err(err) = file.close() {
                            tracing::warn!(rx = coord.rx, rz = coord.rz, %err, "error closing evicted region file");
                        }
                        self.closes.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(handle) => still_pending.push((coord, handle)),
                }
            } else {
                still_pending.push((coord, handle));
            }
        }
        *pending = still_pending;
    }

    pub fn sync_all(&self) -> StorageResult<()> {
        let guard = self.inner.lock().unwrap();
        for (_, handle) in guard.iter() {
            handle.lock().unwrap().sync()?;
        }
        Ok(())
    }

    /// Flush and close every open file, including any still-pending evictions.
    pub fn clear(&self) -> StorageResult<()> {
        let drained: Vec<_> = {
            let mut guard = self.inner.lock().unwrap();
            let entries: Vec<_> = guard.iter().map(|(c, h)| (*c, h.clone())).collect();
            guard.clear();
            entries
        };
        for (coord, handle) in drained {
            self.close_or_defer(coord, handle);
        }
        self.reap_pending();
        Ok(())
    }

    /// Number of `RegionFile::close` invocations since this cache was
    /// created. Exposed for eviction-accounting tests.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_closes_coldest_and_respects_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RegionCache::new(dir.path(), 2);

        for rx in 0..5 {
            let coord = RegionCoord { rx, rz: 0 };
            let handle = cache.get_or_open(coord, true).unwrap().unwrap();
            drop(handle);
        }

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.closes(), 3);
    }

    #[test]
    fn get_on_missing_without_create_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RegionCache::new(dir.path(), 4);
        let result = cache.get_or_open(RegionCoord { rx: 9, rz: 9 }, false).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn reopening_same_coord_promotes_without_new_open() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RegionCache::new(dir.path(), 2);
        let a = cache.get_or_open(RegionCoord { rx: 0, rz: 0 }, true).unwrap().unwrap();
        let _b = cache.get_or_open(RegionCoord { rx: 1, rz: 0 }, true).unwrap().unwrap();
        let a_again = cache.get_or_open(RegionCoord { rx: 0, rz: 0 }, true).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &a_again));
    }
}
