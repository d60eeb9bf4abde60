//! Maps world chunk coordinates to region files via the cache.
//!
//! Every operation here is `async` but the actual I/O is synchronous
//! (`std::fs` through [`crate::region::RegionFile`]). A bounded
//! [`tokio::sync::Semaphore`] plus [`tokio::task::spawn_blocking`] gives the
//! "small bounded worker pool" the design calls for without inventing a
//! custom thread pool: at most `worker_pool_size` blocking calls run at
//! once, and nothing here ever blocks the async executor's own threads.
//!
//! `save` takes an already-encoded byte buffer rather than a `Chunk`
//! reference: the chunk lives in the world's concurrent map and this layer
//! must not hold a pointer into it across an await boundary, so the caller
//! (`SaveService`) snapshots and encodes first and hands off an owned
//! buffer.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task;

use stonebreak_world::Chunk;

use crate::chunk_codec;
use crate::error::StorageResult;
use crate::region::coord::local_chunk;
use crate::region::{RegionCache, RegionCoord};

pub struct RegionStore {
    cache: Arc<RegionCache>,
    workers: Arc<Semaphore>,
}

impl RegionStore {
    pub fn new(regions_dir: impl Into<PathBuf>, cache_capacity: usize, worker_pool_size: usize) -> Self {
        Self {
            cache: Arc::new(RegionCache::new(regions_dir, cache_capacity)),
            workers: Arc::new(Semaphore::new(worker_pool_size.max(1))),
        }
    }

    async fn run_blocking<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce() -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self.workers.acquire().await.expect("worker semaphore never closes");
        task::spawn_blocking(f)
            .await
            .expect("storage worker task panicked")
    }

    /// Resolve region coord, get-or-open read-only (miss -> `None`), read the
    /// slot, decode. Returns `Ok(None)` for a chunk that has never been
    /// saved; a corrupt on-disk chunk surfaces as `Err`.
    pub async fn load(&self, cx: i32, cz: i32) -> StorageResult<Option<Chunk>> {
        let cache = self.cache.clone();
        self.run_blocking(move || {
            let coord = RegionCoord::of_chunk(cx, cz);
            let Some(handle) = cache.get_or_open(coord, false)? else {
                return Ok(None);
            };
            let (lx, lz) = local_chunk(cx, cz);
            let bytes = {
                let mut region = handle.lock().unwrap();
                region.read(lx, lz)?
            };
            match bytes {
                Some(bytes) => chunk_codec::decode(&bytes).map(Some),
                None => Ok(None),
            }
        })
        .await
    }

    /// Persist an already-encoded chunk payload at `(cx, cz)`, opening (and
    /// creating) the owning region file if needed.
    pub async fn save(&self, payload: Vec<u8>, cx: i32, cz: i32) -> StorageResult<()> {
        let cache = self.cache.clone();
        self.run_blocking(move || {
            let coord = RegionCoord::of_chunk(cx, cz);
            let handle = cache
                .get_or_open(coord, true)?
                .expect("get_or_open with create=true always returns a handle");
            let (lx, lz) = local_chunk(cx, cz);
            handle.lock().unwrap().write(lx, lz, &payload)
        })
        .await
    }

    pub async fn delete(&self, cx: i32, cz: i32) -> StorageResult<()> {
        let cache = self.cache.clone();
        self.run_blocking(move || {
            let coord = RegionCoord::of_chunk(cx, cz);
            let Some(handle) = cache.get_or_open(coord, false)? else {
                return Ok(());
            };
            let (lx, lz) = local_chunk(cx, cz);
            handle.lock().unwrap().remove(lx, lz)
        })
        .await
    }

    pub async fn has(&self, cx: i32, cz: i32) -> StorageResult<bool> {
        let cache = self.cache.clone();
        self.run_blocking(move || {
            let coord = RegionCoord::of_chunk(cx, cz);
            let Some(handle) = cache.get_or_open(coord, false)? else {
                return Ok(false);
            };
            let (lx, lz) = local_chunk(cx, cz);
            Ok(handle.lock().unwrap().has(lx, lz))
        })
        .await
    }

    pub async fn sync_all(&self) -> StorageResult<()> {
        let cache = self.cache.clone();
        self.run_blocking(move || cache.sync_all()).await
    }

    /// Flush and close every open region file. Used at shutdown.
    pub async fn close(&self) -> StorageResult<()> {
        let cache = self.cache.clone();
        self.run_blocking(move || cache.clear()).await
    }
}
