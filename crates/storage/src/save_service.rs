//! Save orchestration and the auto-save coordinator.
//!
//! `SaveService` is the one thing the host application holds: it owns the
//! `RegionStore` (and, transitively, the cache and region files), schedules
//! the periodic auto-save, and exposes the blocking flush used at shutdown.
//! The dependency chain is one-directional: `SaveService -> RegionStore ->
//! RegionCache -> RegionFile -> ChunkCodec -> BlockPalette`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::{self, JoinHandle};
use tokio::time::MissedTickBehavior;

use stonebreak_world::{ChunkPos, World};

use crate::chunk_codec;
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::region_store::RegionStore;
use crate::world_meta::{PlayerState, WorldMetadata};

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Result of [`SaveService::load_world`].
pub struct LoadResult {
    pub world_meta: WorldMetadata,
    pub player_state: PlayerState,
}

/// The mutable, shared pieces an auto-save cycle and a manual `save_all`
/// both touch. Bundled separately from `SaveService` so it can be captured
/// by `Arc` into the spawned auto-save task without capturing the whole
/// service.
struct Shared {
    world_dir: PathBuf,
    config: StorageConfig,
    region_store: RegionStore,
    world: Arc<World>,
    world_meta: AsyncMutex<WorldMetadata>,
    player: AsyncMutex<PlayerState>,
}

impl Shared {
    fn world_dat_path(&self) -> PathBuf {
        self.world_dir.join("world.dat")
    }

    fn player_dat_path(&self) -> PathBuf {
        self.world_dir.join("player.dat")
    }

    async fn save_world_meta(&self) -> StorageResult<()> {
        let path = self.world_dat_path();
        let meta = self.world_meta.lock().await.clone();
        task::spawn_blocking(move || meta.save(&path))
            .await
            .expect("blocking task panicked")
    }

    async fn save_player(&self) -> StorageResult<()> {
        let path = self.player_dat_path();
        let player = self.player.lock().await.clone();
        task::spawn_blocking(move || player.save(&path))
            .await
            .expect("blocking task panicked")
    }

    async fn save_one_dirty_chunk(&self, pos: ChunkPos) {
        let payload = {
            let chunk = match self.world.get_chunk(pos) {
                Some(chunk) => chunk,
                None => return,
            };
            match chunk_codec::encode(&chunk) {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::error!(cx = pos.cx, cz = pos.cz, %err, "chunk encode failed, leaving dirty");
                    return;
                }
            }
        };

        match self.region_store.save(payload, pos.cx, pos.cz).await {
            Ok(()) => {
                if let Some(mut chunk) = self.world.get_chunk_mut(pos) {
                    chunk.mark_clean();
                }
            }
            Err(err) => {
                tracing::error!(cx = pos.cx, cz = pos.cz, %err, "chunk save failed, leaving dirty for retry");
            }
        }
    }
}

/// Spawn every save in a batch so they run concurrently (each one's actual
/// disk I/O is still bounded by the region store's worker pool), then wait
/// for the whole batch before the caller moves to the next one.
async fn save_batch(shared: &Arc<Shared>, batch: &[ChunkPos]) {
    let handles: Vec<_> = batch
        .iter()
        .map(|&pos| {
            let shared = Arc::clone(shared);
            tokio::spawn(async move { shared.save_one_dirty_chunk(pos).await })
        })
        .collect();
    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(%err, "chunk save task panicked");
        }
    }
}

pub struct SaveService {
    shared: Arc<Shared>,
    auto_save_in_progress: Arc<AtomicBool>,
    auto_save_skipped_cycles: Arc<AtomicU64>,
    last_auto_save_time_ms: Arc<AtomicI64>,
    auto_save_handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl SaveService {
    pub fn new(world_dir: impl Into<PathBuf>, config: StorageConfig, world: Arc<World>) -> Self {
        let world_dir = world_dir.into();
        let region_store = RegionStore::new(
            world_dir.join("regions"),
            config.region_cache_capacity,
            config.worker_pool_size,
        );
        let now = now_millis();
        Self {
            shared: Arc::new(Shared {
                world_dir,
                config,
                region_store,
                world_meta: AsyncMutex::new(WorldMetadata::new(world.world_name.as_str(), world.seed, now)),
                player: AsyncMutex::new(PlayerState::default()),
                world,
            }),
            auto_save_in_progress: Arc::new(AtomicBool::new(false)),
            auto_save_skipped_cycles: Arc::new(AtomicU64::new(0)),
            last_auto_save_time_ms: Arc::new(AtomicI64::new(now)),
            auto_save_handle: AsyncMutex::new(None),
        }
    }

    /// Seed the service's in-memory metadata/player state, typically with
    /// whatever [`SaveService::load_world`] just returned (or fresh defaults
    /// for a brand-new world).
    pub async fn initialize(&self, world_meta: WorldMetadata, player_state: PlayerState) {
        *self.shared.world_meta.lock().await = world_meta;
        *self.shared.player.lock().await = player_state;
    }

    /// Read `world.dat` (required) and `player.dat` (optional, defaults if
    /// absent). Chunks are loaded on demand through [`RegionStore::load`].
    pub async fn load_world(&self) -> StorageResult<LoadResult> {
        let world_path = self.shared.world_dat_path();
        let world_meta = task::spawn_blocking(move || WorldMetadata::load(&world_path))
            .await
            .expect("blocking task panicked")?;

        let player_path = self.shared.player_dat_path();
        let player_state = task::spawn_blocking(move || match PlayerState::load(&player_path) {
            Ok(state) => Ok(state),
            Err(StorageError::NotFound(_)) => Ok(PlayerState::default()),
            Err(err) => Err(err),
        })
        .await
        .expect("blocking task panicked")?;

        Ok(LoadResult {
            world_meta,
            player_state,
        })
    }

    /// Persist metadata, player, and all dirty chunks; returns once every
    /// piece has been durably written.
    pub async fn save_all(&self) -> StorageResult<()> {
        self.shared.save_world_meta().await?;
        self.shared.save_player().await?;
        self.save_dirty_chunks().await?;
        self.shared.region_store.sync_all().await?;
        Ok(())
    }

    /// Split the dirty set into batches and save each chunk independently.
    /// A per-chunk failure is logged and leaves that chunk dirty for the
    /// next cycle; it never aborts the batch.
    pub async fn save_dirty_chunks(&self) -> StorageResult<()> {
        let dirty = self.shared.world.dirty_chunks();
        for batch in dirty.chunks(self.shared.config.chunk_save_batch_size) {
            save_batch(&self.shared, batch).await;
        }
        Ok(())
    }

    /// Force-save a single chunk, marking it clean on success.
    pub async fn save_chunk(&self, pos: ChunkPos) {
        self.shared.save_one_dirty_chunk(pos).await;
    }

    /// Schedule a periodic auto-save at `config.auto_save_interval`.
    /// Subsequent calls are no-ops while a schedule is already active.
    pub async fn start_auto_save(self: &Arc<Self>) {
        let mut handle_guard = self.auto_save_handle.lock().await;
        if handle_guard.is_some() {
            return;
        }

        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.shared.config.auto_save_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            ticker.tick().await; // the first tick fires immediately; it isn't a save occasion

            loop {
                ticker.tick().await;

                if service.auto_save_in_progress.swap(true, Ordering::SeqCst) {
                    service.auto_save_skipped_cycles.fetch_add(1, Ordering::SeqCst);
                    tracing::warn!("auto-save tick skipped: previous cycle still running");
                    continue;
                }

                let cycle_service = Arc::clone(&service);
                tokio::spawn(async move {
                    let started = Instant::now();
                    if let Err(err) = cycle_service.run_auto_save_cycle().await {
                        tracing::error!(%err, "auto-save cycle failed");
                    }
                    let elapsed = started.elapsed();
                    if elapsed > cycle_service.shared.config.slow_save_threshold {
                        tracing::warn!(?elapsed, "slow auto-save cycle");
                    }
                    cycle_service.auto_save_in_progress.store(false, Ordering::SeqCst);
                });
            }
        });

        *handle_guard = Some(handle);
    }

    /// Cancel the schedule. An in-flight save continues to completion.
    pub async fn stop_auto_save(&self) {
        if let Some(handle) = self.auto_save_handle.lock().await.take() {
            handle.abort();
        }
    }

    /// Number of auto-save ticks skipped because the previous cycle was
    /// still running. Exposed for tests of the overlap-prevention invariant.
    pub fn auto_save_skipped_cycles(&self) -> u64 {
        self.auto_save_skipped_cycles.load(Ordering::SeqCst)
    }

    async fn run_auto_save_cycle(&self) -> StorageResult<()> {
        self.save_all().await?;

        let now = now_millis();
        let last = self.last_auto_save_time_ms.swap(now, Ordering::SeqCst);
        let mut meta = self.shared.world_meta.lock().await;
        meta.total_play_time_ms += (now - last).max(0);
        meta.last_played_ms = now;
        Ok(())
    }

    /// Wait up to `config.flush_timeout` for outstanding saves to drain.
    /// Blocking in the sense that the caller awaits it directly rather than
    /// firing-and-forgetting; it still runs on the async executor.
    pub async fn flush_saves_blocking(&self, reason: &str) {
        tracing::info!(reason, "flushing saves");
        let result = tokio::time::timeout(self.shared.config.flush_timeout, self.save_all()).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(%err, reason, "flush failed"),
            Err(_) => tracing::error!(reason, timeout = ?self.shared.config.flush_timeout, "flush timed out"),
        }
    }

    /// `stop_auto_save` + `flush_saves_blocking` + drain the worker pool.
    pub async fn close(&self) {
        self.stop_auto_save().await;
        self.flush_saves_blocking("service close").await;
        if let Err(err) = self.shared.region_store.close().await {
            tracing::error!(%err, "error closing region store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stonebreak_world::{BlockId, LocalBlockPos};

    fn test_config() -> StorageConfig {
        StorageConfig {
            auto_save_interval: std::time::Duration::from_millis(50),
            flush_timeout: std::time::Duration::from_secs(2),
            slow_save_threshold: std::time::Duration::from_millis(10),
            ..StorageConfig::default()
        }
    }

    #[tokio::test]
    async fn save_all_persists_metadata_player_and_dirty_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let world = Arc::new(World::new("Testworld", 1));
        world.set_block(
            stonebreak_world::BlockPos::new(0, 0, 0),
            BlockId::new(3),
        );

        let service = SaveService::new(dir.path(), test_config(), world.clone());
        service
            .initialize(WorldMetadata::new("Testworld", 1, 0), PlayerState::default())
            .await;

        service.save_all().await.unwrap();

        assert!(dir.path().join("world.dat").exists());
        assert!(dir.path().join("player.dat").exists());
        assert_eq!(world.dirty_chunks().len(), 0);
    }

    #[tokio::test]
    async fn save_dirty_chunks_batches_and_clears_dirty_flags() {
        let dir = tempfile::tempdir().unwrap();
        let world = Arc::new(World::new("Testworld", 1));
        for i in 0..175i32 {
            world.set_block(
                stonebreak_world::BlockPos::new((i as i64) * 16, 0, 0),
                BlockId::new(1),
            );
        }
        assert_eq!(world.dirty_chunks().len(), 175);

        let mut config = test_config();
        config.chunk_save_batch_size = 50;
        let service = SaveService::new(dir.path(), config, world.clone());
        service
            .initialize(WorldMetadata::new("Testworld", 1, 0), PlayerState::default())
            .await;

        service.save_dirty_chunks().await.unwrap();
        assert_eq!(world.dirty_chunks().len(), 0);
    }

    #[tokio::test]
    async fn save_chunk_marks_single_chunk_clean() {
        let dir = tempfile::tempdir().unwrap();
        let world = Arc::new(World::new("Testworld", 1));
        world.set_block(stonebreak_world::BlockPos::new(0, 0, 0), BlockId::new(5));
        let pos = world.dirty_chunks()[0];

        let service = SaveService::new(dir.path(), test_config(), world.clone());
        service.save_chunk(pos).await;

        assert!(world.get_chunk(pos).unwrap().get_block(LocalBlockPos::new(0, 0, 0)) == BlockId::new(5));
        assert!(!world.get_chunk(pos).unwrap().is_dirty());
    }
}
