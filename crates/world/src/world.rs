use dashmap::DashMap;
use dashmap::mapref::one::{Ref, RefMut};

use crate::block::BlockId;
use crate::chunk::Chunk;
use crate::position::{BlockPos, ChunkPos};

/// A handle to a chunk the storage engine can later look up again. Plain
/// `ChunkPos` values work because `World` is keyed by position and the
/// save path only ever needs "which column", not a stable pointer.
pub type ChunkHandle = ChunkPos;

/// The entire block world. Thread-safe, lock-sharded by chunk column.
pub struct World {
    chunks: DashMap<ChunkPos, Chunk>,
    pub seed: i64,
    pub spawn_position: [f32; 3],
    pub world_name: String,
}

impl World {
    pub fn new(world_name: impl Into<String>, seed: i64) -> Self {
        Self {
            chunks: DashMap::new(),
            seed,
            spawn_position: [0.0, 64.0, 0.0],
            world_name: world_name.into(),
        }
    }

    pub fn get_block(&self, pos: BlockPos) -> BlockId {
        match self.chunks.get(&pos.chunk()) {
            Some(chunk) => chunk.get_block(pos.local()),
            None => BlockId::AIR,
        }
    }

    pub fn set_block(&self, pos: BlockPos, block: BlockId) {
        self.chunks
            .entry(pos.chunk())
            .or_insert_with(|| Chunk::new(pos.chunk().cx, pos.chunk().cz))
            .set_block(pos.local(), block);
    }

    pub fn has_chunk(&self, pos: ChunkPos) -> bool {
        self.chunks.contains_key(&pos)
    }

    pub fn get_chunk(&self, pos: ChunkPos) -> Option<Ref<'_, ChunkPos, Chunk>> {
        self.chunks.get(&pos)
    }

    pub fn get_chunk_mut(&self, pos: ChunkPos) -> Option<RefMut<'_, ChunkPos, Chunk>> {
        self.chunks.get_mut(&pos)
    }

    /// Install a freshly generated or loaded chunk at the given column,
    /// replacing any chunk already there.
    pub fn install_chunk(&self, cx: i32, cz: i32, chunk: Chunk) {
        self.chunks.insert(ChunkPos::new(cx, cz), chunk);
    }

    pub fn remove_chunk(&self, pos: ChunkPos) -> Option<Chunk> {
        self.chunks.remove(&pos).map(|(_, c)| c)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Snapshot of every chunk currently marked dirty. The save service takes
    /// this snapshot once per auto-save cycle rather than holding a lock
    /// across the whole batch.
    pub fn dirty_chunks(&self) -> Vec<ChunkHandle> {
        self.chunks
            .iter()
            .filter(|entry| entry.value().is_dirty())
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn iter_chunks(&self) -> dashmap::iter::Iter<'_, ChunkPos, Chunk> {
        self.chunks.iter()
    }
}
