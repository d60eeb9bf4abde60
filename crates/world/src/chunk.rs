use super::position::LocalBlockPos;
use crate::block::BlockId;

/// Number of blocks along each horizontal axis of a chunk column.
pub const CHUNK_SIZE: usize = 16;
/// Number of blocks along the vertical axis of a chunk column.
pub const WORLD_HEIGHT: usize = 256;
/// Total block count in one chunk column: `CHUNK_SIZE * WORLD_HEIGHT * CHUNK_SIZE`.
pub const BLOCK_COUNT: usize = CHUNK_SIZE * WORLD_HEIGHT * CHUNK_SIZE;

/// Flat-index a local position using the fixed on-disk iteration order:
/// `y` outer, `x` middle, `z` inner. Encode and decode must agree on this
/// order, so it lives here rather than being re-derived by callers.
#[inline]
pub const fn block_index(x: u8, y: u16, z: u8) -> usize {
    (y as usize) * CHUNK_SIZE * CHUNK_SIZE + (x as usize) * CHUNK_SIZE + (z as usize)
}

/// A single 16xWORLD_HEIGHTx16 voxel column.
///
/// Stored as one dense flat array (no vertical sectioning) so that the fixed
/// encoding order in [`block_index`] maps directly onto storage. A full
/// column is 65536 cells; at 2 bytes per `BlockId` that is 128 KiB live,
/// which is small next to the compressed on-disk footprint.
pub struct Chunk {
    cx: i32,
    cz: i32,
    blocks: Box<[BlockId; BLOCK_COUNT]>,
    dirty: bool,
    features_populated: bool,
    player_modified: bool,
    last_modified: i64,
}

impl Chunk {
    /// A freshly generated, all-air chunk at the given column.
    pub fn new(cx: i32, cz: i32) -> Self {
        Self {
            cx,
            cz,
            blocks: Box::new([BlockId::AIR; BLOCK_COUNT]),
            dirty: false,
            features_populated: false,
            player_modified: false,
            last_modified: 0,
        }
    }

    pub const fn coords(&self) -> (i32, i32) {
        (self.cx, self.cz)
    }

    #[inline]
    pub fn get_block(&self, pos: LocalBlockPos) -> BlockId {
        self.blocks[block_index(pos.x, pos.y, pos.z)]
    }

    #[inline]
    pub fn set_block(&mut self, pos: LocalBlockPos, block: BlockId) {
        self.blocks[block_index(pos.x, pos.y, pos.z)] = block;
        self.dirty = true;
    }

    /// Iterate every cell in the fixed on-disk order (`y` outer, `x` middle,
    /// `z` inner), yielding `(LocalBlockPos, BlockId)`.
    pub fn iter_blocks(&self) -> impl Iterator<Item = (LocalBlockPos, BlockId)> + '_ {
        (0..WORLD_HEIGHT).flat_map(move |y| {
            (0..CHUNK_SIZE).flat_map(move |x| {
                (0..CHUNK_SIZE).map(move |z| {
                    let pos = LocalBlockPos::new(x as u8, y as u16, z as u8);
                    (pos, self.get_block(pos))
                })
            })
        })
    }

    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub const fn last_modified(&self) -> i64 {
        self.last_modified
    }

    pub fn set_last_modified(&mut self, millis: i64) {
        self.last_modified = millis;
    }

    pub const fn is_features_populated(&self) -> bool {
        self.features_populated
    }

    pub fn set_features_populated(&mut self, value: bool) {
        self.features_populated = value;
    }

    pub const fn is_player_modified(&self) -> bool {
        self.player_modified
    }

    pub fn set_player_modified(&mut self, value: bool) {
        self.player_modified = value;
    }
}
