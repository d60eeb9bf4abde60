//! Per-chunk block palette.
//!
//! A palette maps the (at most 256) distinct block types present in one
//! chunk to small integer codes, so the chunk's 65536 blocks can be bit-packed
//! at `bits_per_block` width instead of spending a full `u16` per cell.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};
use stonebreak_world::{Chunk, LocalBlockPos};
use stonebreak_world::chunk::{CHUNK_SIZE, WORLD_HEIGHT};
use stonebreak_world::BlockId;

use crate::error::{StorageError, StorageResult};

pub const MAX_PALETTE_LEN: usize = 256;
pub const BLOCK_COUNT: usize = CHUNK_SIZE * WORLD_HEIGHT * CHUNK_SIZE;

/// Smallest `b in {1,...,8}` with `2^b >= len`. A one-entry palette always
/// gets `1`, never `0` -- encoding a single block in zero bits is ill-defined.
pub fn bits_per_block(len: usize) -> u8 {
    if len <= 1 {
        return 1;
    }
    let mut b = 1u32;
    while (1usize << b) < len {
        b += 1;
    }
    b as u8
}

/// Ordered set of distinct block types present in one chunk. The index of a
/// type in this list is its palette code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    entries: Vec<BlockId>,
}

impl Palette {
    /// Scan all `N` cells of `chunk` in the fixed on-disk order, collecting
    /// distinct block types in encounter order. More than 256 distinct types
    /// is a format overflow: the chunk is not storable without a wider code.
    pub fn build_from_chunk(chunk: &Chunk) -> StorageResult<Self> {
        let mut entries = Vec::new();
        let mut index_of: HashMap<BlockId, u32> = HashMap::new();

        for (_, block) in chunk.iter_blocks() {
            if index_of.contains_key(&block) {
                continue;
            }
            if entries.len() >= MAX_PALETTE_LEN {
                return Err(StorageError::PaletteOverflow {
                    count: entries.len() + 1,
                });
            }
            index_of.insert(block, entries.len() as u32);
            entries.push(block);
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bits_per_block(&self) -> u8 {
        bits_per_block(self.entries.len())
    }

    pub fn entries(&self) -> &[BlockId] {
        &self.entries
    }

    fn index_lookup(&self) -> HashMap<BlockId, u32> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, &b)| (b, i as u32))
            .collect()
    }

    /// Bit-pack every block of `chunk` (in the fixed on-disk order) into a
    /// `Vec<u64>` at `bits_per_block` width.
    pub fn encode(&self, chunk: &Chunk) -> Vec<u64> {
        let index_of = self.index_lookup();
        let indices: Vec<u32> = chunk
            .iter_blocks()
            .map(|(_, block)| *index_of.get(&block).expect("block missing from its own palette"))
            .collect();
        encode_indices(&indices, self.bits_per_block())
    }

    /// Inverse of [`Palette::encode`]: fill `chunk`'s blocks from `words` in
    /// the same fixed order used to encode them.
    pub fn decode(&self, words: &[u64], chunk: &mut Chunk) -> StorageResult<()> {
        let bits = self.bits_per_block();
        let expected_words = packed_word_count(BLOCK_COUNT, bits);
        if words.len() != expected_words {
            return Err(StorageError::WordCountMismatch {
                expected: expected_words,
                actual: words.len(),
            });
        }

        let indices = decode_indices(words, BLOCK_COUNT, bits);

        let mut i = 0;
        for y in 0..WORLD_HEIGHT {
            for x in 0..CHUNK_SIZE {
                for z in 0..CHUNK_SIZE {
                    let idx = indices[i] as usize;
                    let block = *self.entries.get(idx).ok_or(StorageError::PaletteBounds {
                        index: idx,
                        len: self.entries.len(),
                    })?;
                    chunk.set_block(LocalBlockPos::new(x as u8, y as u16, z as u8), block);
                    i += 1;
                }
            }
        }
        Ok(())
    }

    /// `u32 count` followed by `count` big-endian `u32` block IDs.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.entries.len() * 4);
        let mut buf = [0u8; 4];
        BigEndian::write_u32(&mut buf, self.entries.len() as u32);
        out.extend_from_slice(&buf);
        for block in &self.entries {
            BigEndian::write_u32(&mut buf, block.0 as u32);
            out.extend_from_slice(&buf);
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> StorageResult<(Self, usize)> {
        if bytes.len() < 4 {
            return Err(StorageError::Truncated {
                expected: 4,
                actual: bytes.len(),
            });
        }
        let count = BigEndian::read_u32(&bytes[0..4]) as usize;
        let needed = 4 + count * 4;
        if bytes.len() < needed {
            return Err(StorageError::Truncated {
                expected: needed,
                actual: bytes.len(),
            });
        }
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let off = 4 + i * 4;
            let id = BigEndian::read_u32(&bytes[off..off + 4]);
            entries.push(BlockId::new(id as u16));
        }
        Ok((Self { entries }, needed))
    }
}

/// Number of `u64` words needed to hold `count` values packed at `bits` width.
pub fn packed_word_count(count: usize, bits: u8) -> usize {
    let total_bits = count as u64 * bits as u64;
    ((total_bits + 63) / 64) as usize
}

/// Bit-pack `indices` at `bits` width, low-aligned, little-endian within each
/// word: a value spanning a word boundary has its low
/// `64 - bit_in_word` bits in the current word and the remainder, also
/// low-aligned, starting the next word.
pub fn encode_indices(indices: &[u32], bits: u8) -> Vec<u64> {
    let bits = bits as u64;
    let word_count = packed_word_count(indices.len(), bits as u8);
    let mut words = vec![0u64; word_count];
    let mut bit_pos: u64 = 0;

    for &idx in indices {
        let mut value = idx as u64;
        let mut remaining = bits;
        let mut pos = bit_pos;
        while remaining > 0 {
            let word_idx = (pos / 64) as usize;
            let bit_in_word = pos % 64;
            let available = 64 - bit_in_word;
            let take = remaining.min(available);
            let mask = if take == 64 { u64::MAX } else { (1u64 << take) - 1 };
            words[word_idx] |= (value & mask) << bit_in_word;
            value >>= take;
            remaining -= take;
            pos += take;
        }
        bit_pos += bits;
    }

    words
}

/// Inverse of [`encode_indices`].
pub fn decode_indices(words: &[u64], count: usize, bits: u8) -> Vec<u32> {
    let bits = bits as u64;
    let mut out = Vec::with_capacity(count);
    let mut bit_pos: u64 = 0;

    for _ in 0..count {
        let mut value: u64 = 0;
        let mut remaining = bits;
        let mut shift = 0u64;
        let mut pos = bit_pos;
        while remaining > 0 {
            let word_idx = (pos / 64) as usize;
            let bit_in_word = pos % 64;
            let available = 64 - bit_in_word;
            let take = remaining.min(available);
            let mask = if take == 64 { u64::MAX } else { (1u64 << take) - 1 };
            let bits_here = (words[word_idx] >> bit_in_word) & mask;
            value |= bits_here << shift;
            shift += take;
            remaining -= take;
            pos += take;
        }
        bit_pos += bits;
        out.push(value as u32);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_per_block_matches_spec_table() {
        assert_eq!(bits_per_block(1), 1);
        assert_eq!(bits_per_block(2), 1);
        assert_eq!(bits_per_block(3), 2);
        assert_eq!(bits_per_block(4), 2);
        assert_eq!(bits_per_block(5), 3);
        assert_eq!(bits_per_block(16), 4);
        assert_eq!(bits_per_block(17), 5);
        assert_eq!(bits_per_block(256), 8);
    }

    #[test]
    fn pack_unpack_roundtrip_all_widths() {
        for bits in 1..=8u8 {
            let max_val = (1u32 << bits) - 1;
            let indices: Vec<u32> = (0..2000).map(|i| (i as u32) % (max_val + 1)).collect();
            let words = encode_indices(&indices, bits);
            let back = decode_indices(&words, indices.len(), bits);
            assert_eq!(indices, back, "mismatch at bits={bits}");
        }
    }

    #[test]
    fn pack_unpack_straddles_word_boundary() {
        // With bits=5, 64/5 = 12 entries fit before a value must straddle.
        let bits = 5u8;
        let indices: Vec<u32> = (0..64).map(|i| (i % 31) as u32).collect();
        let straddle_index = 64 / bits as usize; // first index whose bits cross a word boundary
        assert!(straddle_index > 0);
        let words = encode_indices(&indices, bits);
        let back = decode_indices(&words, indices.len(), bits);
        assert_eq!(indices, back);
    }

    #[test]
    fn build_from_chunk_rejects_257_distinct_types() {
        let mut chunk = Chunk::new(0, 0);
        for i in 0..257u16 {
            let x = (i % 16) as u8;
            let z = ((i / 16) % 16) as u8;
            let y = (i / 256) as u16;
            chunk.set_block(LocalBlockPos::new(x, y, z), BlockId::new(i + 1));
        }
        let err = Palette::build_from_chunk(&chunk).unwrap_err();
        assert!(matches!(err, StorageError::PaletteOverflow { .. }));
    }

    #[test]
    fn palette_serialize_roundtrip() {
        let palette = Palette {
            entries: vec![BlockId::AIR, BlockId::new(1), BlockId::new(42)],
        };
        let bytes = palette.serialize();
        let (back, consumed) = Palette::deserialize(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(palette, back);
    }
}
