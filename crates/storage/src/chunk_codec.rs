//! Chunk encode/decode: self-describing header + palette + packed blocks,
//! optionally LZ4-compressed as a whole.
//!
//! A chunk payload is a self-describing byte blob: a 32-byte header, a
//! palette block, and a packed-blocks block, optionally LZ4-compressed as a
//! whole. The region layer never looks inside this blob -- it only ever sees
//! an opaque byte slice framed by its own sector bookkeeping.

use byteorder::{BigEndian, ByteOrder};
use stonebreak_world::Chunk;

use crate::error::{StorageError, StorageResult};
use crate::palette::Palette;

/// "SBK1": Stonebreak chunk format, version 1.
pub const CHUNK_MAGIC: u32 = 0x53424B31;
pub const CHUNK_FORMAT_VERSION: u16 = 1;
pub const CHUNK_HEADER_LEN: usize = 32;

const FLAG_DIRTY: u8 = 1 << 0;
const FLAG_PLAYER_MODIFIED: u8 = 1 << 1;
const FLAG_FEATURES_POPULATED: u8 = 1 << 2;
const FLAG_COMPRESSED: u8 = 1 << 3;

/// LZ4 is adopted only if it shrinks the payload below 90% of its original
/// size; otherwise the extra decode hop buys nothing and the uncompressed
/// form is kept.
const COMPRESSION_SAVINGS_NUMERATOR: usize = 9;
const COMPRESSION_SAVINGS_DENOMINATOR: usize = 10;

#[derive(Debug, Clone, Copy)]
struct ChunkHeader {
    cx: i32,
    cz: i32,
    palette_len: u16,
    bits_per_block: u8,
    flags: u8,
    uncompressed_size: u32,
    last_modified_ms: i64,
}

impl ChunkHeader {
    fn write(&self, out: &mut Vec<u8>) {
        let mut buf = [0u8; CHUNK_HEADER_LEN];
        BigEndian::write_u32(&mut buf[0..4], CHUNK_MAGIC);
        BigEndian::write_u16(&mut buf[4..6], CHUNK_FORMAT_VERSION);
        BigEndian::write_i32(&mut buf[6..10], self.cx);
        BigEndian::write_i32(&mut buf[10..14], self.cz);
        BigEndian::write_u16(&mut buf[14..16], self.palette_len);
        buf[16] = self.bits_per_block;
        buf[17] = self.flags;
        BigEndian::write_u32(&mut buf[18..22], self.uncompressed_size);
        BigEndian::write_i64(&mut buf[22..30], self.last_modified_ms);
        // buf[30..32] reserved, left zeroed.
        out.extend_from_slice(&buf);
    }

    fn read(bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() < CHUNK_HEADER_LEN {
            return Err(StorageError::Truncated {
                expected: CHUNK_HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let magic = BigEndian::read_u32(&bytes[0..4]);
        if magic != CHUNK_MAGIC {
            return Err(StorageError::BadMagic {
                expected: CHUNK_MAGIC,
                actual: magic,
            });
        }
        let version = BigEndian::read_u16(&bytes[4..6]);
        if version != CHUNK_FORMAT_VERSION {
            return Err(StorageError::UnsupportedVersion {
                version: version as u32,
            });
        }
        Ok(Self {
            cx: BigEndian::read_i32(&bytes[6..10]),
            cz: BigEndian::read_i32(&bytes[10..14]),
            palette_len: BigEndian::read_u16(&bytes[14..16]),
            bits_per_block: bytes[16],
            flags: bytes[17],
            uncompressed_size: BigEndian::read_u32(&bytes[18..22]),
            last_modified_ms: BigEndian::read_i64(&bytes[22..30]),
        })
    }
}

fn serialize_words(words: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + words.len() * 8);
    let mut buf = [0u8; 4];
    BigEndian::write_u32(&mut buf, words.len() as u32);
    out.extend_from_slice(&buf);
    for &w in words {
        let mut wbuf = [0u8; 8];
        BigEndian::write_u64(&mut wbuf, w);
        out.extend_from_slice(&wbuf);
    }
    out
}

fn deserialize_words(bytes: &[u8]) -> StorageResult<(Vec<u64>, usize)> {
    if bytes.len() < 4 {
        return Err(StorageError::Truncated {
            expected: 4,
            actual: bytes.len(),
        });
    }
    let count = BigEndian::read_u32(&bytes[0..4]) as usize;
    let needed = 4 + count * 8;
    if bytes.len() < needed {
        return Err(StorageError::Truncated {
            expected: needed,
            actual: bytes.len(),
        });
    }
    let mut words = Vec::with_capacity(count);
    for i in 0..count {
        let off = 4 + i * 8;
        words.push(BigEndian::read_u64(&bytes[off..off + 8]));
    }
    Ok((words, needed))
}

/// Encode a chunk into a self-describing byte blob: header + palette +
/// packed blocks, optionally LZ4-compressed.
pub fn encode(chunk: &Chunk) -> StorageResult<Vec<u8>> {
    let palette = Palette::build_from_chunk(chunk)?;
    let words = palette.encode(chunk);

    let mut uncompressed = palette.serialize();
    uncompressed.extend_from_slice(&serialize_words(&words));

    let compressed = lz4_flex::block::compress(&uncompressed);
    let adopt_compressed =
        compressed.len() * COMPRESSION_SAVINGS_DENOMINATOR
            < uncompressed.len() * COMPRESSION_SAVINGS_NUMERATOR;

    let (cx, cz) = chunk.coords();
    let mut flags = 0u8;
    if chunk.is_dirty() {
        flags |= FLAG_DIRTY;
    }
    if chunk.is_player_modified() {
        flags |= FLAG_PLAYER_MODIFIED;
    }
    if chunk.is_features_populated() {
        flags |= FLAG_FEATURES_POPULATED;
    }
    if adopt_compressed {
        flags |= FLAG_COMPRESSED;
    }

    let header = ChunkHeader {
        cx,
        cz,
        palette_len: palette.len() as u16,
        bits_per_block: palette.bits_per_block(),
        flags,
        uncompressed_size: uncompressed.len() as u32,
        last_modified_ms: chunk.last_modified(),
    };

    let mut out = Vec::with_capacity(CHUNK_HEADER_LEN + uncompressed.len());
    header.write(&mut out);
    if adopt_compressed {
        out.extend_from_slice(&compressed);
    } else {
        out.extend_from_slice(&uncompressed);
    }
    Ok(out)
}

/// Decode a chunk payload produced by [`encode`] back into an owned `Chunk`.
pub fn decode(bytes: &[u8]) -> StorageResult<Chunk> {
    let header = ChunkHeader::read(bytes)?;
    let body = &bytes[CHUNK_HEADER_LEN..];

    let uncompressed_size = header.uncompressed_size as usize;
    let uncompressed: Vec<u8> = if header.flags & FLAG_COMPRESSED != 0 {
        let decompressed = lz4_flex::block::decompress(body, uncompressed_size).map_err(|_| {
            StorageError::DecompressionMismatch {
                expected: header.uncompressed_size,
                actual: 0,
            }
        })?;
        if decompressed.len() != uncompressed_size {
            return Err(StorageError::DecompressionMismatch {
                expected: header.uncompressed_size,
                actual: decompressed.len(),
            });
        }
        decompressed
    } else {
        if body.len() < uncompressed_size {
            return Err(StorageError::Truncated {
                expected: uncompressed_size,
                actual: body.len(),
            });
        }
        body[..uncompressed_size].to_vec()
    };

    let (palette, consumed) = Palette::deserialize(&uncompressed)?;
    if palette.len() != header.palette_len as usize {
        return Err(StorageError::PaletteBounds {
            index: palette.len(),
            len: header.palette_len as usize,
        });
    }
    let (words, _) = deserialize_words(&uncompressed[consumed..])?;

    let mut chunk = Chunk::new(header.cx, header.cz);
    palette.decode(&words, &mut chunk)?;
    chunk.set_last_modified(header.last_modified_ms);
    chunk.set_features_populated(header.flags & FLAG_FEATURES_POPULATED != 0);
    chunk.set_player_modified(header.flags & FLAG_PLAYER_MODIFIED != 0);
    if header.flags & FLAG_DIRTY == 0 {
        chunk.mark_clean();
    }

    Ok(chunk)
}
