//! World and player metadata.
//!
//! Both files share one binary scheme -- little-endian integers, IEEE 754
//! little-endian floats, `u32 len + UTF-8 bytes` strings -- and both are
//! written through [`crate::atomic_file::atomic_write`].

use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use crate::atomic_file::atomic_write;
use crate::error::{StorageError, StorageResult};

pub const WORLD_MAGIC: u32 = 0x53544F4E; // "STON"
pub const WORLD_FORMAT_VERSION: u32 = 1;

fn require(bytes: &[u8], pos: usize, len: usize) -> StorageResult<()> {
    if bytes.len() < pos + len {
        return Err(StorageError::Truncated {
            expected: pos + len,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn write_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}
fn write_u32(out: &mut Vec<u8>, v: u32) {
    let mut buf = [0u8; 4];
    LittleEndian::write_u32(&mut buf, v);
    out.extend_from_slice(&buf);
}
fn write_i64(out: &mut Vec<u8>, v: i64) {
    let mut buf = [0u8; 8];
    LittleEndian::write_i64(&mut buf, v);
    out.extend_from_slice(&buf);
}
fn write_f32(out: &mut Vec<u8>, v: f32) {
    let mut buf = [0u8; 4];
    LittleEndian::write_f32(&mut buf, v);
    out.extend_from_slice(&buf);
}
fn write_u16(out: &mut Vec<u8>, v: u16) {
    let mut buf = [0u8; 2];
    LittleEndian::write_u16(&mut buf, v);
    out.extend_from_slice(&buf);
}
fn write_string(out: &mut Vec<u8>, s: &str) {
    write_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn read_u8(bytes: &[u8], pos: &mut usize) -> StorageResult<u8> {
    require(bytes, *pos, 1)?;
    let v = bytes[*pos];
    *pos += 1;
    Ok(v)
}
fn read_u32(bytes: &[u8], pos: &mut usize) -> StorageResult<u32> {
    require(bytes, *pos, 4)?;
    let v = LittleEndian::read_u32(&bytes[*pos..*pos + 4]);
    *pos += 4;
    Ok(v)
}
fn read_i64(bytes: &[u8], pos: &mut usize) -> StorageResult<i64> {
    require(bytes, *pos, 8)?;
    let v = LittleEndian::read_i64(&bytes[*pos..*pos + 8]);
    *pos += 8;
    Ok(v)
}
fn read_f32(bytes: &[u8], pos: &mut usize) -> StorageResult<f32> {
    require(bytes, *pos, 4)?;
    let v = LittleEndian::read_f32(&bytes[*pos..*pos + 4]);
    *pos += 4;
    Ok(v)
}
fn read_u16(bytes: &[u8], pos: &mut usize) -> StorageResult<u16> {
    require(bytes, *pos, 2)?;
    let v = LittleEndian::read_u16(&bytes[*pos..*pos + 2]);
    *pos += 2;
    Ok(v)
}
fn read_string(bytes: &[u8], pos: &mut usize) -> StorageResult<String> {
    let len = read_u32(bytes, pos)? as usize;
    if bytes.len() < *pos + len {
        return Err(StorageError::TruncatedString {
            declared: len,
            remaining: bytes.len() - *pos,
        });
    }
    let s = std::str::from_utf8(&bytes[*pos..*pos + len])
        .map_err(|_| StorageError::TruncatedString {
            declared: len,
            remaining: bytes.len() - *pos,
        })?
        .to_string();
    *pos += len;
    Ok(s)
}

/// A `key, value` pair of opaque per-world or per-player properties.
pub type Property = (String, String);

/// The `world.dat` record: identity, playtime accounting, spawn, and a free
/// `key -> value` property bag for whatever the host application wants to
/// persist without a format bump.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldMetadata {
    pub created_time_ms: i64,
    pub last_played_ms: i64,
    pub total_play_time_ms: i64,
    pub seed: i64,
    pub world_name: String,
    pub spawn_position: [f32; 3],
    pub game_mode: u32,
    pub cheats_enabled: bool,
    pub properties: Vec<Property>,
}

impl WorldMetadata {
    pub fn new(world_name: impl Into<String>, seed: i64, now_ms: i64) -> Self {
        Self {
            created_time_ms: now_ms,
            last_played_ms: now_ms,
            total_play_time_ms: 0,
            seed,
            world_name: world_name.into(),
            spawn_position: [0.0, 64.0, 0.0],
            game_mode: 0,
            cheats_enabled: false,
            properties: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        write_i64(&mut payload, self.seed);
        write_string(&mut payload, &self.world_name);
        for v in self.spawn_position {
            write_f32(&mut payload, v);
        }
        write_u32(&mut payload, self.game_mode);
        write_u8(&mut payload, self.cheats_enabled as u8);
        write_u32(&mut payload, self.properties.len() as u32);
        for (k, v) in &self.properties {
            write_string(&mut payload, k);
            write_string(&mut payload, v);
        }

        let mut out = Vec::with_capacity(28 + payload.len());
        write_u32(&mut out, WORLD_MAGIC);
        write_u32(&mut out, WORLD_FORMAT_VERSION);
        write_i64(&mut out, self.created_time_ms);
        write_i64(&mut out, self.last_played_ms);
        write_i64(&mut out, self.total_play_time_ms);
        write_u32(&mut out, payload.len() as u32);
        out.extend_from_slice(&payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        let mut pos = 0usize;
        let magic = read_u32(bytes, &mut pos)?;
        if magic != WORLD_MAGIC {
            return Err(StorageError::BadMagic {
                expected: WORLD_MAGIC,
                actual: magic,
            });
        }
        let version = read_u32(bytes, &mut pos)?;
        if version != WORLD_FORMAT_VERSION {
            return Err(StorageError::UnsupportedVersion { version });
        }
        let created_time_ms = read_i64(bytes, &mut pos)?;
        let last_played_ms = read_i64(bytes, &mut pos)?;
        let total_play_time_ms = read_i64(bytes, &mut pos)?;
        let payload_size = read_u32(bytes, &mut pos)?;

        let payload_start = pos;
        let seed = read_i64(bytes, &mut pos)?;
        let world_name = read_string(bytes, &mut pos)?;
        let mut spawn_position = [0.0f32; 3];
        for v in &mut spawn_position {
            *v = read_f32(bytes, &mut pos)?;
        }
        let game_mode = read_u32(bytes, &mut pos)?;
        let cheats_enabled = read_u8(bytes, &mut pos)? != 0;
        let property_count = read_u32(bytes, &mut pos)? as usize;
        let mut properties = Vec::with_capacity(property_count);
        for _ in 0..property_count {
            let key = read_string(bytes, &mut pos)?;
            let value = read_string(bytes, &mut pos)?;
            properties.push((key, value));
        }

        let actual_payload_len = pos - payload_start;
        if actual_payload_len != payload_size as usize {
            return Err(StorageError::PayloadSizeMismatch {
                declared: payload_size,
                actual: actual_payload_len,
            });
        }

        Ok(Self {
            created_time_ms,
            last_played_ms,
            total_play_time_ms,
            seed,
            world_name,
            spawn_position,
            game_mode,
            cheats_enabled,
            properties,
        })
    }

    pub fn save(&self, path: &Path) -> StorageResult<()> {
        atomic_write(path, &self.encode())
    }

    pub fn load(path: &Path) -> StorageResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.display().to_string())
            } else {
                StorageError::io(path, e)
            }
        })?;
        Self::decode(&bytes)
    }
}

/// One occupied inventory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventorySlot {
    pub slot_index: u16,
    pub item_id: u16,
    pub count: u16,
}

/// The `player.dat` record.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub pitch: f32,
    pub yaw: f32,
    pub health: f32,
    pub hotbar_index: u32,
    pub selected_slot: u32,
    pub inventory: Vec<InventorySlot>,
    pub properties: Vec<Property>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            position: [0.0, 64.0, 0.0],
            velocity: [0.0, 0.0, 0.0],
            pitch: 0.0,
            yaw: 0.0,
            health: 20.0,
            hotbar_index: 0,
            selected_slot: 0,
            inventory: Vec::new(),
            properties: Vec::new(),
        }
    }
}

impl PlayerState {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for v in self.position {
            write_f32(&mut out, v);
        }
        for v in self.velocity {
            write_f32(&mut out, v);
        }
        write_f32(&mut out, self.pitch);
        write_f32(&mut out, self.yaw);
        write_f32(&mut out, self.health);
        write_u32(&mut out, self.hotbar_index);
        write_u32(&mut out, self.selected_slot);

        write_u32(&mut out, self.inventory.len() as u32);
        for slot in &self.inventory {
            write_u16(&mut out, slot.slot_index);
            write_u16(&mut out, slot.item_id);
            write_u16(&mut out, slot.count);
        }

        write_u32(&mut out, self.properties.len() as u32);
        for (k, v) in &self.properties {
            write_string(&mut out, k);
            write_string(&mut out, v);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        let mut pos = 0usize;
        let mut position = [0.0f32; 3];
        for v in &mut position {
            *v = read_f32(bytes, &mut pos)?;
        }
        let mut velocity = [0.0f32; 3];
        for v in &mut velocity {
            *v = read_f32(bytes, &mut pos)?;
        }
        let pitch = read_f32(bytes, &mut pos)?;
        let yaw = read_f32(bytes, &mut pos)?;
        let health = read_f32(bytes, &mut pos)?;
        let hotbar_index = read_u32(bytes, &mut pos)?;
        let selected_slot = read_u32(bytes, &mut pos)?;

        let inventory_count = read_u32(bytes, &mut pos)? as usize;
        let mut inventory = Vec::with_capacity(inventory_count);
        for _ in 0..inventory_count {
            let slot_index = read_u16(bytes, &mut pos)?;
            let item_id = read_u16(bytes, &mut pos)?;
            let count = read_u16(bytes, &mut pos)?;
            inventory.push(InventorySlot {
                slot_index,
                item_id,
                count,
            });
        }

        let property_count = read_u32(bytes, &mut pos)? as usize;
        let mut properties = Vec::with_capacity(property_count);
        for _ in 0..property_count {
            let key = read_string(bytes, &mut pos)?;
            let value = read_string(bytes, &mut pos)?;
            properties.push((key, value));
        }

        Ok(Self {
            position,
            velocity,
            pitch,
            yaw,
            health,
            hotbar_index,
            selected_slot,
            inventory,
            properties,
        })
    }

    pub fn save(&self, path: &Path) -> StorageResult<()> {
        atomic_write(path, &self.encode())
    }

    pub fn load(path: &Path) -> StorageResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.display().to_string())
            } else {
                StorageError::io(path, e)
            }
        })?;
        Self::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_metadata_roundtrip() {
        let mut meta = WorldMetadata::new("Ashwood", 42, 1_700_000_000_000);
        meta.properties.push(("difficulty".into(), "hard".into()));
        meta.total_play_time_ms = 123_456;

        let bytes = meta.encode();
        let decoded = WorldMetadata::decode(&bytes).unwrap();
        assert_eq!(meta, decoded);
    }

    #[test]
    fn world_metadata_rejects_bad_magic() {
        let mut bytes = WorldMetadata::new("Ashwood", 1, 0).encode();
        bytes[0] ^= 0xFF;
        let err = WorldMetadata::decode(&bytes).unwrap_err();
        assert!(matches!(err, StorageError::BadMagic { .. }));
    }

    #[test]
    fn world_metadata_atomic_save_load_via_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.dat");
        let meta = WorldMetadata::new("Driftwood", 7, 5_000);
        meta.save(&path).unwrap();
        let loaded = WorldMetadata::load(&path).unwrap();
        assert_eq!(meta, loaded);
    }

    #[test]
    fn world_metadata_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorldMetadata::load(&dir.path().join("world.dat")).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn player_state_roundtrip() {
        let mut player = PlayerState {
            position: [1.0, 70.0, -3.5],
            health: 18.5,
            ..Default::default()
        };
        player.inventory.push(InventorySlot {
            slot_index: 0,
            item_id: 5,
            count: 64,
        });
        player.properties.push(("class".into(), "ranger".into()));

        let bytes = player.encode();
        let decoded = PlayerState::decode(&bytes).unwrap();
        assert_eq!(player, decoded);
    }
}
