//! Entity records for `entities.dat`.
//!
//! Each record is `u8 version | u8 kind | fixed basis | variant data`, with
//! no reflection or runtime type lookup: every variant's layout is written
//! out by hand so the format is stable regardless of how the host
//! application's entity types evolve. `entities.dat` itself is a sequence
//! of these records, each framed with a `u32` length prefix (little-endian,
//! matching `world.dat`/`player.dat`).

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{StorageError, StorageResult};

pub const ENTITY_FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    BlockDrop = 0,
    ItemDrop = 1,
    Cow = 2,
}

impl EntityKind {
    fn ordinal(self) -> u8 {
        self as u8
    }

    fn from_ordinal(v: u8) -> StorageResult<Self> {
        match v {
            0 => Ok(Self::BlockDrop),
            1 => Ok(Self::ItemDrop),
            2 => Ok(Self::Cow),
            other => Err(StorageError::UnknownEntityKind { kind: other }),
        }
    }
}

/// Fields every entity variant carries, regardless of kind.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityBasis {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub rotation: [f32; 3],
    pub health: f32,
    pub max_health: f32,
    pub age: f32,
    pub alive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityVariant {
    BlockDrop {
        block_id: u32,
        despawn_timer: f32,
        stack_count: u32,
    },
    ItemDrop {
        item_id: u32,
        is_block_type: bool,
        item_count: u32,
        despawn_timer: f32,
        stack_count: u32,
    },
    Cow {
        texture_variant: String,
        can_be_milked: bool,
        milk_regen_timer: f32,
        ai_state: String,
    },
}

impl EntityVariant {
    fn kind(&self) -> EntityKind {
        match self {
            Self::BlockDrop { .. } => EntityKind::BlockDrop,
            Self::ItemDrop { .. } => EntityKind::ItemDrop,
            Self::Cow { .. } => EntityKind::Cow,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub basis: EntityBasis,
    pub variant: EntityVariant,
}

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
fn write_f32(out: &mut Vec<u8>, v: f32) {
    let mut buf = [0u8; 4];
    LittleEndian::write_f32(&mut buf, v);
    out.extend_from_slice(&buf);
}
fn write_string16(out: &mut Vec<u8>, s: &str) {
    let mut len_buf = [0u8; 2];
    LittleEndian::write_u16(&mut len_buf, s.len() as u16);
    out.extend_from_slice(&len_buf);
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
fn read_f32(bytes: &[u8], pos: &mut usize) -> StorageResult<f32> {
    require(bytes, *pos, 4)?;
    let v = LittleEndian::read_f32(&bytes[*pos..*pos + 4]);
    *pos += 4;
    Ok(v)
}
fn read_string16(bytes: &[u8], pos: &mut usize) -> StorageResult<String> {
    require(bytes, *pos, 2)?;
    let len = LittleEndian::read_u16(&bytes[*pos..*pos + 2]) as usize;
    *pos += 2;
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

pub fn encode(entity: &Entity) -> Vec<u8> {
    let mut out = Vec::new();
    write_u8(&mut out, ENTITY_FORMAT_VERSION);
    write_u8(&mut out, entity.variant.kind().ordinal());

    let b = &entity.basis;
    for v in b.position {
        write_f32(&mut out, v);
    }
    for v in b.velocity {
        write_f32(&mut out, v);
    }
    for v in b.rotation {
        write_f32(&mut out, v);
    }
    write_f32(&mut out, b.health);
    write_f32(&mut out, b.max_health);
    write_f32(&mut out, b.age);
    write_u8(&mut out, b.alive as u8);

    match &entity.variant {
        EntityVariant::BlockDrop {
            block_id,
            despawn_timer,
            stack_count,
        } => {
            write_u32(&mut out, *block_id);
            write_f32(&mut out, *despawn_timer);
            write_u32(&mut out, *stack_count);
        }
        EntityVariant::ItemDrop {
            item_id,
            is_block_type,
            item_count,
            despawn_timer,
            stack_count,
        } => {
            write_u32(&mut out, *item_id);
            write_u8(&mut out, *is_block_type as u8);
            write_u32(&mut out, *item_count);
            write_f32(&mut out, *despawn_timer);
            write_u32(&mut out, *stack_count);
        }
        EntityVariant::Cow {
            texture_variant,
            can_be_milked,
            milk_regen_timer,
            ai_state,
        } => {
            write_string16(&mut out, texture_variant);
            write_u8(&mut out, *can_be_milked as u8);
            write_f32(&mut out, *milk_regen_timer);
            write_string16(&mut out, ai_state);
        }
    }

    out
}

pub fn decode(bytes: &[u8]) -> StorageResult<Entity> {
    let mut pos = 0usize;
    let version = read_u8(bytes, &mut pos)?;
    if version != ENTITY_FORMAT_VERSION {
        return Err(StorageError::UnsupportedVersion {
            version: version as u32,
        });
    }
    let kind = EntityKind::from_ordinal(read_u8(bytes, &mut pos)?)?;

    let mut position = [0.0f32; 3];
    for v in &mut position {
        *v = read_f32(bytes, &mut pos)?;
    }
    let mut velocity = [0.0f32; 3];
    for v in &mut velocity {
        *v = read_f32(bytes, &mut pos)?;
    }
    let mut rotation = [0.0f32; 3];
    for v in &mut rotation {
        *v = read_f32(bytes, &mut pos)?;
    }
    let health = read_f32(bytes, &mut pos)?;
    let max_health = read_f32(bytes, &mut pos)?;
    let age = read_f32(bytes, &mut pos)?;
    let alive = read_u8(bytes, &mut pos)? != 0;

    let basis = EntityBasis {
        position,
        velocity,
        rotation,
        health,
        max_health,
        age,
        alive,
    };

    let variant = match kind {
        EntityKind::BlockDrop => EntityVariant::BlockDrop {
            block_id: read_u32(bytes, &mut pos)?,
            despawn_timer: read_f32(bytes, &mut pos)?,
            stack_count: read_u32(bytes, &mut pos)?,
        },
        EntityKind::ItemDrop => EntityVariant::ItemDrop {
            item_id: read_u32(bytes, &mut pos)?,
            is_block_type: read_u8(bytes, &mut pos)? != 0,
            item_count: read_u32(bytes, &mut pos)?,
            despawn_timer: read_f32(bytes, &mut pos)?,
            stack_count: read_u32(bytes, &mut pos)?,
        },
        EntityKind::Cow => EntityVariant::Cow {
            texture_variant: read_string16(bytes, &mut pos)?,
            can_be_milked: read_u8(bytes, &mut pos)? != 0,
            milk_regen_timer: read_f32(bytes, &mut pos)?,
            ai_state: read_string16(bytes, &mut pos)?,
        },
    };

    Ok(Entity { basis, variant })
}

/// Encode a sequence of entities into the `entities.dat` framing: each
/// record prefixed with its own `u32` byte length.
pub fn encode_all(entities: &[Entity]) -> Vec<u8> {
    let mut out = Vec::new();
    for entity in entities {
        let record = encode(entity);
        write_u32(&mut out, record.len() as u32);
        out.extend_from_slice(&record);
    }
    out
}

pub fn decode_all(bytes: &[u8]) -> StorageResult<Vec<Entity>> {
    let mut pos = 0usize;
    let mut entities = Vec::new();
    while pos < bytes.len() {
        let len = read_u32(bytes, &mut pos)? as usize;
        require(bytes, pos, len)?;
        entities.push(decode(&bytes[pos..pos + len])?);
        pos += len;
    }
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_basis() -> EntityBasis {
        EntityBasis {
            position: [1.0, 2.0, 3.0],
            velocity: [0.0, -0.1, 0.0],
            rotation: [0.0, 90.0, 0.0],
            health: 10.0,
            max_health: 10.0,
            age: 3.5,
            alive: true,
        }
    }

    #[test]
    fn block_drop_roundtrip() {
        let entity = Entity {
            basis: sample_basis(),
            variant: EntityVariant::BlockDrop {
                block_id: 4,
                despawn_timer: 300.0,
                stack_count: 12,
            },
        };
        let bytes = encode(&entity);
        assert_eq!(decode(&bytes).unwrap(), entity);
    }

    #[test]
    fn item_drop_roundtrip() {
        let entity = Entity {
            basis: sample_basis(),
            variant: EntityVariant::ItemDrop {
                item_id: 99,
                is_block_type: false,
                item_count: 3,
                despawn_timer: 250.0,
                stack_count: 1,
            },
        };
        let bytes = encode(&entity);
        assert_eq!(decode(&bytes).unwrap(), entity);
    }

    #[test]
    fn cow_roundtrip() {
        let entity = Entity {
            basis: sample_basis(),
            variant: EntityVariant::Cow {
                texture_variant: "brown".into(),
                can_be_milked: true,
                milk_regen_timer: 120.0,
                ai_state: "grazing".into(),
            },
        };
        let bytes = encode(&entity);
        assert_eq!(decode(&bytes).unwrap(), entity);
    }

    #[test]
    fn unknown_kind_byte_is_rejected() {
        let mut bytes = encode(&Entity {
            basis: sample_basis(),
            variant: EntityVariant::BlockDrop {
                block_id: 1,
                despawn_timer: 1.0,
                stack_count: 1,
            },
        });
        bytes[1] = 99;
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, StorageError::UnknownEntityKind { kind: 99 }));
    }

    #[test]
    fn sequence_framing_roundtrips_multiple_entities() {
        let entities = vec![
            Entity {
                basis: sample_basis(),
                variant: EntityVariant::BlockDrop {
                    block_id: 1,
                    despawn_timer: 1.0,
                    stack_count: 1,
                },
            },
            Entity {
                basis: sample_basis(),
                variant: EntityVariant::Cow {
                    texture_variant: "spotted".into(),
                    can_be_milked: false,
                    milk_regen_timer: 0.0,
                    ai_state: "idle".into(),
                },
            },
        ];
        let bytes = encode_all(&entities);
        assert_eq!(decode_all(&bytes).unwrap(), entities);
    }
}
