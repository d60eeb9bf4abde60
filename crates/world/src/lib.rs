//! The live, mutable voxel world: chunks, blocks, and world/player state.
//!
//! This crate is a deliberately narrow collaborator of `stonebreak-storage`.
//! It owns the in-memory representation the game would mutate every tick;
//! it knows nothing about files, sectors, or compression. The storage engine
//! only ever touches a `Chunk` through the accessors defined here.

pub mod block;
pub mod chunk;
pub mod position;
pub mod world;

pub use block::BlockId;
pub use chunk::{Chunk, CHUNK_SIZE, WORLD_HEIGHT};
pub use position::{BlockPos, ChunkPos, LocalBlockPos};
pub use world::World;
