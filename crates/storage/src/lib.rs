//! Persistent voxel world storage: palette-packed chunk encoding, a
//! region-file container with O(1) random access, a bounded region cache,
//! and the async save orchestrator that ties it all to a live
//! [`stonebreak_world::World`].
//!
//! Module dependency chain, bottom to top:
//! `palette -> chunk_codec -> region -> region_store -> save_service`, with
//! `world_meta`, `entity_codec`, `atomic_file`, `validator`, and `backup`
//! sitting alongside as independent concerns.

pub mod atomic_file;
pub mod backup;
pub mod chunk_codec;
pub mod config;
pub mod entity_codec;
pub mod error;
pub mod palette;
pub mod region;
pub mod region_store;
pub mod save_service;
pub mod validator;
pub mod world_meta;

pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use region_store::RegionStore;
pub use save_service::{LoadResult, SaveService};
pub use world_meta::{InventorySlot, PlayerState, WorldMetadata};
