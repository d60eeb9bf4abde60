use std::path::PathBuf;
use std::sync::Arc;

use stonebreak_storage::{PlayerState, SaveService, StorageConfig, StorageError, WorldMetadata};
use stonebreak_world::{BlockId, Chunk, ChunkPos, LocalBlockPos, World};

const BEDROCK: BlockId = BlockId::new(7);
const STONE: BlockId = BlockId::new(1);
const DIRT: BlockId = BlockId::new(2);

#[tokio::main]
async fn main() {
    let world_dir: PathBuf = std::env::args()
        .skip_while(|a| a != "--world")
        .nth(1)
        .unwrap_or_else(|| "world".into())
        .into();
    let seed: i64 = std::env::args()
        .skip_while(|a| a != "--seed")
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    tracing::info!("stonebreak storage demo host");
    std::fs::create_dir_all(&world_dir).expect("world directory must be creatable");

    let config = StorageConfig::default();
    let world_name = world_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("world")
        .to_string();
    let world = Arc::new(World::new(world_name.as_str(), seed));

    let service = Arc::new(SaveService::new(world_dir.clone(), config, Arc::clone(&world)));

    match service.load_world().await {
        Ok(loaded) => {
            tracing::info!("loaded existing world metadata for '{}'", loaded.world_meta.world_name);
            service.initialize(loaded.world_meta, loaded.player_state).await;
        }
        Err(StorageError::NotFound(_)) => {
            tracing::info!("no existing world at {}, generating a fresh one", world_dir.display());
            generate_flat_world(&world, 8);
            service
                .initialize(WorldMetadata::new(world_name.as_str(), seed, 0), PlayerState::default())
                .await;
        }
        Err(err) => {
            tracing::error!(%err, "failed to load world, aborting");
            return;
        }
    }

    tracing::info!(chunks = world.chunk_count(), "world ready");

    service.start_auto_save().await;

    tracing::info!("running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    tracing::info!("shutting down, flushing saves...");

    service.close().await;
    tracing::info!("shutdown complete");
}

/// A small flat world for exercising the storage engine without a real game
/// loop driving it: bedrock at y=0, stone y=1-3, dirt at y=4.
fn generate_flat_world(world: &World, chunk_radius: i32) {
    for cx in -chunk_radius..chunk_radius {
        for cz in -chunk_radius..chunk_radius {
            let pos = ChunkPos::new(cx, cz);
            let mut chunk = Chunk::new(cx, cz);
            for x in 0..16u8 {
                for z in 0..16u8 {
                    chunk.set_block(LocalBlockPos::new(x, 0, z), BEDROCK);
                    for y in 1..=3u16 {
                        chunk.set_block(LocalBlockPos::new(x, y, z), STONE);
                    }
                    chunk.set_block(LocalBlockPos::new(x, 4, z), DIRT);
                }
            }
            world.install_chunk(pos.cx, pos.cz, chunk);
        }
    }
}
