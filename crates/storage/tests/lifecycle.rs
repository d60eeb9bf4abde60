//! End-to-end scenarios spanning more than one module: a save/restart cycle
//! through the public `SaveService`/`RegionStore` surface, the auto-save
//! overlap guard under real timing, and recovery falling back to a backup.

use std::sync::Arc;
use std::time::Duration;

use stonebreak_storage::{PlayerState, RegionStore, SaveService, StorageConfig, WorldMetadata};
use stonebreak_world::{BlockId, BlockPos, Chunk, LocalBlockPos, World};

fn populate(world: &World, cx: i32, cz: i32, fill: u16) {
    let mut chunk = Chunk::new(cx, cz);
    for x in 0..16u8 {
        for z in 0..16u8 {
            chunk.set_block(LocalBlockPos::new(x, 0, z), BlockId::new(fill));
        }
    }
    world.install_chunk(cx, cz, chunk);
}

#[tokio::test]
async fn world_survives_a_save_and_restart_cycle() {
    let dir = tempfile::tempdir().unwrap();

    let world = Arc::new(World::new("Ashwood", 42));
    for cx in 0..6 {
        for cz in 0..6 {
            populate(&world, cx, cz, (cx * 6 + cz) as u16 + 1);
        }
    }
    // every installed chunk starts clean; touch one block per column so the
    // save path actually has something to do.
    for cx in 0..6 {
        for cz in 0..6 {
            world.set_block(BlockPos::new((cx * 16) as i64, 1, (cz * 16) as i64), BlockId::new(99));
        }
    }
    assert_eq!(world.dirty_chunks().len(), 36);

    let service = Arc::new(SaveService::new(dir.path(), StorageConfig::default(), world.clone()));
    service
        .initialize(WorldMetadata::new("Ashwood", 42, 0), PlayerState::default())
        .await;
    service.save_all().await.unwrap();
    assert_eq!(world.dirty_chunks().len(), 0);
    service.close().await;

    // a fresh process: new World, new SaveService, load from disk.
    let reloaded_world = Arc::new(World::new("Ashwood", 0));
    let reloaded = Arc::new(SaveService::new(dir.path(), StorageConfig::default(), reloaded_world.clone()));
    let loaded = reloaded.load_world().await.unwrap();
    assert_eq!(loaded.world_meta.world_name, "Ashwood");
    assert_eq!(loaded.world_meta.seed, 42);

    let region_store = RegionStore::new(dir.path().join("regions"), 8, 4);
    for cx in 0..6 {
        for cz in 0..6 {
            let chunk = region_store.load(cx, cz).await.unwrap().expect("chunk was saved");
            assert_eq!(chunk.get_block(LocalBlockPos::new(0, 1, 0)), BlockId::new(99));
            let expected_fill = (cx * 6 + cz) as u16 + 1;
            assert_eq!(chunk.get_block(LocalBlockPos::new(5, 0, 5)), BlockId::new(expected_fill));
        }
    }
}

#[tokio::test]
async fn region_store_round_trips_a_full_region() {
    let dir = tempfile::tempdir().unwrap();
    let store = RegionStore::new(dir.path(), 4, 4);

    for lx in 0..32i32 {
        for lz in 0..32i32 {
            let mut chunk = Chunk::new(lx, lz);
            chunk.set_block(LocalBlockPos::new(0, 0, 0), BlockId::new(((lx + lz) % 255 + 1) as u16));
            let payload = stonebreak_storage::chunk_codec::encode(&chunk).unwrap();
            store.save(payload, lx, lz).await.unwrap();
        }
    }

    for lx in 0..32i32 {
        for lz in 0..32i32 {
            let chunk = store.load(lx, lz).await.unwrap().unwrap();
            assert_eq!(
                chunk.get_block(LocalBlockPos::new(0, 0, 0)),
                BlockId::new(((lx + lz) % 255 + 1) as u16)
            );
        }
    }
}

#[tokio::test]
async fn auto_save_skips_overlapping_cycles_under_load() {
    let dir = tempfile::tempdir().unwrap();
    let world = Arc::new(World::new("Loadtest", 7));
    for cx in 0..60 {
        for cz in 0..5 {
            populate(&world, cx, cz, 1);
        }
    }

    let config = StorageConfig {
        auto_save_interval: Duration::from_millis(5),
        chunk_save_batch_size: 4,
        flush_timeout: Duration::from_secs(5),
        ..StorageConfig::default()
    };
    let service = Arc::new(SaveService::new(dir.path(), config, world.clone()));
    service
        .initialize(WorldMetadata::new("Loadtest", 7, 0), PlayerState::default())
        .await;

    service.start_auto_save().await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    service.close().await;

    assert!(
        service.auto_save_skipped_cycles() > 0,
        "a 5ms tick racing hundreds of chunk saves should skip at least one overlapping cycle"
    );
    assert_eq!(world.dirty_chunks().len(), 0, "everything should be saved by the time we close");
}

#[tokio::test]
async fn recovery_restores_from_the_newest_valid_backup() {
    let dir = tempfile::tempdir().unwrap();
    let world_dir = dir.path().join("world");
    let backups_dir = dir.path().join("backups");

    let world = Arc::new(World::new("Driftwood", 9));
    populate(&world, 0, 0, 5);
    world.set_block(BlockPos::new(0, 0, 0), BlockId::new(5));

    let service = Arc::new(SaveService::new(&world_dir, StorageConfig::default(), world.clone()));
    service
        .initialize(WorldMetadata::new("Driftwood", 9, 0), PlayerState::default())
        .await;
    service.save_all().await.unwrap();
    service.close().await;

    let backup_path = stonebreak_storage::backup::create_backup(&world_dir, &backups_dir, "Driftwood").unwrap();
    assert!(backup_path.join("world.dat").exists());

    // corrupt the live world.dat in place.
    std::fs::write(world_dir.join("world.dat"), b"not a valid world record").unwrap();
    let report = stonebreak_storage::validator::validate_world(&world_dir, None).unwrap();
    assert!(!report.is_healthy());

    let outcome = stonebreak_storage::validator::recover(&world_dir, &backups_dir, "Driftwood").unwrap();
    match outcome {
        stonebreak_storage::validator::RecoveryOutcome::RestoredFromBackup(restored_from) => {
            assert_eq!(restored_from, backup_path);
        }
        other => panic!("expected a restore from backup, got {other:?}"),
    }

    let report_after = stonebreak_storage::validator::validate_world(&world_dir, None).unwrap();
    assert!(report_after.is_healthy());
}
