//! Offline validation and non-destructive recovery.
//!
//! Both functions here operate on a world directory while nothing else has
//! it open -- they are meant to run between sessions (on load, or from an
//! admin tool), not concurrently with a live `SaveService`.

use std::path::{Path, PathBuf};

use crate::backup;
use crate::chunk_codec;
use crate::entity_codec;
use crate::error::StorageResult;
use crate::region::{RegionCoord, RegionFile};
use crate::world_meta::{PlayerState, WorldMetadata};

/// What went wrong with a region file: either one populated slot failed to
/// decode, or the file's own header/directory couldn't be opened at all (in
/// which case there's no slot coordinate to point at).
#[derive(Debug, Clone)]
pub enum RegionFault {
    Slot { lx: u8, lz: u8 },
    File,
}

/// One corrupt region file, or one corrupt slot within an otherwise
/// readable region file.
#[derive(Debug, Clone)]
pub struct CorruptSlot {
    pub region_path: PathBuf,
    pub fault: RegionFault,
    pub error: String,
}

/// Outcome of [`validate_world`]. A report with no diagnostics and both
/// metadata files parsing is healthy; anything else names what to recover.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub world_dat_error: Option<String>,
    pub player_dat_error: Option<String>,
    pub entities_dat_error: Option<String>,
    pub corrupt_chunks: Vec<CorruptSlot>,
}

impl ValidationReport {
    pub fn is_healthy(&self) -> bool {
        self.world_dat_error.is_none()
            && self.player_dat_error.is_none()
            && self.entities_dat_error.is_none()
            && self.corrupt_chunks.is_empty()
    }
}

/// Validate a world directory: `world.dat` must exist and parse;
/// `player.dat` and `entities.dat`, if present, must parse; every populated
/// slot in up to `sample_region_files` region files (or all of them, if
/// `None`) is read back through [`chunk_codec::decode`].
pub fn validate_world(world_dir: &Path, sample_region_files: Option<usize>) -> StorageResult<ValidationReport> {
    let world_dat_error = match WorldMetadata::load(&world_dir.join("world.dat")) {
        Ok(_) => None,
        Err(err) => Some(err.to_string()),
    };

    let player_path = world_dir.join("player.dat");
    let player_dat_error = if player_path.exists() {
        PlayerState::load(&player_path).err().map(|e| e.to_string())
    } else {
        None
    };

    let entities_path = world_dir.join("entities.dat");
    let entities_dat_error = if entities_path.exists() {
        match std::fs::read(&entities_path) {
            Ok(bytes) => entity_codec::decode_all(&bytes).err().map(|e| e.to_string()),
            Err(e) => Some(e.to_string()),
        }
    } else {
        None
    };

    let mut corrupt_chunks = Vec::new();
    let regions_dir = world_dir.join("regions");
    if regions_dir.is_dir() {
        let mut region_paths: Vec<PathBuf> = std::fs::read_dir(&regions_dir)
            .map_err(|e| crate::error::StorageError::io(&regions_dir, e))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("mcr"))
            .collect();
        region_paths.sort();
        if let Some(n) = sample_region_files {
            region_paths.truncate(n);
        }

        for path in region_paths {
            let Some(coord) = parse_region_coord(&path) else {
                continue;
            };
            let mut region = match RegionFile::open(coord, &path, false) {
                Ok(r) => r,
                Err(err) => {
                    corrupt_chunks.push(CorruptSlot {
                        region_path: path,
                        fault: RegionFault::File,
                        error: err.to_string(),
                    });
                    continue;
                }
            };

            for lz in 0..32u8 {
                for lx in 0..32u8 {
                    if !region.has(lx, lz) {
                        continue;
                    }
                    let result = region.read(lx, lz).and_then(|bytes| {
                        let bytes = bytes.expect("has() just confirmed this slot is populated");
                        chunk_codec::decode(&bytes).map(|_| ())
                    });
                    if let Err(err) = result {
                        corrupt_chunks.push(CorruptSlot {
                            region_path: region.path().to_path_buf(),
                            fault: RegionFault::Slot { lx, lz },
                            error: err.to_string(),
                        });
                    }
                }
            }
        }
    }

    Ok(ValidationReport {
        world_dat_error,
        player_dat_error,
        entities_dat_error,
        corrupt_chunks,
    })
}

fn parse_region_coord(path: &Path) -> Option<RegionCoord> {
    let stem = path.file_name()?.to_str()?;
    let mut parts = stem.split('.');
    if parts.next()? != "r" {
        return None;
    }
    let rx: i32 = parts.next()?.parse().ok()?;
    let rz: i32 = parts.next()?.parse().ok()?;
    Some(RegionCoord { rx, rz })
}

/// What [`recover`] actually did.
#[derive(Debug, Clone)]
pub enum RecoveryOutcome {
    /// A backup validated and was restored over the world directory.
    RestoredFromBackup(PathBuf),
    /// No usable backup; corrupted pieces were individually removed so the
    /// host application regenerates or re-creates them.
    PartialRecovery {
        removed_player: bool,
        removed_entities: bool,
        removed_chunks: usize,
        removed_region_files: usize,
    },
    /// The world was already healthy; nothing was done.
    NothingToDo,
}

/// Recovery, ranked non-destructive first: restore the most recent backup
/// that itself validates (trying up to two older ones on failure), and only
/// if none validate, fall back to deleting the individually corrupted
/// pieces the report identified. Never regenerates from seed or resets to
/// defaults.
pub fn recover(world_dir: &Path, backups_dir: &Path, world_name: &str) -> StorageResult<RecoveryOutcome> {
    let report = validate_world(world_dir, None)?;
    if report.is_healthy() {
        return Ok(RecoveryOutcome::NothingToDo);
    }

    let candidates = backup::list_backups(backups_dir, world_name)?;
    for candidate in candidates.into_iter().take(3) {
        let candidate_report = validate_world(&candidate, None)?;
        if candidate_report.is_healthy() {
            backup::restore_backup(&candidate, world_dir)?;
            return Ok(RecoveryOutcome::RestoredFromBackup(candidate));
        }
    }

    let mut removed_player = false;
    if report.player_dat_error.is_some() {
        let path = world_dir.join("player.dat");
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| crate::error::StorageError::io(&path, e))?;
            removed_player = true;
        }
    }

    let mut removed_entities = false;
    if report.entities_dat_error.is_some() {
        let path = world_dir.join("entities.dat");
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| crate::error::StorageError::io(&path, e))?;
            removed_entities = true;
        }
    }

    let mut removed_chunks = 0usize;
    let mut removed_region_files = 0usize;
    for slot in &report.corrupt_chunks {
        let Some(coord) = parse_region_coord(&slot.region_path) else {
            continue;
        };
        match slot.fault {
            RegionFault::Slot { lx, lz } => {
                let mut region = match RegionFile::open(coord, &slot.region_path, false) {
                    Ok(region) => region,
                    Err(err) => {
                        tracing::warn!(path = %slot.region_path.display(), %err, "region file unopenable during recovery, leaving this slot alone");
                        continue;
                    }
                };
                if let Err(err) = region.remove(lx, lz) {
                    tracing::warn!(path = %slot.region_path.display(), lx, lz, %err, "failed to remove corrupt slot during recovery");
                    continue;
                }
                removed_chunks += 1;
            }
            RegionFault::File => {
                if slot.region_path.exists() {
                    match std::fs::remove_file(&slot.region_path) {
                        Ok(()) => removed_region_files += 1,
                        Err(err) => {
                            tracing::warn!(path = %slot.region_path.display(), %err, "failed to remove unopenable region file during recovery");
                        }
                    }
                }
            }
        }
    }

    Ok(RecoveryOutcome::PartialRecovery {
        removed_player,
        removed_entities,
        removed_chunks,
        removed_region_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stonebreak_world::{BlockId, Chunk, LocalBlockPos};

    fn write_world_dat(dir: &Path) {
        WorldMetadata::new("Testworld", 1, 0).save(&dir.join("world.dat")).unwrap();
    }

    #[test]
    fn healthy_world_validates_clean() {
        let dir = tempfile::tempdir().unwrap();
        write_world_dat(dir.path());
        let report = validate_world(dir.path(), None).unwrap();
        assert!(report.is_healthy());
    }

    #[test]
    fn missing_world_dat_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let report = validate_world(dir.path(), None).unwrap();
        assert!(report.world_dat_error.is_some());
        assert!(!report.is_healthy());
    }

    #[test]
    fn corrupt_chunk_slot_is_flagged_and_partial_recovery_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        write_world_dat(dir.path());
        let regions_dir = dir.path().join("regions");
        std::fs::create_dir_all(&regions_dir).unwrap();

        let coord = RegionCoord { rx: 0, rz: 0 };
        let path = regions_dir.join("r.0.0.mcr");
        {
            let mut region = RegionFile::open(coord, &path, true).unwrap();
            let mut chunk = Chunk::new(1, 1);
            chunk.set_block(LocalBlockPos::new(0, 0, 0), BlockId::new(3));
            let payload = chunk_codec::encode(&chunk).unwrap();
            region.write(1, 1, &payload).unwrap();

            let mut garbage = vec![0xFFu8; 64];
            garbage[0] = 0; // keep the length prefix small but the body is junk
            region.write(2, 2, &garbage).unwrap();
        }

        let report = validate_world(dir.path(), None).unwrap();
        assert_eq!(report.corrupt_chunks.len(), 1);
        assert!(matches!(report.corrupt_chunks[0].fault, RegionFault::Slot { lx: 2, lz: 2 }));

        let backups_dir = dir.path().join("backups");
        let outcome = recover(dir.path(), &backups_dir, "Testworld").unwrap();
        match outcome {
            RecoveryOutcome::PartialRecovery {
                removed_chunks,
                removed_region_files,
                ..
            } => {
                assert_eq!(removed_chunks, 1);
                assert_eq!(removed_region_files, 0);
            }
            other => panic!("expected partial recovery, got {other:?}"),
        }

        let mut region = RegionFile::open(coord, &path, false).unwrap();
        assert!(region.has(1, 1));
        assert!(!region.has(2, 2));
    }

    #[test]
    fn unopenable_region_file_does_not_abort_recovery_of_other_pieces() {
        let dir = tempfile::tempdir().unwrap();
        write_world_dat(dir.path());
        let regions_dir = dir.path().join("regions");
        std::fs::create_dir_all(&regions_dir).unwrap();

        // One region file too short to even hold a header -- this fails to
        // open at all, not just a single slot within it.
        let broken_path = regions_dir.join("r.0.0.mcr");
        std::fs::write(&broken_path, vec![0u8; 16]).unwrap();

        // A second, otherwise healthy region file with one corrupt slot.
        let good_coord = RegionCoord { rx: 1, rz: 0 };
        let good_path = regions_dir.join("r.1.0.mcr");
        {
            let mut region = RegionFile::open(good_coord, &good_path, true).unwrap();
            let mut garbage = vec![0xFFu8; 64];
            garbage[0] = 0;
            region.write(5, 5, &garbage).unwrap();
        }

        let report = validate_world(dir.path(), None).unwrap();
        assert_eq!(report.corrupt_chunks.len(), 2);

        let backups_dir = dir.path().join("backups");
        let outcome = recover(dir.path(), &backups_dir, "Testworld").unwrap();
        match outcome {
            RecoveryOutcome::PartialRecovery {
                removed_chunks,
                removed_region_files,
                ..
            } => {
                assert_eq!(removed_chunks, 1);
                assert_eq!(removed_region_files, 1);
            }
            other => panic!("expected partial recovery, got {other:?}"),
        }

        assert!(!broken_path.exists());
        let mut region = RegionFile::open(good_coord, &good_path, false).unwrap();
        assert!(!region.has(5, 5));
    }

    #[test]
    fn healthy_world_recovers_to_nothing_to_do() {
        let dir = tempfile::tempdir().unwrap();
        write_world_dat(dir.path());
        let backups_dir = dir.path().join("backups");
        let outcome = recover(dir.path(), &backups_dir, "Testworld").unwrap();
        assert!(matches!(outcome, RecoveryOutcome::NothingToDo));
    }
}
