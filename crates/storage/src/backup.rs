//! On-demand world snapshots.
//!
//! A backup is a plain recursive copy under
//! `backups/<world>_<yyyy-MM-dd_HH-MM-SS>/`, preserving the source's
//! directory structure. Region files are copied whole, so a backup owns its
//! own sectors and never references the source's.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{StorageError, StorageResult};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Snapshot `world_dir` into `backups_dir/<world_name>_<timestamp>/`.
/// Returns the path to the new backup directory.
pub fn create_backup(world_dir: &Path, backups_dir: &Path, world_name: &str) -> StorageResult<PathBuf> {
    let stamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
    let dest = backups_dir.join(format!("{world_name}_{stamp}"));
    copy_dir_all(world_dir, &dest)?;
    Ok(dest)
}

/// Restore `backup_dir` over `world_dir`, overwriting whatever is there.
pub fn restore_backup(backup_dir: &Path, world_dir: &Path) -> StorageResult<()> {
    copy_dir_all(backup_dir, world_dir)
}

/// Every backup directory for `world_name` under `backups_dir`, most recent
/// first. The timestamp format sorts lexicographically, so a plain
/// descending name sort is also a descending time sort.
pub fn list_backups(backups_dir: &Path, world_name: &str) -> StorageResult<Vec<PathBuf>> {
    if !backups_dir.is_dir() {
        return Ok(Vec::new());
    }
    let prefix = format!("{world_name}_");
    let mut backups: Vec<PathBuf> = std::fs::read_dir(backups_dir)
        .map_err(|e| StorageError::io(backups_dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();
    backups.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    Ok(backups)
}

fn copy_dir_all(src: &Path, dst: &Path) -> StorageResult<()> {
    std::fs::create_dir_all(dst).map_err(|e| StorageError::io(dst, e))?;
    for entry in std::fs::read_dir(src).map_err(|e| StorageError::io(src, e))? {
        let entry = entry.map_err(|e| StorageError::io(src, e))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| StorageError::io(&src_path, e))?;
        if file_type.is_dir() {
            copy_dir_all(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path).map_err(|e| StorageError::io(&src_path, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_preserves_directory_structure() {
        let root = tempfile::tempdir().unwrap();
        let world_dir = root.path().join("worlds/Ashwood");
        std::fs::create_dir_all(world_dir.join("regions")).unwrap();
        std::fs::write(world_dir.join("world.dat"), b"meta").unwrap();
        std::fs::write(world_dir.join("regions/r.0.0.mcr"), vec![0u8; 8192]).unwrap();

        let backups_dir = root.path().join("backups");
        let backup_path = create_backup(&world_dir, &backups_dir, "Ashwood").unwrap();

        assert!(backup_path.join("world.dat").exists());
        assert!(backup_path.join("regions/r.0.0.mcr").exists());
        assert_eq!(std::fs::read(backup_path.join("world.dat")).unwrap(), b"meta");
    }

    #[test]
    fn list_backups_filters_by_world_name_and_sorts_newest_first() {
        let backups_dir = tempfile::tempdir().unwrap();
        for name in ["Ashwood_2026-01-01_00-00-00", "Ashwood_2026-06-01_00-00-00", "Other_2026-03-01_00-00-00"] {
            std::fs::create_dir_all(backups_dir.path().join(name)).unwrap();
        }

        let found = list_backups(backups_dir.path(), "Ashwood").unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("Ashwood_2026-06-01_00-00-00"));
        assert!(found[1].ends_with("Ashwood_2026-01-01_00-00-00"));
    }

    #[test]
    fn restore_backup_overwrites_world_directory() {
        let root = tempfile::tempdir().unwrap();
        let world_dir = root.path().join("world");
        std::fs::create_dir_all(&world_dir).unwrap();
        std::fs::write(world_dir.join("world.dat"), b"corrupted").unwrap();

        let backup_dir = root.path().join("backup");
        std::fs::create_dir_all(&backup_dir).unwrap();
        std::fs::write(backup_dir.join("world.dat"), b"good").unwrap();

        restore_backup(&backup_dir, &world_dir).unwrap();
        assert_eq!(std::fs::read(world_dir.join("world.dat")).unwrap(), b"good");
    }
}
