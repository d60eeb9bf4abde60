//! Crash-atomic single-file writes, shared by `WorldMetadata` and
//! `PlayerState` (C6).

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::{StorageError, StorageResult};

/// Write `bytes` to `path` atomically: write to a sibling `.tmp` file, fsync
/// it, rename over the target (the linearization point), then best-effort
/// fsync the parent directory so the rename survives a crash on platforms
/// where it isn't automatically durable.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let tmp_path = path.with_extension(tmp_extension(path));

    {
        let mut tmp = File::create(&tmp_path).map_err(|e| StorageError::io(&tmp_path, e))?;
        tmp.write_all(bytes).map_err(|e| StorageError::io(&tmp_path, e))?;
        tmp.sync_all().map_err(|e| StorageError::io(&tmp_path, e))?;
    }

    std::fs::rename(&tmp_path, path).map_err(|e| StorageError::io(path, e))?;

    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

fn tmp_extension(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.tmp"),
        None => "tmp".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.dat");
        atomic_write(&path, b"hello").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert!(!dir.path().join("world.dat.tmp").exists());
    }

    #[test]
    fn original_survives_if_only_tmp_was_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.dat");
        std::fs::write(&path, b"original").unwrap();

        // Simulate a crash between the temp write and the rename: the
        // rename never happens, the original stays as-is.
        let tmp_path = path.with_extension("dat.tmp");
        std::fs::write(&tmp_path, b"partial-new-content").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"original");
    }
}
