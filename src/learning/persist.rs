//! Atomic file replacement shared by the buffer store and the model registry
//!
//! Content goes to a uniquely named sibling temp file, is synced, then renamed
//! over the target. Readers see the old file or the new one, never a prefix.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{LifecycleError, LifecycleResult};

/// Replace `path` with `bytes` in one rename
pub fn atomic_write(path: &Path, bytes: &[u8]) -> LifecycleResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| LifecycleError::io("creating directory", parent, e))?;

    let tmp = temp_sibling(path);
    let result = write_synced(&tmp, bytes).and_then(|_| {
        fs::rename(&tmp, path).map_err(|e| LifecycleError::io("publishing", path, e))
    });

    if result.is_err() {
        // Leave no stray temp file behind; the target is untouched
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_synced(tmp: &Path, bytes: &[u8]) -> LifecycleResult<()> {
    let mut file = File::create(tmp).map_err(|e| LifecycleError::io("creating", tmp, e))?;
    file.write_all(bytes)
        .map_err(|e| LifecycleError::io("writing", tmp, e))?;
    file.sync_all()
        .map_err(|e| LifecycleError::io("syncing", tmp, e))?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_creates_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("model.json");

        atomic_write(&path, b"first").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"first");

        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");

        // Only the target remains in the directory
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_failed_write_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.csv");
        atomic_write(&path, b"header\n").unwrap();

        // A directory at the target makes the rename fail
        let blocked = dir.path().join("blocked");
        fs::create_dir_all(blocked.join("inner")).unwrap();
        assert!(atomic_write(&blocked, b"data").is_err());

        assert_eq!(fs::read(&path).unwrap(), b"header\n");
        assert!(blocked.join("inner").exists());
    }
}
