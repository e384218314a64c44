//! Small-file primitives for the store directory.
//!
//! Writes go to a temporary sibling, are synced, then renamed over the
//! target, so a reader sees either the old content or the new content.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::error::{StorageResult, StoreError};

/// Reads `path`, returning `None` if it does not exist.
pub fn read_optional(path: &Path) -> StorageResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StoreError::io(format!("read {}", path.display()), err)),
    }
}

/// Atomically replaces the content of `path` with `bytes`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let tmp = temp_sibling(path);
    let result = write_and_sync(&tmp, bytes)
        .and_then(|()| fs::rename(&tmp, path))
        .and_then(|()| sync_parent(path));
    if let Err(err) = result {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(format!("write {}", path.display()), err));
    }
    Ok(())
}

/// Removes `path`; a missing file is not an error.
pub fn remove_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => sync_parent(path)
            .map_err(|err| StoreError::io(format!("sync after removing {}", path.display()), err)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StoreError::io(format!("remove {}", path.display()), err)),
    }
}

/// Lists the regular files in `dir` whose extension is `extension`.
pub fn list_with_extension(dir: &Path, extension: &str) -> StorageResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|err| StoreError::io(format!("list {}", dir.display()), err))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|err| StoreError::io(format!("list {}", dir.display()), err))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Persists a rename or unlink in `path`'s directory.
#[cfg(unix)]
pub fn sync_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) => File::open(parent)?.sync_all(),
        None => Ok(()),
    }
}

/// Directory handles cannot be synced on this platform; renames are
/// already durable once `MoveFileEx` returns.
#[cfg(not(unix))]
pub fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_remove() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("record.bin");

        assert!(read_optional(&path).expect("read").is_none());
        write_atomic(&path, b"first").expect("write");
        write_atomic(&path, b"second").expect("overwrite");
        assert_eq!(read_optional(&path).expect("read"), Some(b"second".to_vec()));

        remove_if_exists(&path).expect("remove");
        remove_if_exists(&path).expect("remove twice");
        assert!(read_optional(&path).expect("read").is_none());
    }

    #[test]
    fn test_list_ignores_temp_files_and_other_extensions() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_atomic(&dir.path().join("b.bin"), b"b").expect("write");
        write_atomic(&dir.path().join("a.bin"), b"a").expect("write");
        write_atomic(&dir.path().join("notes.txt"), b"x").expect("write");
        fs::write(dir.path().join(".c.bin.123.tmp"), b"partial").expect("write");

        let names: Vec<_> = list_with_extension(dir.path(), "bin")
            .expect("list")
            .into_iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["a.bin", "b.bin"]);
    }
}
