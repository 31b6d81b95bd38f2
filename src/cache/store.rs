// Durable object store for cache entries.
// Path-addressed byte storage: one file per entry, written atomically via a temp file.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

use tempfile::NamedTempFile;

use crate::error::Result;

/// Check if an entry file exists.
pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Get the modification time of an entry file.
pub fn modified_at(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// Create a directory and all of its parents. Succeeds if it already exists.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Read a whole entry file.
pub fn read_bytes(path: &Path) -> io::Result<Vec<u8>> {
    fs::read(path)
}

/// Write bytes to `path`, replacing any existing file.
///
/// The payload goes to a temporary file in the same directory first and is
/// renamed into place, so readers see either the old entry or the new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// Delete an entry file. A missing file is not an error.
pub fn delete(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Delete every entry file directly inside `dir`, keeping the directory itself.
///
/// Dot-files are left alone: they are temp files of writes still in flight.
/// Returns the number of files removed. A missing directory removes nothing.
pub fn clear_dir(dir: &Path) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if entry.file_type()?.is_file() {
            delete(&entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("entry");

        write_atomic(&path, b"payload").unwrap();

        assert!(exists(&path));
        assert_eq!(read_bytes(&path).unwrap(), b"payload");
    }

    #[test]
    fn test_write_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("entry");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(read_bytes(&path).unwrap(), b"second");
        // No temp files left behind next to the entry
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing");

        assert!(delete(&path).is_ok());
    }

    #[test]
    fn test_ensure_dir_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("a").join("b");

        ensure_dir(&dir).unwrap();
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_clear_dir() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("ns");

        write_atomic(&dir.join("one"), b"1").unwrap();
        write_atomic(&dir.join("two"), b"2").unwrap();

        assert_eq!(clear_dir(&dir).unwrap(), 2);
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);

        assert_eq!(clear_dir(&temp_dir.path().join("absent")).unwrap(), 0);
    }

    #[test]
    fn test_clear_dir_keeps_in_flight_writes() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("ns");
        write_atomic(&dir.join("entry"), b"1").unwrap();

        let mut pending = NamedTempFile::new_in(&dir).unwrap();
        pending.write_all(b"2").unwrap();

        assert_eq!(clear_dir(&dir).unwrap(), 1);
        assert!(pending.path().exists());

        let target = dir.join("other");
        pending.persist(&target).unwrap();
        assert_eq!(read_bytes(&target).unwrap(), b"2");
    }

    #[test]
    fn test_modified_at_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(modified_at(&temp_dir.path().join("nope")).is_err());
    }
}
