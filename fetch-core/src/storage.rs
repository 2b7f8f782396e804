/// Persistent artifact store
/// On the device the filesystem root is the SPIFFS mount point

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

use crate::error::StorageError;

/// Open handle being filled with downloaded bytes
pub trait ArtifactWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), StorageError>;

    /// Flush and release the handle
    fn close(self) -> Result<(), StorageError>;
}

/// Open handle used to re-read an artifact for verification
pub trait ArtifactReader {
    /// Read up to `buf.len()` bytes; 0 means exhausted
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError>;

    fn has_more(&self) -> bool;
}

pub trait StorageSink {
    type Writer: ArtifactWriter;
    type Reader: ArtifactReader;

    /// Confirm the backing store is mounted and usable
    fn check(&self) -> Result<(), StorageError>;

    fn exists(&self, path: &str) -> bool;

    fn remove(&mut self, path: &str) -> Result<(), StorageError>;

    /// Create or truncate `path` for writing
    fn open_write(&mut self, path: &str) -> Result<Self::Writer, StorageError>;

    fn open_read(&self, path: &str) -> Result<Self::Reader, StorageError>;
}

/// `std::fs` store rooted at a base directory
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl StorageSink for FsStorage {
    type Writer = FsWriter;
    type Reader = FsReader;

    fn check(&self) -> Result<(), StorageError> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::Unavailable(format!("{} is not a directory", self.root.display()))),
            Err(e) => Err(StorageError::Unavailable(format!("{}: {}", self.root.display(), e))),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        fs::remove_file(self.resolve(path)).map_err(|e| StorageError::Remove {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    fn open_write(&mut self, path: &str) -> Result<FsWriter, StorageError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.resolve(path))
            .map_err(|e| StorageError::OpenWrite { path: path.to_string(), reason: e.to_string() })?;
        Ok(FsWriter { file, path: path.to_string() })
    }

    fn open_read(&self, path: &str) -> Result<FsReader, StorageError> {
        let open_err = |e: std::io::Error| StorageError::OpenRead {
            path: path.to_string(),
            reason: e.to_string(),
        };
        let file = File::open(self.resolve(path)).map_err(open_err)?;
        let remaining = file.metadata().map_err(open_err)?.len();
        Ok(FsReader { file, path: path.to_string(), remaining })
    }
}

pub struct FsWriter {
    file: File,
    path: String,
}

impl ArtifactWriter for FsWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        self.file.write_all(bytes).map_err(|e| StorageError::Write {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn close(mut self) -> Result<(), StorageError> {
        self.file.flush().map_err(|e| StorageError::Write {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}

pub struct FsReader {
    file: File,
    path: String,
    remaining: u64,
}

impl ArtifactReader for FsReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let n = self.file.read(buf).map_err(|e| StorageError::Read {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        self.remaining = if n == 0 { 0 } else { self.remaining.saturating_sub(n as u64) };
        Ok(n)
    }

    fn has_more(&self) -> bool {
        self.remaining > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FsStorage::new(dir.path());
        storage.check().unwrap();

        let mut writer = storage.open_write("/bootcode.bin").unwrap();
        writer.write(b"hello ").unwrap();
        writer.write(b"world").unwrap();
        writer.close().unwrap();

        assert!(storage.exists("/bootcode.bin"));
        let mut reader = storage.open_read("/bootcode.bin").unwrap();
        let mut buf = [0u8; 4];
        let mut out = Vec::new();
        while reader.has_more() {
            let n = reader.read(&mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_open_write_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FsStorage::new(dir.path());
        let mut writer = storage.open_write("/a.bin").unwrap();
        writer.write(&[1u8; 100]).unwrap();
        writer.close().unwrap();

        let writer = storage.open_write("/a.bin").unwrap();
        writer.close().unwrap();
        assert_eq!(fs::metadata(dir.path().join("a.bin")).unwrap().len(), 0);
    }

    #[test]
    fn test_remove_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FsStorage::new(dir.path());
        storage.open_write("/a.bin").unwrap().close().unwrap();
        storage.remove("/a.bin").unwrap();
        assert!(!storage.exists("/a.bin"));
        assert!(matches!(storage.open_read("/a.bin"), Err(StorageError::OpenRead { .. })));
        assert!(matches!(storage.remove("/a.bin"), Err(StorageError::Remove { .. })));
    }

    #[test]
    fn test_check_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path().join("not-mounted"));
        assert!(matches!(storage.check(), Err(StorageError::Unavailable(_))));
    }
}
