//! Byte-level I/O abstraction for the store file.
//!
//! The pager addresses the file by byte offset, so the abstraction is a
//! positioned read/write interface rather than a page interface. This keeps
//! the real file and the simulated in-memory image interchangeable: the
//! engine runs against `FileIo` in production and against
//! `simulation::SimulatedIo` in tests, where faults can be injected and
//! crashes replayed.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error.
    Io(std::io::Error),
    /// Fewer bytes were available than requested.
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },
    /// Injected fault for simulation.
    InjectedFault(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::ShortRead {
                offset,
                expected,
                actual,
            } => write!(
                f,
                "short read at offset {offset}: expected {expected} bytes, got {actual}"
            ),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Positioned byte I/O over the backing store.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `read_at` fills the whole buffer or fails with `ShortRead`
/// - `write_at` past the current end extends the store
/// - `set_len` truncates or zero-extends
/// - `sync` makes all previous writes and length changes durable
pub trait PageIo {
    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Write all of `buf` starting at `offset`.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError>;

    /// Current size of the store in bytes.
    fn size(&self) -> Result<u64, StorageError>;

    /// Truncate or extend the store to `len` bytes.
    fn set_len(&mut self, len: u64) -> Result<(), StorageError>;

    /// Make all previous writes durable.
    fn sync(&mut self) -> Result<(), StorageError>;
}

/// A store file on the local file system.
#[derive(Debug)]
pub struct FileIo {
    file: File,
    path: PathBuf,
}

impl FileIo {
    /// Open the file at `path`, creating an empty one if it does not exist.
    ///
    /// Existing content is never truncated; the caller decides whether it
    /// holds a compatible store.
    pub fn create(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing file.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PageIo for FileIo {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        self.file.seek(SeekFrom::Start(offset))?;
        match self.file.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                let len = self.size()?;
                let available = usize::try_from(len.saturating_sub(offset)).unwrap_or(usize::MAX);
                Err(StorageError::ShortRead {
                    offset,
                    expected: buf.len(),
                    actual: available.min(buf.len()),
                })
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.file.metadata()?.len())
    }

    fn set_len(&mut self, len: u64) -> Result<(), StorageError> {
        self.file.set_len(len)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.file.sync_all()?;
        Ok(())
    }
}
