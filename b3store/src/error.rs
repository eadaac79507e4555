//! Errors returned by the store.

use crate::config::ConfigError;
use crate::storage::btree::{ConsistencyViolation, NodeError};
use crate::storage::{Geometry, HeaderError, Offset, StorageError};

/// Errors that can occur during store operations.
#[derive(Debug)]
pub enum StoreError {
    /// The key is not present.
    KeyNotFound(Vec<u8>),
    /// The key is longer than the configured key size.
    KeyTooLarge { len: usize, max: usize },
    /// The value is longer than the configured value size.
    ValueTooLarge { len: usize, max: usize },
    /// The tree header could not be parsed.
    CorruptHeader(HeaderError),
    /// The file holds a store with a different geometry.
    IncompatibleHeader { expected: Geometry, found: Geometry },
    /// A node page failed to decode.
    CorruptPage { offset: Offset, source: NodeError },
    /// The free list is malformed (bad link or cycle).
    CorruptFreeList { offset: Offset },
    /// A page offset does not address a page in the file.
    InvalidOffset(Offset),
    /// Backing storage failure.
    Io(StorageError),
    /// Invalid configuration.
    InvalidConfig(ConfigError),
    /// The tree was modified after the cursor was created.
    CursorInvalidated { created: u64, current: u64 },
    /// The consistency check run at open found defects.
    Inconsistent(Vec<ConsistencyViolation>),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyNotFound(key) => write!(f, "key not found: {key:02x?}"),
            Self::KeyTooLarge { len, max } => {
                write!(f, "key too large: {len} bytes (max {max})")
            }
            Self::ValueTooLarge { len, max } => {
                write!(f, "value too large: {len} bytes (max {max})")
            }
            Self::CorruptHeader(e) => write!(f, "corrupt header: {e}"),
            Self::IncompatibleHeader { expected, found } => write!(
                f,
                "incompatible store: expected order {} key size {} value size {}, \
                 found order {} key size {} value size {}",
                expected.order(),
                expected.key_size(),
                expected.value_size(),
                found.order(),
                found.key_size(),
                found.value_size()
            ),
            Self::CorruptPage { offset, source } => {
                write!(f, "corrupt page at offset {offset}: {source}")
            }
            Self::CorruptFreeList { offset } => {
                write!(f, "corrupt free list at offset {offset}")
            }
            Self::InvalidOffset(offset) => write!(f, "invalid page offset {offset}"),
            Self::Io(e) => write!(f, "storage error: {e}"),
            Self::InvalidConfig(e) => write!(f, "invalid configuration: {e}"),
            Self::CursorInvalidated { created, current } => write!(
                f,
                "cursor invalidated: created at generation {created}, tree is at {current}"
            ),
            Self::Inconsistent(violations) => {
                write!(f, "store is inconsistent ({} violations)", violations.len())?;
                if let Some(first) = violations.first() {
                    write!(f, ": {first}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CorruptHeader(e) => Some(e),
            Self::CorruptPage { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            Self::InvalidConfig(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for StoreError {
    fn from(e: StorageError) -> Self {
        Self::Io(e)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(StorageError::Io(e))
    }
}

impl From<HeaderError> for StoreError {
    fn from(e: HeaderError) -> Self {
        Self::CorruptHeader(e)
    }
}

impl From<ConfigError> for StoreError {
    fn from(e: ConfigError) -> Self {
        Self::InvalidConfig(e)
    }
}
