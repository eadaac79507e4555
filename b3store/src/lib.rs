//! A disk-resident ordered key/value store backed by a B+ tree.
//!
//! Life of an operation:
//! 1. `Store` validates the key and value against the store geometry
//! 2. The tree descends from the root, fetching nodes through the LRU node
//!    cache (misses read and decode a page through the page store)
//! 3. Mutations are staged in a workspace, rebalanced (split, rotate,
//!    merge) and committed back into the cache as dirty nodes
//! 4. Dirty nodes stay pinned in the cache until `flush` writes them; the
//!    free list and header follow, then the file is synced. Between flushes
//!    the file holds the last flushed tree untouched
//!
//! ```no_run
//! use std::path::Path;
//! use b3store::{Direction, Store, StoreConfig};
//!
//! # fn main() -> Result<(), b3store::StoreError> {
//! let mut store = Store::create(Path::new("data.b3"), StoreConfig::default())?;
//! store.set(b"hello", b"world")?;
//! assert_eq!(store.get(b"hello")?, b"world");
//!
//! for key in store.iter(Direction::Forward)? {
//!     println!("{:?}", key?);
//! }
//! store.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod simulation;
pub mod storage;
mod store;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, StoreConfig};
pub use error::StoreError;
pub use storage::btree::{ConsistencyViolation, Cursor, Direction, Entries, Keys};
pub use storage::{FileIo, Geometry, PageIo, StatsSnapshot, StorageError};
pub use store::Store;
