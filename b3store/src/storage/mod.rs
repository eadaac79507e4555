//! Single-file B-tree storage engine.
//!
//! # File Format
//!
//! - Bytes `0..256`: tree header (geometry, root and free-list pointers,
//!   key count, height, statistics)
//! - Then fixed-size node pages, back to back. Page size follows from the
//!   order, key size and value size fixed at creation.
//!
//! Offset 0 never addresses a node page, so it doubles as the "no page"
//! sentinel in child pointers, leaf links and the free list.
//!
//! # Layers
//!
//! - `io`: positioned reads and writes (`PageIo`, `FileIo`)
//! - `pager`: page allocation, the free list, node page I/O
//! - `cache`: write-back LRU cache of decoded nodes
//! - `btree`: the tree algorithms, cursors and the consistency checker

pub mod btree;
mod cache;
mod header;
mod io;
mod layout;
mod page;
mod pager;
mod stats;

pub use cache::NodeCache;
pub use header::{FORMAT_VERSION, HEADER_SIZE, HeaderError, MAGIC, TreeHeader};
pub use io::{FileIo, PageIo, StorageError};
pub use layout::{
    Geometry, MAX_KEY_SIZE, MAX_ORDER, MAX_VALUE_SIZE, MIN_KEY_SIZE, MIN_ORDER, MIN_VALUE_SIZE,
};
pub use page::{NO_PAGE, Offset, Page, PageError, PageHeader, PageType};
pub use pager::{Allocation, PageStore};
pub use stats::{StatsSnapshot, TreeStats};
