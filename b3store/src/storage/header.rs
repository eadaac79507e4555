//! Tree header structure and serialization.
//!
//! The header occupies the first `HEADER_SIZE` bytes of the file and holds
//! the geometry, the root and free-list pointers, and the persisted
//! statistics. Node pages start right after it.

// Geometry limits keep every size field well inside u32.
#![allow(clippy::cast_possible_truncation)]

use crate::storage::layout::Geometry;
use crate::storage::page::{NO_PAGE, Offset, Page};
use crate::storage::stats::TreeStats;

/// Magic number identifying a store file: "B3BTREE\0"
pub const MAGIC: [u8; 8] = *b"B3BTREE\0";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the header region in bytes.
pub const HEADER_SIZE: usize = 256;

/// Header field offsets.
mod offsets {
    pub const MAGIC: usize = 0;
    pub const FORMAT_VERSION: usize = 8;
    pub const KEY_SIZE: usize = 12;
    pub const VALUE_SIZE: usize = 16;
    pub const ORDER: usize = 20;
    pub const PAGE_SIZE: usize = 24;
    // 28-31: reserved
    pub const ROOT: usize = 32;
    pub const FREE_HEAD: usize = 40;
    pub const FREE_COUNT: usize = 48;
    pub const PAGE_COUNT: usize = 56;
    pub const KEY_COUNT: usize = 64;
    pub const HEIGHT: usize = 72;
    pub const SPLITS: usize = 80;
    pub const MERGES: usize = 88;
    pub const ROTATIONS_LEFT: usize = 96;
    pub const ROTATIONS_RIGHT: usize = 104;
    pub const CACHE_HITS: usize = 112;
    pub const CACHE_MISSES: usize = 120;
    // 128-251: reserved
    pub const CHECKSUM: usize = 252;
}

/// Persistent tree metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHeader {
    /// Order and slot sizes, fixed at creation.
    pub geometry: Geometry,
    /// Root node offset.
    pub root: Offset,
    /// Head of the free page list.
    pub free_head: Offset,
    /// Number of pages on the free list.
    pub free_count: u64,
    /// Number of node pages in the file, live or free.
    pub page_count: u64,
    /// Number of live keys.
    pub key_count: u64,
    /// Tree height.
    pub height: u64,
    /// Persisted counters.
    pub stats: TreeStats,
}

impl TreeHeader {
    /// Header for a freshly created tree whose root leaf is the first page.
    #[must_use]
    pub const fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            root: HEADER_SIZE as Offset,
            free_head: NO_PAGE,
            free_count: 0,
            page_count: 1,
            key_count: 0,
            height: 1,
            stats: TreeStats {
                splits: 0,
                merges: 0,
                rotations_left: 0,
                rotations_right: 0,
                cache_hits: 0,
                cache_misses: 0,
            },
        }
    }

    /// Serialize the header to a `HEADER_SIZE` page.
    #[must_use]
    pub fn to_page(&self) -> Page {
        let mut page = Page::new(HEADER_SIZE);

        page.write_bytes(offsets::MAGIC, &MAGIC);
        page.write_u32(offsets::FORMAT_VERSION, FORMAT_VERSION);
        page.write_u32(offsets::KEY_SIZE, self.geometry.key_size() as u32);
        page.write_u32(offsets::VALUE_SIZE, self.geometry.value_size() as u32);
        page.write_u32(offsets::ORDER, self.geometry.order() as u32);
        page.write_u32(offsets::PAGE_SIZE, self.geometry.page_size() as u32);
        page.write_u64(offsets::ROOT, self.root);
        page.write_u64(offsets::FREE_HEAD, self.free_head);
        page.write_u64(offsets::FREE_COUNT, self.free_count);
        page.write_u64(offsets::PAGE_COUNT, self.page_count);
        page.write_u64(offsets::KEY_COUNT, self.key_count);
        page.write_u64(offsets::HEIGHT, self.height);
        page.write_u64(offsets::SPLITS, self.stats.splits);
        page.write_u64(offsets::MERGES, self.stats.merges);
        page.write_u64(offsets::ROTATIONS_LEFT, self.stats.rotations_left);
        page.write_u64(offsets::ROTATIONS_RIGHT, self.stats.rotations_right);
        page.write_u64(offsets::CACHE_HITS, self.stats.cache_hits);
        page.write_u64(offsets::CACHE_MISSES, self.stats.cache_misses);

        let checksum = crc32fast::hash(page.read_bytes(0, offsets::CHECKSUM));
        page.write_u32(offsets::CHECKSUM, checksum);

        page
    }

    /// Deserialize a header from a page.
    pub fn from_page(page: &Page) -> Result<Self, HeaderError> {
        if page.len() < HEADER_SIZE {
            return Err(HeaderError::Truncated(page.len()));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(page.read_bytes(offsets::MAGIC, 8));
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagic(magic));
        }

        let format_version = page.read_u32(offsets::FORMAT_VERSION);
        if format_version != FORMAT_VERSION {
            return Err(HeaderError::UnsupportedVersion(format_version));
        }

        let expected = page.read_u32(offsets::CHECKSUM);
        let actual = crc32fast::hash(page.read_bytes(0, offsets::CHECKSUM));
        if expected != actual {
            return Err(HeaderError::ChecksumMismatch { expected, actual });
        }

        let geometry = Geometry::new(
            page.read_u32(offsets::ORDER) as usize,
            page.read_u32(offsets::KEY_SIZE) as usize,
            page.read_u32(offsets::VALUE_SIZE) as usize,
        )
        .map_err(|e| HeaderError::InvalidGeometry(e.to_string()))?;

        let page_size = page.read_u32(offsets::PAGE_SIZE) as usize;
        if page_size != geometry.page_size() {
            return Err(HeaderError::InvalidGeometry(format!(
                "page size {page_size} does not match geometry ({} expected)",
                geometry.page_size()
            )));
        }

        Ok(Self {
            geometry,
            root: page.read_u64(offsets::ROOT),
            free_head: page.read_u64(offsets::FREE_HEAD),
            free_count: page.read_u64(offsets::FREE_COUNT),
            page_count: page.read_u64(offsets::PAGE_COUNT),
            key_count: page.read_u64(offsets::KEY_COUNT),
            height: page.read_u64(offsets::HEIGHT),
            stats: TreeStats {
                splits: page.read_u64(offsets::SPLITS),
                merges: page.read_u64(offsets::MERGES),
                rotations_left: page.read_u64(offsets::ROTATIONS_LEFT),
                rotations_right: page.read_u64(offsets::ROTATIONS_RIGHT),
                cache_hits: page.read_u64(offsets::CACHE_HITS),
                cache_misses: page.read_u64(offsets::CACHE_MISSES),
            },
        })
    }
}

/// Errors that can occur when reading a tree header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// Invalid magic number.
    InvalidMagic([u8; 8]),
    /// Unsupported format version.
    UnsupportedVersion(u32),
    /// Header checksum mismatch.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// Stored geometry is out of range or inconsistent.
    InvalidGeometry(String),
    /// File is shorter than the header.
    Truncated(usize),
}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMagic(magic) => {
                write!(
                    f,
                    "invalid magic number: {:?}",
                    String::from_utf8_lossy(magic)
                )
            }
            Self::UnsupportedVersion(v) => write!(f, "unsupported format version: {v}"),
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "header checksum mismatch: expected {expected}, got {actual}")
            }
            Self::InvalidGeometry(msg) => write!(f, "invalid geometry: {msg}"),
            Self::Truncated(len) => {
                write!(f, "header truncated: {len} of {HEADER_SIZE} bytes")
            }
        }
    }
}

impl std::error::Error for HeaderError {}
