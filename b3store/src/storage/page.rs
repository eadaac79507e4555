//! Page buffers and the common page header.
//!
//! Node pages have a fixed size for a given store, but that size is derived
//! from the store geometry (order, key size, value size), so unlike the
//! header it is not a compile-time constant.

use std::ops::Range;

/// A byte offset into the store file.
///
/// Offset 0 is occupied by the tree header, so it doubles as the "no page"
/// sentinel in child pointers, leaf thread links and the free list.
pub type Offset = u64;

/// Sentinel offset meaning "no page".
pub const NO_PAGE: Offset = 0;

/// What a page holds, stored in its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    Internal = 0x01,
    Leaf = 0x02,
    /// On the free list; the body holds the next free offset.
    Free = 0x03,
}

impl TryFrom<u8> for PageType {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, u8> {
        [Self::Internal, Self::Leaf, Self::Free]
            .into_iter()
            .find(|t| *t as u8 == tag)
            .ok_or(tag)
    }
}

/// The 8-byte header at the start of every node and free page:
///
/// ```text
/// 0    1          2          6          8
/// +----+----------+----------+----------+
/// |type| reserved | crc32    | reserved |
/// +----+----------+----------+----------+
/// ```
///
/// The checksum covers the whole page except its own four bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub page_type: PageType,
    pub checksum: u32,
}

impl PageHeader {
    pub const SIZE: usize = 8;
    const TYPE_OFFSET: usize = 0;
    const CHECKSUM: Range<usize> = 2..6;
}

/// An owned page-sized byte buffer with little-endian field accessors.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    data: Vec<u8>,
}

impl Page {
    /// A zeroed page of `size` bytes.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Buffer for `PageIo::read_at` to fill.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[must_use]
    pub fn read_bytes(&self, at: usize, len: usize) -> &[u8] {
        &self.data[at..at + len]
    }

    pub fn write_bytes(&mut self, at: usize, bytes: &[u8]) {
        self.data[at..at + bytes.len()].copy_from_slice(bytes);
    }

    #[must_use]
    pub fn read_u8(&self, at: usize) -> u8 {
        self.data[at]
    }

    pub fn write_u8(&mut self, at: usize, value: u8) {
        self.data[at] = value;
    }

    #[must_use]
    pub fn read_u16(&self, at: usize) -> u16 {
        u16::from_le_bytes(self.fixed(at))
    }

    pub fn write_u16(&mut self, at: usize, value: u16) {
        self.write_bytes(at, &value.to_le_bytes());
    }

    #[must_use]
    pub fn read_u32(&self, at: usize) -> u32 {
        u32::from_le_bytes(self.fixed(at))
    }

    pub fn write_u32(&mut self, at: usize, value: u32) {
        self.write_bytes(at, &value.to_le_bytes());
    }

    #[must_use]
    pub fn read_u64(&self, at: usize) -> u64 {
        u64::from_le_bytes(self.fixed(at))
    }

    pub fn write_u64(&mut self, at: usize, value: u64) {
        self.write_bytes(at, &value.to_le_bytes());
    }

    fn fixed<const N: usize>(&self, at: usize) -> [u8; N] {
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.data[at..at + N]);
        buf
    }

    /// CRC32 of everything but the checksum field.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        let field = PageHeader::CHECKSUM;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.data[..field.start]);
        hasher.update(&self.data[field.end..]);
        hasher.finalize()
    }

    /// Stamp the page type and checksum. Call after the body is final.
    pub fn seal(&mut self, page_type: PageType) {
        self.data[..PageHeader::SIZE].fill(0);
        self.write_u8(PageHeader::TYPE_OFFSET, page_type as u8);
        let checksum = self.checksum();
        self.write_u32(PageHeader::CHECKSUM.start, checksum);
    }

    /// Check the checksum and parse the header.
    pub fn verify(&self) -> Result<PageHeader, PageError> {
        if self.data.len() < PageHeader::SIZE {
            return Err(PageError::WrongSize {
                expected: PageHeader::SIZE,
                actual: self.data.len(),
            });
        }

        let page_type = PageType::try_from(self.read_u8(PageHeader::TYPE_OFFSET))
            .map_err(PageError::InvalidPageType)?;
        let stored = self.read_u32(PageHeader::CHECKSUM.start);
        let computed = self.checksum();
        if stored != computed {
            return Err(PageError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        Ok(PageHeader {
            page_type,
            checksum: stored,
        })
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let head = &self.data[..self.data.len().min(PageHeader::SIZE)];
        f.debug_struct("Page")
            .field("len", &self.data.len())
            .field("header", &head)
            .finish_non_exhaustive()
    }
}

/// A page that cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    InvalidPageType(u8),
    ChecksumMismatch { expected: u32, actual: u32 },
    WrongSize { expected: usize, actual: usize },
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPageType(tag) => write!(f, "unknown page type tag 0x{tag:02x}"),
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "page checksum {actual:#010x} does not match stored {expected:#010x}")
            }
            Self::WrongSize { expected, actual } => {
                write!(f, "page is {actual} bytes, expected {expected}")
            }
        }
    }
}

impl std::error::Error for PageError {}
