//! Page store: node page I/O, allocation and the free list.
//!
//! Node pages follow the header back to back, so page `i` lives at
//! `HEADER_SIZE + i * page_size`. Reclaimed pages form a singly linked free
//! list threaded through the pages themselves, with its head in the header.
//!
//! The free list is mirrored in memory as a stack (`free`, head last).
//! Allocation and release only touch the mirror; free pages, the file
//! length and the header are written by `flush_free_list`, `sync_len` and
//! `write_header` when the store is flushed.

// Page counts fit in usize on every supported target.
#![allow(clippy::cast_possible_truncation)]

use tracing::debug;

use crate::error::StoreError;
use crate::storage::btree::Node;
use crate::storage::header::{HEADER_SIZE, HeaderError, TreeHeader};
use crate::storage::io::PageIo;
use crate::storage::layout::{Geometry, NEXT_FREE_OFFSET};
use crate::storage::page::{NO_PAGE, Offset, Page, PageType};

/// Result of `PageStore::allocate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Offset of the allocated page.
    pub offset: Offset,
    /// True if the file grew, false if the page came off the free list.
    pub fresh: bool,
}

/// Page-granular access to the store file.
pub struct PageStore<I: PageIo> {
    io: I,
    geometry: Geometry,
    page_size: u64,
    /// Node pages in the file, live or free.
    page_count: u64,
    /// Free list, head last.
    free: Vec<Offset>,
    /// Free list changed since the last flush.
    free_dirty: bool,
    shrink_threshold: f64,
}

impl<I: PageIo> PageStore<I> {
    /// Create a page store over an empty file.
    pub fn new(io: I, geometry: Geometry, shrink_threshold: f64) -> Self {
        Self {
            io,
            geometry,
            page_size: geometry.page_size() as u64,
            page_count: 0,
            free: Vec::new(),
            free_dirty: false,
            shrink_threshold,
        }
    }

    /// Read and parse the header of an existing file.
    pub fn read_header(io: &mut I) -> Result<TreeHeader, StoreError> {
        let size = io.size()?;
        if size < HEADER_SIZE as u64 {
            return Err(HeaderError::Truncated(size as usize).into());
        }
        let mut page = Page::new(HEADER_SIZE);
        io.read_at(0, page.as_bytes_mut())?;
        Ok(TreeHeader::from_page(&page)?)
    }

    /// Attach to an existing file described by `header`, loading the free list.
    pub fn load(io: I, header: &TreeHeader, shrink_threshold: f64) -> Result<Self, StoreError> {
        let mut store = Self::new(io, header.geometry, shrink_threshold);
        store.page_count = header.page_count;

        let mut chain = Vec::new();
        let mut offset = header.free_head;
        while offset != NO_PAGE {
            if !store.is_page_offset(offset) || chain.len() as u64 >= store.page_count {
                return Err(StoreError::CorruptFreeList { offset });
            }
            let page = store.read_page(offset)?;
            match page.verify() {
                Ok(h) if h.page_type == PageType::Free => {}
                _ => return Err(StoreError::CorruptFreeList { offset }),
            }
            chain.push(offset);
            offset = page.read_u64(NEXT_FREE_OFFSET);
        }

        if chain.len() as u64 != header.free_count {
            return Err(StoreError::CorruptFreeList {
                offset: header.free_head,
            });
        }

        // The chain runs head to tail; the stack keeps the head last.
        chain.reverse();
        store.free = chain;
        Ok(store)
    }

    /// Store geometry.
    #[must_use]
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Size of a node page in bytes.
    #[must_use]
    pub const fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Node pages in the file, live or free.
    #[must_use]
    pub const fn page_count(&self) -> u64 {
        self.page_count
    }

    /// Pages on the free list.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn free_pages(&self) -> u64 {
        self.free.len() as u64
    }

    /// Pages holding live nodes.
    #[must_use]
    pub fn live_pages(&self) -> u64 {
        self.page_count - self.free_pages()
    }

    /// Current free-list head, or `NO_PAGE`.
    #[must_use]
    pub fn free_head(&self) -> Offset {
        self.free.last().copied().unwrap_or(NO_PAGE)
    }

    /// Whether `offset` is on the free list.
    #[must_use]
    pub fn is_free(&self, offset: Offset) -> bool {
        self.free.contains(&offset)
    }

    /// Free-list offsets, head first.
    pub fn free_list(&self) -> impl Iterator<Item = Offset> + '_ {
        self.free.iter().rev().copied()
    }

    /// File offset of page `index`.
    #[must_use]
    pub const fn offset_of(&self, index: u64) -> Offset {
        HEADER_SIZE as u64 + index * self.page_size
    }

    /// Whether `offset` addresses the start of a page inside the file.
    #[must_use]
    pub const fn is_page_offset(&self, offset: Offset) -> bool {
        let base = HEADER_SIZE as u64;
        offset >= base
            && (offset - base) % self.page_size == 0
            && (offset - base) / self.page_size < self.page_count
    }

    /// Allocate a page, reusing the free-list head if there is one.
    pub fn allocate(&mut self) -> Allocation {
        if let Some(offset) = self.free.pop() {
            self.free_dirty = true;
            return Allocation {
                offset,
                fresh: false,
            };
        }

        let offset = self.offset_of(self.page_count);
        self.page_count += 1;
        Allocation {
            offset,
            fresh: true,
        }
    }

    /// Reverse an allocation. Allocations must be undone newest first.
    pub fn unallocate(&mut self, allocation: Allocation) {
        if allocation.fresh {
            self.page_count -= 1;
        } else {
            self.free.push(allocation.offset);
            self.free_dirty = true;
        }
    }

    /// Push a page onto the free list.
    pub fn release(&mut self, offset: Offset) {
        self.free.push(offset);
        self.free_dirty = true;
    }

    /// Reverse the most recent `release`.
    pub fn unrelease(&mut self, offset: Offset) {
        if let Some(pos) = self.free.iter().rposition(|&o| o == offset) {
            self.free.remove(pos);
            self.free_dirty = true;
        }
    }

    /// Remove a specific page from the free list.
    ///
    /// Returns false if the page was not free.
    pub fn take_free(&mut self, offset: Offset) -> bool {
        match self.free.iter().position(|&o| o == offset) {
            Some(pos) => {
                self.free.remove(pos);
                self.free_dirty = true;
                true
            }
            None => false,
        }
    }

    /// Lowest free page offset.
    #[must_use]
    pub fn lowest_free(&self) -> Option<Offset> {
        self.free.iter().copied().min()
    }

    /// Offset of the last page in the file.
    #[must_use]
    pub const fn last_page(&self) -> Option<Offset> {
        if self.page_count == 0 {
            None
        } else {
            Some(self.offset_of(self.page_count - 1))
        }
    }

    fn read_page(&mut self, offset: Offset) -> Result<Page, StoreError> {
        if !self.is_page_offset(offset) {
            return Err(StoreError::InvalidOffset(offset));
        }
        let mut page = Page::new(self.page_size as usize);
        self.io.read_at(offset, page.as_bytes_mut())?;
        Ok(page)
    }

    /// Read and decode the node at `offset`.
    pub fn read_node(&mut self, offset: Offset) -> Result<Node, StoreError> {
        let page = self.read_page(offset)?;
        Node::from_page(&page, &self.geometry)
            .map_err(|source| StoreError::CorruptPage { offset, source })
    }

    /// Encode and write the node at `offset`.
    pub fn write_node(&mut self, offset: Offset, node: &Node) -> Result<(), StoreError> {
        if !self.is_page_offset(offset) {
            return Err(StoreError::InvalidOffset(offset));
        }
        let page = node.to_page(&self.geometry);
        self.io.write_at(offset, page.as_bytes())?;
        Ok(())
    }

    /// Free-page ratio.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn free_ratio(&self) -> f64 {
        if self.page_count == 0 {
            return 0.0;
        }
        self.free.len() as f64 / self.page_count as f64
    }

    /// Drop trailing free pages from the end of the file.
    ///
    /// Sorts the free list so the pages at the end of the file can be cut
    /// off, and leaves the lowest offsets at the head so later allocations
    /// fill holes near the front. Returns the number of pages removed.
    pub fn shrink(&mut self) -> u64 {
        self.free.sort_unstable();

        let mut removed = 0;
        while self.page_count > 0 && self.free.last() == Some(&self.offset_of(self.page_count - 1))
        {
            self.free.pop();
            self.page_count -= 1;
            removed += 1;
        }

        self.free.reverse();
        self.free_dirty = true;

        if removed > 0 {
            debug!(
                removed,
                pages = self.page_count,
                free = self.free.len(),
                "Shrank store file"
            );
        }
        removed
    }

    /// Shrink if the free-page ratio exceeds the configured threshold.
    pub fn shrink_if_needed(&mut self) -> u64 {
        if self.free_ratio() > self.shrink_threshold {
            self.shrink()
        } else {
            0
        }
    }

    /// Write the free list chain to the free pages themselves.
    pub fn flush_free_list(&mut self) -> Result<(), StoreError> {
        if !self.free_dirty {
            return Ok(());
        }

        for i in 0..self.free.len() {
            let next = if i == 0 { NO_PAGE } else { self.free[i - 1] };
            let offset = self.free[i];

            let mut page = Page::new(self.page_size as usize);
            page.write_u64(NEXT_FREE_OFFSET, next);
            page.seal(PageType::Free);
            self.io.write_at(offset, page.as_bytes())?;
        }

        self.free_dirty = false;
        Ok(())
    }

    /// Set the file length to exactly cover the header and every page.
    pub fn sync_len(&mut self) -> Result<(), StoreError> {
        let len = self.offset_of(self.page_count);
        if self.io.size()? != len {
            self.io.set_len(len)?;
        }
        Ok(())
    }

    /// Write the tree header.
    pub fn write_header(&mut self, header: &TreeHeader) -> Result<(), StoreError> {
        self.io.write_at(0, header.to_page().as_bytes())?;
        Ok(())
    }

    /// Make all previous writes durable.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.io.sync()?;
        Ok(())
    }
}
