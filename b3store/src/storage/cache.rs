//! Write-back LRU cache of decoded nodes.
//!
//! Entries map a page offset to the decoded node, a dirty flag and a
//! recency tick. The recency queue is a `BTreeMap` from tick to offset, so
//! the least recently used entry is always the first key.
//!
//! Inserting never evicts. Callers stage nodes out of the cache while a
//! mutation is in flight and put them back afterwards, then call `trim` to
//! bring the cache back under capacity.
//!
//! Only clean entries are evicted. A dirty entry stays pinned until
//! `flush_all` writes it, so between flushes the file still holds the last
//! flushed tree exactly. While more than `capacity` nodes are dirty the
//! cache runs over capacity.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::error::StoreError;
use crate::storage::btree::Node;
use crate::storage::io::PageIo;
use crate::storage::page::Offset;
use crate::storage::pager::PageStore;

#[derive(Debug)]
struct CacheEntry {
    node: Node,
    dirty: bool,
    last_used: u64,
}

/// Bounded cache of decoded nodes keyed by page offset.
#[derive(Debug)]
pub struct NodeCache {
    entries: HashMap<Offset, CacheEntry>,
    recency: BTreeMap<u64, Offset>,
    tick: u64,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl NodeCache {
    /// Create an empty cache that trims back to `capacity` nodes when enough
    /// of them are clean.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
        }
    }

    /// Get the node at `offset`, reading it through `pager` on a miss.
    pub fn get<I: PageIo>(
        &mut self,
        offset: Offset,
        pager: &mut PageStore<I>,
    ) -> Result<&Node, StoreError> {
        let entry = match self.entries.entry(offset) {
            Entry::Occupied(occupied) => {
                self.hits += 1;
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => {
                self.misses += 1;
                let node = pager.read_node(offset)?;
                vacant.insert(CacheEntry {
                    node,
                    dirty: false,
                    last_used: 0,
                })
            }
        };

        self.tick += 1;
        self.recency.remove(&entry.last_used);
        entry.last_used = self.tick;
        self.recency.insert(self.tick, offset);

        Ok(&entry.node)
    }

    /// Get a copy of the node at `offset` without touching recency, counters
    /// or residency.
    pub fn read_through<I: PageIo>(
        &self,
        offset: Offset,
        pager: &mut PageStore<I>,
    ) -> Result<Node, StoreError> {
        match self.entries.get(&offset) {
            Some(entry) => Ok(entry.node.clone()),
            None => pager.read_node(offset),
        }
    }

    /// Take the node at `offset` out of the cache for exclusive use,
    /// reading it through `pager` on a miss. Returns the node and whether it
    /// was dirty.
    pub fn checkout<I: PageIo>(
        &mut self,
        offset: Offset,
        pager: &mut PageStore<I>,
    ) -> Result<(Node, bool), StoreError> {
        if let Some(taken) = self.take(offset) {
            self.hits += 1;
            return Ok(taken);
        }
        self.misses += 1;
        Ok((pager.read_node(offset)?, false))
    }

    /// Remove the node at `offset` from the cache, returning it with its
    /// dirty flag.
    pub fn take(&mut self, offset: Offset) -> Option<(Node, bool)> {
        let entry = self.entries.remove(&offset)?;
        self.recency.remove(&entry.last_used);
        Some((entry.node, entry.dirty))
    }

    /// Insert or replace the node at `offset` as the most recently used entry.
    pub fn put(&mut self, offset: Offset, node: Node, dirty: bool) {
        if let Some(old) = self.entries.remove(&offset) {
            self.recency.remove(&old.last_used);
        }
        self.tick += 1;
        self.recency.insert(self.tick, offset);
        self.entries.insert(
            offset,
            CacheEntry {
                node,
                dirty,
                last_used: self.tick,
            },
        );
    }

    /// Drop the entry at `offset` without writing it.
    ///
    /// Only valid for pages that no longer hold a live node.
    pub fn discard(&mut self, offset: Offset) {
        if let Some(entry) = self.entries.remove(&offset) {
            self.recency.remove(&entry.last_used);
        }
    }

    /// Flag the entry at `offset` for write-back.
    pub fn mark_dirty(&mut self, offset: Offset) -> bool {
        match self.entries.get_mut(&offset) {
            Some(entry) => {
                entry.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Whether the entry at `offset` is resident and dirty.
    #[must_use]
    pub fn is_dirty(&self, offset: Offset) -> bool {
        self.entries.get(&offset).is_some_and(|e| e.dirty)
    }

    /// Whether `offset` is resident.
    #[must_use]
    pub fn contains(&self, offset: Offset) -> bool {
        self.entries.contains_key(&offset)
    }

    /// Write the entry at `offset` if it is dirty.
    pub fn flush<I: PageIo>(
        &mut self,
        offset: Offset,
        pager: &mut PageStore<I>,
    ) -> Result<(), StoreError> {
        if let Some(entry) = self.entries.get_mut(&offset) {
            if entry.dirty {
                pager.write_node(offset, &entry.node)?;
                entry.dirty = false;
            }
        }
        Ok(())
    }

    /// Write every dirty entry in offset order. Returns the number written.
    pub fn flush_all<I: PageIo>(&mut self, pager: &mut PageStore<I>) -> Result<usize, StoreError> {
        let mut dirty: Vec<Offset> = self
            .entries
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(offset, _)| *offset)
            .collect();
        dirty.sort_unstable();

        for offset in &dirty {
            self.flush(*offset, pager)?;
        }
        Ok(dirty.len())
    }

    /// Evict least recently used clean entries until the cache is within
    /// capacity. Dirty entries are skipped.
    pub fn trim(&mut self) {
        let excess = self.entries.len().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }

        let victims: Vec<(u64, Offset)> = self
            .recency
            .iter()
            .filter(|(_, offset)| self.entries.get(offset).is_some_and(|e| !e.dirty))
            .take(excess)
            .map(|(&tick, &offset)| (tick, offset))
            .collect();

        for (tick, offset) in victims {
            self.recency.remove(&tick);
            self.entries.remove(&offset);
            trace!(offset, "Evicted node");
        }

        if self.entries.len() > self.capacity {
            trace!(
                resident = self.entries.len(),
                capacity = self.capacity,
                "Dirty nodes pinned over capacity"
            );
        }
    }

    /// Number of resident nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookups served from memory.
    #[must_use]
    pub const fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that had to read from the page store.
    #[must_use]
    pub const fn misses(&self) -> u64 {
        self.misses
    }

    /// Restore persisted hit/miss counters.
    pub const fn set_counters(&mut self, hits: u64, misses: u64) {
        self.hits = hits;
        self.misses = misses;
    }
}
