//! Tree statistics.

/// Counters persisted in the tree header.
///
/// Zeroed when a store is created, loaded from the header when it is
/// opened, and written back on every flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Node splits (leaf and internal).
    pub splits: u64,
    /// Node merges. Root collapse is not counted.
    pub merges: u64,
    /// Borrows from a right sibling (a key moves left).
    pub rotations_left: u64,
    /// Borrows from a left sibling (a key moves right).
    pub rotations_right: u64,
    /// Node cache hits.
    pub cache_hits: u64,
    /// Node cache misses.
    pub cache_misses: u64,
}

/// Read-only view of the tree state returned by `Store::stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub splits: u64,
    pub merges: u64,
    pub rotations_left: u64,
    pub rotations_right: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Number of live keys.
    pub keys: u64,
    /// Tree height; a lone root leaf has height 1.
    pub height: u64,
    /// Node pages reachable from the root.
    pub nodes: u64,
    /// Node pages in the file, live or free.
    pub pages: u64,
    /// Pages on the free list.
    pub free_pages: u64,
}

impl StatsSnapshot {
    /// Total number of rotations in either direction.
    #[must_use]
    pub const fn rotations(&self) -> u64 {
        self.rotations_left + self.rotations_right
    }

    /// Fraction of node lookups served from the cache.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }
}
