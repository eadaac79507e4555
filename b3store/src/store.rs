//! The key/value store: a B-tree in a single file.
//!
//! `Store` owns the tree, its node cache and the backing file. Changes are
//! write-back: they reach the file on `flush`, on `close`, or (best effort)
//! when the store is dropped, and not before. A crash between flushes leaves
//! the previously flushed store intact.

use std::path::Path;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::storage::btree::{BTree, ConsistencyViolation, Cursor, Direction, Entries, Keys};
use crate::storage::{FileIo, Geometry, PageIo, PageStore, StatsSnapshot};

/// A persistent ordered map from byte keys to byte values.
pub struct Store<I: PageIo = FileIo> {
    tree: BTree<I>,
    config: StoreConfig,
    closed: bool,
}

impl Store<FileIo> {
    /// Create a store at `path`.
    ///
    /// If the file already holds a store with the same geometry, it is
    /// opened instead. A store with a different geometry fails with
    /// `IncompatibleHeader`.
    pub fn create(path: &Path, config: StoreConfig) -> Result<Self, StoreError> {
        let io = FileIo::create(path)?;
        let store = Self::create_with_io(io, config)?;
        tracing::info!("Store ready at '{}'", path.display());
        Ok(store)
    }

    /// Open an existing store at `path`.
    ///
    /// The geometry comes from the file; only the runtime settings of
    /// `config` apply.
    pub fn open(path: &Path, config: StoreConfig) -> Result<Self, StoreError> {
        let io = FileIo::open(path)?;
        let store = Self::open_with_io(io, config)?;
        tracing::info!("Opened store at '{}'", path.display());
        Ok(store)
    }
}

impl<I: PageIo> Store<I> {
    /// Create a store over `io`. Non-empty storage is opened if its
    /// geometry matches `config`.
    pub fn create_with_io(mut io: I, config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let geometry = config.geometry()?;

        if io.size()? > 0 {
            let header = PageStore::read_header(&mut io)?;
            if header.geometry != geometry {
                return Err(StoreError::IncompatibleHeader {
                    expected: geometry,
                    found: header.geometry,
                });
            }
            return Self::open_with_io(io, config);
        }

        let pager = PageStore::new(io, geometry, config.shrink_threshold);
        let tree = BTree::create(pager, config.cache_capacity)?;
        tracing::info!(
            "Created store: order {}, key size {}, value size {}, page size {}",
            geometry.order(),
            geometry.key_size(),
            geometry.value_size(),
            geometry.page_size()
        );

        Ok(Self {
            tree,
            config,
            closed: false,
        })
    }

    /// Open the store held in `io`. The geometry comes from the header, so
    /// only the runtime settings of `config` are used.
    pub fn open_with_io(mut io: I, config: StoreConfig) -> Result<Self, StoreError> {
        config.validate_runtime()?;
        let header = PageStore::read_header(&mut io)?;
        let pager = PageStore::load(io, &header, config.shrink_threshold)?;
        let mut tree = BTree::open(pager, &header, config.cache_capacity);

        if config.verify_on_open {
            let violations = tree.check();
            if !violations.is_empty() {
                tracing::warn!(
                    "Consistency check failed with {} violations",
                    violations.len()
                );
                return Err(StoreError::Inconsistent(violations));
            }
        }

        tracing::info!(
            "Opened store: {} keys, height {}, {} pages ({} free)",
            header.key_count,
            header.height,
            header.page_count,
            header.free_count
        );

        Ok(Self {
            tree,
            config,
            closed: false,
        })
    }

    /// Geometry fixed at creation.
    #[must_use]
    pub const fn geometry(&self) -> &Geometry {
        self.tree.geometry()
    }

    /// Configuration the store was opened with.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Look up `key`, failing with `KeyNotFound` if it is absent.
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.tree
            .get(key)?
            .ok_or_else(|| StoreError::KeyNotFound(key.to_vec()))
    }

    /// Whether `key` is present.
    pub fn contains(&mut self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.tree.get(key)?.is_some())
    }

    /// Insert `key` or overwrite its value. Returns the previous value.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.tree.insert(key, value)
    }

    /// Remove `key`, returning its value.
    pub fn delete(&mut self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.tree.delete(key)
    }

    /// Number of keys.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.tree.len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Keys in `direction` order.
    pub fn iter(&mut self, direction: Direction) -> Result<Keys<'_, I>, StoreError> {
        let cursor = Cursor::start(&mut self.tree, direction)?;
        Ok(Keys::new(&mut self.tree, cursor))
    }

    /// Key/value pairs in `direction` order.
    pub fn entries(&mut self, direction: Direction) -> Result<Entries<'_, I>, StoreError> {
        let cursor = Cursor::start(&mut self.tree, direction)?;
        Ok(Entries::new(&mut self.tree, cursor))
    }

    /// Keys from `key` onwards: `>= key` going forward, `<= key` in reverse.
    pub fn range_from(
        &mut self,
        key: &[u8],
        direction: Direction,
    ) -> Result<Keys<'_, I>, StoreError> {
        let cursor = Cursor::seek(&mut self.tree, key, direction)?;
        Ok(Keys::new(&mut self.tree, cursor))
    }

    /// A detached cursor at the first key in `direction`.
    ///
    /// Unlike `iter`, the cursor does not borrow the store. Any insert or
    /// delete made after it is created makes its next step fail with
    /// `CursorInvalidated`.
    pub fn cursor(&mut self, direction: Direction) -> Result<Cursor, StoreError> {
        Cursor::start(&mut self.tree, direction)
    }

    /// A detached cursor positioned at `key`.
    pub fn cursor_at(&mut self, key: &[u8], direction: Direction) -> Result<Cursor, StoreError> {
        Cursor::seek(&mut self.tree, key, direction)
    }

    /// Advance `cursor`, returning the next key.
    pub fn cursor_next(&mut self, cursor: &mut Cursor) -> Result<Option<Vec<u8>>, StoreError> {
        cursor.next_key(&mut self.tree)
    }

    /// Advance `cursor`, returning the next key and its value.
    pub fn cursor_next_entry(
        &mut self,
        cursor: &mut Cursor,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        cursor.next_entry(&mut self.tree)
    }

    /// Run the full consistency checker. An empty list means consistent.
    pub fn check_consistency(&mut self) -> Vec<ConsistencyViolation> {
        self.tree.check()
    }

    /// Counters and sizes.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.tree.stats()
    }

    /// Write every change to the file and sync it.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.tree.flush()
    }

    /// Relocate pages to fill free holes and truncate the file.
    /// Returns the number of pages removed.
    pub fn compact(&mut self) -> Result<u64, StoreError> {
        self.tree.compact()
    }

    /// Flush and close the store.
    pub fn close(mut self) -> Result<(), StoreError> {
        self.tree.flush()?;
        self.closed = true;
        tracing::info!("Closed store with {} keys", self.tree.len());
        Ok(())
    }
}

impl<I: PageIo> Drop for Store<I> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.tree.flush() {
            tracing::warn!("Failed to flush store on drop: {e}");
        }
    }
}
