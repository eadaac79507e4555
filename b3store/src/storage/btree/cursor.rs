//! Ordered traversal over the leaf thread.
//!
//! A `Cursor` is positional state only: the leaf it is on, where it is in
//! that leaf, and the tree generation it was created at. Every step fetches
//! the leaf through the node cache. Inserts and deletes bump the tree
//! generation, and a cursor created before such a change fails with
//! `CursorInvalidated` on its next step instead of returning stale data.
//!
//! `Keys` and `Entries` wrap a cursor together with a borrow of the tree,
//! so the tree cannot change underneath them.

use crate::error::StoreError;
use crate::storage::btree::node::LeafEntry;
use crate::storage::btree::tree::BTree;
use crate::storage::io::PageIo;
use crate::storage::page::{NO_PAGE, Offset};

/// Iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending key order.
    Forward,
    /// Descending key order.
    Reverse,
}

/// Position in the leaf thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    leaf: Offset,
    /// Forward: index of the next entry to yield.
    /// Reverse: number of entries left in the leaf; `None` means all of them.
    pos: Option<usize>,
    direction: Direction,
    generation: u64,
    done: bool,
}

impl Cursor {
    /// Position a cursor at the first key in `direction`.
    pub fn start<I: PageIo>(tree: &mut BTree<I>, direction: Direction) -> Result<Self, StoreError> {
        let (leaf, pos) = match direction {
            Direction::Forward => (tree.leftmost_leaf()?, Some(0)),
            Direction::Reverse => (tree.rightmost_leaf()?, None),
        };
        Ok(Self {
            leaf,
            pos,
            direction,
            generation: tree.generation(),
            done: false,
        })
    }

    /// Position a cursor at `key`.
    ///
    /// Forward cursors start at the first key `>= key`; reverse cursors
    /// start at the last key `<= key`.
    pub fn seek<I: PageIo>(
        tree: &mut BTree<I>,
        key: &[u8],
        direction: Direction,
    ) -> Result<Self, StoreError> {
        let leaf = tree.find_leaf(key)?;
        let index = tree.leaf(leaf)?.find_index(key);
        let pos = match (direction, index) {
            (Direction::Forward, Ok(i) | Err(i)) | (Direction::Reverse, Err(i)) => i,
            (Direction::Reverse, Ok(i)) => i + 1,
        };
        Ok(Self {
            leaf,
            pos: Some(pos),
            direction,
            generation: tree.generation(),
            done: false,
        })
    }

    /// Tree generation the cursor was created at.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the cursor has run off the end.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Yield the next key.
    pub fn next_key<I: PageIo>(
        &mut self,
        tree: &mut BTree<I>,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.advance(tree, |entry| entry.key.clone())
    }

    /// Yield the next key and its value.
    pub fn next_entry<I: PageIo>(
        &mut self,
        tree: &mut BTree<I>,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.advance(tree, |entry| (entry.key.clone(), entry.value.clone()))
    }

    fn advance<I: PageIo, T>(
        &mut self,
        tree: &mut BTree<I>,
        read: impl Fn(&LeafEntry) -> T,
    ) -> Result<Option<T>, StoreError> {
        if tree.generation() != self.generation {
            return Err(StoreError::CursorInvalidated {
                created: self.generation,
                current: tree.generation(),
            });
        }

        let item = loop {
            if self.done {
                return Ok(None);
            }

            let leaf = tree.leaf(self.leaf)?;
            let len = leaf.entries.len();
            match self.direction {
                Direction::Forward => {
                    let pos = self.pos.unwrap_or(0);
                    if let Some(entry) = leaf.entries.get(pos) {
                        self.pos = Some(pos + 1);
                        break read(entry);
                    }
                    if leaf.next_leaf == NO_PAGE {
                        self.done = true;
                    } else {
                        self.leaf = leaf.next_leaf;
                        self.pos = Some(0);
                    }
                }
                Direction::Reverse => {
                    let remaining = self.pos.map_or(len, |p| p.min(len));
                    if remaining > 0 {
                        self.pos = Some(remaining - 1);
                        break read(&leaf.entries[remaining - 1]);
                    }
                    if leaf.prev_leaf == NO_PAGE {
                        self.done = true;
                    } else {
                        self.leaf = leaf.prev_leaf;
                        self.pos = None;
                    }
                }
            }
        };

        tree.trim_cache();
        Ok(Some(item))
    }
}

/// Iterator over keys, yielding `Err` at most once and then stopping.
pub struct Keys<'a, I: PageIo> {
    tree: &'a mut BTree<I>,
    cursor: Option<Cursor>,
}

impl<'a, I: PageIo> Keys<'a, I> {
    pub(crate) const fn new(tree: &'a mut BTree<I>, cursor: Cursor) -> Self {
        Self {
            tree,
            cursor: Some(cursor),
        }
    }
}

impl<I: PageIo> Iterator for Keys<'_, I> {
    type Item = Result<Vec<u8>, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        match cursor.next_key(self.tree) {
            Ok(Some(key)) => Some(Ok(key)),
            Ok(None) => {
                self.cursor = None;
                None
            }
            Err(e) => {
                self.cursor = None;
                Some(Err(e))
            }
        }
    }
}

impl<I: PageIo> std::iter::FusedIterator for Keys<'_, I> {}

/// Iterator over key/value pairs, yielding `Err` at most once and then
/// stopping.
pub struct Entries<'a, I: PageIo> {
    tree: &'a mut BTree<I>,
    cursor: Option<Cursor>,
}

impl<'a, I: PageIo> Entries<'a, I> {
    pub(crate) const fn new(tree: &'a mut BTree<I>, cursor: Cursor) -> Self {
        Self {
            tree,
            cursor: Some(cursor),
        }
    }
}

impl<I: PageIo> Iterator for Entries<'_, I> {
    type Item = Result<(Vec<u8>, Vec<u8>), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        match cursor.next_entry(self.tree) {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.cursor = None;
                None
            }
            Err(e) => {
                self.cursor = None;
                Some(Err(e))
            }
        }
    }
}

impl<I: PageIo> std::iter::FusedIterator for Entries<'_, I> {}
