//! Staging area for a single tree mutation.
//!
//! A mutation checks nodes out of the cache into the workspace, edits them
//! in place, and either commits (nodes go back to the cache, dirty) or
//! aborts (original nodes go back exactly as they were, page allocations and
//! releases are undone). An undo image of a node is taken the first time it
//! is borrowed mutably, so read-only visits cost nothing.
//!
//! Only loading a node can fail. Commit and abort are infallible, so a
//! failed `set` or `delete` never leaves a half-applied change behind.

use std::collections::HashMap;

use crate::error::StoreError;
use crate::storage::btree::node::{InternalNode, LeafNode, Node, NodeError};
use crate::storage::cache::NodeCache;
use crate::storage::io::PageIo;
use crate::storage::layout::Geometry;
use crate::storage::page::Offset;
use crate::storage::pager::{Allocation, PageStore};
use crate::storage::stats::TreeStats;

/// In-memory tree metadata, persisted in the header on flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeMeta {
    pub root: Offset,
    pub height: u64,
    pub key_count: u64,
    pub stats: TreeStats,
}

#[derive(Debug)]
struct Staged {
    node: Node,
    /// Node as checked out, taken on first mutable borrow.
    before: Option<Node>,
    /// Dirty flag the node had in the cache.
    was_dirty: bool,
    /// Created by this mutation.
    created: bool,
    /// Page released by this mutation.
    released: bool,
}

#[derive(Debug, Clone, Copy)]
enum PageOp {
    Allocated(Allocation),
    Released(Offset),
}

/// Nodes and metadata touched by one in-flight mutation.
pub struct Workspace<'a, I: PageIo> {
    cache: &'a mut NodeCache,
    pager: &'a mut PageStore<I>,
    /// Working copy of the tree metadata.
    pub meta: TreeMeta,
    staged: HashMap<Offset, Staged>,
    ops: Vec<PageOp>,
}

impl<'a, I: PageIo> Workspace<'a, I> {
    /// Start a mutation from the committed `meta`.
    pub fn new(cache: &'a mut NodeCache, pager: &'a mut PageStore<I>, meta: TreeMeta) -> Self {
        Self {
            cache,
            pager,
            meta,
            staged: HashMap::new(),
            ops: Vec::new(),
        }
    }

    /// Tree geometry.
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        *self.pager.geometry()
    }

    fn stage(&mut self, offset: Offset) -> Result<&mut Staged, StoreError> {
        if !self.staged.contains_key(&offset) {
            let (node, was_dirty) = self.cache.checkout(offset, self.pager)?;
            self.staged.insert(
                offset,
                Staged {
                    node,
                    before: None,
                    was_dirty,
                    created: false,
                    released: false,
                },
            );
        }
        self.staged
            .get_mut(&offset)
            .ok_or(StoreError::InvalidOffset(offset))
    }

    /// Borrow the node at `offset`, checking it out if needed.
    pub fn node(&mut self, offset: Offset) -> Result<&Node, StoreError> {
        Ok(&self.stage(offset)?.node)
    }

    /// Borrow the node at `offset` mutably, recording an undo image.
    pub fn node_mut(&mut self, offset: Offset) -> Result<&mut Node, StoreError> {
        let staged = self.stage(offset)?;
        if staged.before.is_none() && !staged.created {
            staged.before = Some(staged.node.clone());
        }
        Ok(&mut staged.node)
    }

    /// Borrow a leaf mutably.
    pub fn leaf_mut(&mut self, offset: Offset) -> Result<&mut LeafNode, StoreError> {
        match self.node_mut(offset)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(wrong_type(offset)),
        }
    }

    /// Borrow an internal node.
    pub fn internal(&mut self, offset: Offset) -> Result<&InternalNode, StoreError> {
        match self.node(offset)? {
            Node::Internal(node) => Ok(node),
            Node::Leaf(_) => Err(wrong_type(offset)),
        }
    }

    /// Borrow an internal node mutably.
    pub fn internal_mut(&mut self, offset: Offset) -> Result<&mut InternalNode, StoreError> {
        match self.node_mut(offset)? {
            Node::Internal(node) => Ok(node),
            Node::Leaf(_) => Err(wrong_type(offset)),
        }
    }

    /// Allocate a page for a new node.
    pub fn create(&mut self, node: Node) -> Offset {
        let allocation = self.pager.allocate();
        self.ops.push(PageOp::Allocated(allocation));
        self.insert_created(allocation.offset, node);
        allocation.offset
    }

    /// Place a new node on a specific free page.
    pub fn create_at(&mut self, offset: Offset, node: Node) -> Result<(), StoreError> {
        if !self.pager.take_free(offset) {
            return Err(StoreError::InvalidOffset(offset));
        }
        self.ops.push(PageOp::Allocated(Allocation {
            offset,
            fresh: false,
        }));
        self.insert_created(offset, node);
        Ok(())
    }

    fn insert_created(&mut self, offset: Offset, node: Node) {
        self.staged.insert(
            offset,
            Staged {
                node,
                before: None,
                was_dirty: false,
                created: true,
                released: false,
            },
        );
    }

    /// Release the page of a node that is no longer part of the tree.
    pub fn release(&mut self, offset: Offset) -> Result<(), StoreError> {
        self.stage(offset)?.released = true;
        self.pager.release(offset);
        self.ops.push(PageOp::Released(offset));
        Ok(())
    }

    /// Return every staged node to the cache and hand back the new metadata.
    pub fn commit(self) -> TreeMeta {
        for (offset, staged) in self.staged {
            if staged.released {
                self.cache.discard(offset);
            } else {
                let modified = staged.created || staged.before.is_some();
                self.cache.put(offset, staged.node, staged.was_dirty);
                if modified {
                    self.cache.mark_dirty(offset);
                }
            }
        }
        self.meta
    }

    /// Undo every change and return the original nodes to the cache.
    pub fn abort(self) {
        for op in self.ops.iter().rev() {
            match *op {
                PageOp::Allocated(allocation) => self.pager.unallocate(allocation),
                PageOp::Released(offset) => self.pager.unrelease(offset),
            }
        }

        for (offset, staged) in self.staged {
            if staged.created {
                continue;
            }
            let node = staged.before.unwrap_or(staged.node);
            self.cache.put(offset, node, staged.was_dirty);
        }
    }
}

const fn wrong_type(offset: Offset) -> StoreError {
    StoreError::CorruptPage {
        offset,
        source: NodeError::WrongNodeType,
    }
}
