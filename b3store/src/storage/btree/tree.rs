//! Disk-based B+ tree.
//!
//! All values live in leaves; internal nodes hold separator copies used
//! only for routing. Leaves are threaded into a doubly linked list in key
//! order for iteration.
//!
//! Mutations run inside a `Workspace`: every node they touch is checked out
//! of the cache, edited, and committed back as a unit. If any step fails
//! (an unreadable page, a corrupt node) the workspace is aborted and the
//! tree is exactly as it was before the call.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::StoreError;
use crate::storage::btree::check::{ConsistencyViolation, check_tree};
use crate::storage::btree::node::{InternalNode, LeafNode, Node, NodeError};
use crate::storage::btree::workspace::{TreeMeta, Workspace};
use crate::storage::cache::NodeCache;
use crate::storage::header::TreeHeader;
use crate::storage::io::PageIo;
use crate::storage::layout::Geometry;
use crate::storage::page::{NO_PAGE, Offset};
use crate::storage::pager::PageStore;
use crate::storage::stats::{StatsSnapshot, TreeStats};

/// Internal node offset and the child index taken during a descent.
type Path = Vec<(Offset, usize)>;

/// A B-tree stored in a page store, fronted by a node cache.
pub struct BTree<I: PageIo> {
    pager: PageStore<I>,
    cache: NodeCache,
    meta: TreeMeta,
    /// Bumped on every insert, delete and relocation.
    generation: u64,
}

impl<I: PageIo> BTree<I> {
    /// Create a new tree with an empty root leaf over an empty page store.
    pub fn create(mut pager: PageStore<I>, cache_capacity: usize) -> Result<Self, StoreError> {
        let root = pager.allocate().offset;
        pager.write_node(root, &Node::Leaf(LeafNode::new()))?;

        let mut tree = Self {
            pager,
            cache: NodeCache::new(cache_capacity),
            meta: TreeMeta {
                root,
                height: 1,
                key_count: 0,
                stats: TreeStats::default(),
            },
            generation: 0,
        };
        tree.flush()?;
        Ok(tree)
    }

    /// Attach to an existing tree described by `header`.
    pub fn open(pager: PageStore<I>, header: &TreeHeader, cache_capacity: usize) -> Self {
        let mut cache = NodeCache::new(cache_capacity);
        cache.set_counters(header.stats.cache_hits, header.stats.cache_misses);

        Self {
            pager,
            cache,
            meta: TreeMeta {
                root: header.root,
                height: header.height,
                key_count: header.key_count,
                stats: header.stats,
            },
            generation: 0,
        }
    }

    /// Tree geometry.
    #[must_use]
    pub const fn geometry(&self) -> &Geometry {
        self.pager.geometry()
    }

    /// Root node offset.
    #[must_use]
    pub const fn root(&self) -> Offset {
        self.meta.root
    }

    /// Number of live keys.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.meta.key_count
    }

    /// Whether the tree holds no keys.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.meta.key_count == 0
    }

    /// Structural generation, used to invalidate cursors.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Header describing the current in-memory state.
    #[must_use]
    pub fn header(&self) -> TreeHeader {
        TreeHeader {
            geometry: *self.pager.geometry(),
            root: self.meta.root,
            free_head: self.pager.free_head(),
            free_count: self.pager.free_pages(),
            page_count: self.pager.page_count(),
            key_count: self.meta.key_count,
            height: self.meta.height,
            stats: TreeStats {
                cache_hits: self.cache.hits(),
                cache_misses: self.cache.misses(),
                ..self.meta.stats
            },
        }
    }

    /// Snapshot of the counters and sizes.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        let stats = self.meta.stats;
        StatsSnapshot {
            splits: stats.splits,
            merges: stats.merges,
            rotations_left: stats.rotations_left,
            rotations_right: stats.rotations_right,
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
            keys: self.meta.key_count,
            height: self.meta.height,
            nodes: self.pager.live_pages(),
            pages: self.pager.page_count(),
            free_pages: self.pager.free_pages(),
        }
    }

    /// Look up a value by key.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let offset = self.find_leaf(key)?;
        let value = self.leaf(offset)?.get(key).map(<[u8]>::to_vec);
        self.cache.trim();
        Ok(value)
    }

    /// Insert or update a key-value pair.
    ///
    /// Returns the old value if updating, None if inserting.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let geometry = *self.geometry();
        if key.len() > geometry.key_size() {
            return Err(StoreError::KeyTooLarge {
                len: key.len(),
                max: geometry.key_size(),
            });
        }
        if value.len() > geometry.value_size() {
            return Err(StoreError::ValueTooLarge {
                len: value.len(),
                max: geometry.value_size(),
            });
        }

        let mut ws = Workspace::new(&mut self.cache, &mut self.pager, self.meta);
        match insert_entry(&mut ws, key, value) {
            Ok(old) => {
                self.meta = ws.commit();
                if old.is_none() {
                    self.generation += 1;
                }
                self.cache.trim();
                Ok(old)
            }
            Err(e) => {
                ws.abort();
                Err(e)
            }
        }
    }

    /// Remove a key, returning its value.
    pub fn delete(&mut self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        let mut ws = Workspace::new(&mut self.cache, &mut self.pager, self.meta);
        match delete_entry(&mut ws, key) {
            Ok(value) => {
                self.meta = ws.commit();
                self.generation += 1;
                self.cache.trim();
                self.pager.shrink_if_needed();
                Ok(value)
            }
            Err(e) => {
                ws.abort();
                Err(e)
            }
        }
    }

    /// Write dirty nodes, the free list and the header, then sync.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        let written = self.cache.flush_all(&mut self.pager)?;
        self.pager.flush_free_list()?;
        self.pager.sync_len()?;
        let header = self.header();
        self.pager.write_header(&header)?;
        self.pager.sync()?;
        self.cache.trim();
        debug!(
            nodes = written,
            pages = header.page_count,
            free = header.free_count,
            "Flushed tree"
        );
        Ok(())
    }

    /// Run the consistency checker over the whole tree.
    pub fn check(&mut self) -> Vec<ConsistencyViolation> {
        check_tree(&mut self.pager, &self.cache, &self.meta)
    }

    /// Move live pages from the end of the file into free holes and
    /// truncate. Returns the number of pages removed from the file.
    pub fn compact(&mut self) -> Result<u64, StoreError> {
        let before = self.pager.page_count();
        let mut parents = self.parent_map()?;
        let mut moved = 0u64;

        self.pager.shrink();
        while let (Some(hole), Some(last)) = (self.pager.lowest_free(), self.pager.last_page()) {
            if hole > last {
                break;
            }
            let parent = parents.get(&last).copied();
            if parent.is_none() && last != self.meta.root {
                // Unreachable page; leave it for the checker to report
                break;
            }

            let mut ws = Workspace::new(&mut self.cache, &mut self.pager, self.meta);
            let children = match relocate(&mut ws, last, hole, parent) {
                Ok(children) => {
                    self.meta = ws.commit();
                    children
                }
                Err(e) => {
                    ws.abort();
                    return Err(e);
                }
            };

            parents.remove(&last);
            if let Some(parent) = parent {
                parents.insert(hole, parent);
            }
            for child in children {
                parents.insert(child, hole);
            }

            moved += 1;
            self.generation += 1;
            self.cache.trim();
            self.pager.shrink();
        }

        let removed = before - self.pager.page_count();
        debug!(moved, removed, pages = self.pager.page_count(), "Compacted store");
        Ok(removed)
    }

    /// Map every non-root node to its parent.
    fn parent_map(&mut self) -> Result<HashMap<Offset, Offset>, StoreError> {
        let mut parents = HashMap::new();
        let mut pending = vec![self.meta.root];
        while let Some(offset) = pending.pop() {
            if let Node::Internal(node) = self.cache.read_through(offset, &mut self.pager)? {
                for child in node.children {
                    parents.insert(child, offset);
                    pending.push(child);
                }
            }
        }
        Ok(parents)
    }

    /// Offset of the leaf that holds, or would hold, `key`.
    pub fn find_leaf(&mut self, key: &[u8]) -> Result<Offset, StoreError> {
        self.descend(|node| node.find_child_index(key))
    }

    /// Offset of the first leaf in key order.
    pub fn leftmost_leaf(&mut self) -> Result<Offset, StoreError> {
        self.descend(|_| 0)
    }

    /// Offset of the last leaf in key order.
    pub fn rightmost_leaf(&mut self) -> Result<Offset, StoreError> {
        self.descend(|node| node.keys.len())
    }

    fn descend(&mut self, pick: impl Fn(&InternalNode) -> usize) -> Result<Offset, StoreError> {
        let mut offset = self.meta.root;
        for _ in 1..self.meta.height {
            match self.cache.get(offset, &mut self.pager)? {
                Node::Internal(node) => offset = node.children[pick(node)],
                Node::Leaf(_) => return Err(wrong_type(offset)),
            }
        }
        Ok(offset)
    }

    /// Borrow the leaf at `offset` through the cache.
    pub fn leaf(&mut self, offset: Offset) -> Result<&LeafNode, StoreError> {
        match self.cache.get(offset, &mut self.pager)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(wrong_type(offset)),
        }
    }

    /// Evict cached nodes down to capacity.
    pub fn trim_cache(&mut self) {
        self.cache.trim();
    }
}

const fn wrong_type(offset: Offset) -> StoreError {
    StoreError::CorruptPage {
        offset,
        source: NodeError::WrongNodeType,
    }
}

/// Descend from the root to the leaf for `key`, recording the path.
fn descend_path<I: PageIo>(
    ws: &mut Workspace<'_, I>,
    key: &[u8],
) -> Result<(Offset, Path), StoreError> {
    let mut path = Vec::new();
    let mut offset = ws.meta.root;
    for _ in 1..ws.meta.height {
        let node = ws.internal(offset)?;
        let index = node.find_child_index(key);
        let child = node.children[index];
        path.push((offset, index));
        offset = child;
    }
    Ok((offset, path))
}

fn insert_entry<I: PageIo>(
    ws: &mut Workspace<'_, I>,
    key: &[u8],
    value: &[u8],
) -> Result<Option<Vec<u8>>, StoreError> {
    let order = ws.geometry().order();
    let (offset, path) = descend_path(ws, key)?;

    let leaf = ws.leaf_mut(offset)?;
    if let Some(old) = leaf.insert(key.to_vec(), value.to_vec()) {
        // Update in place: no structural change
        return Ok(Some(old));
    }
    let overflow = leaf.entries.len() > order;
    ws.meta.key_count += 1;

    if overflow {
        split_leaf(ws, offset, path)?;
    }
    Ok(None)
}

fn split_leaf<I: PageIo>(
    ws: &mut Workspace<'_, I>,
    offset: Offset,
    path: Path,
) -> Result<(), StoreError> {
    let (separator, mut right) = ws.leaf_mut(offset)?.split();
    let next = right.next_leaf;
    right.prev_leaf = offset;

    let right_offset = ws.create(Node::Leaf(right));
    ws.leaf_mut(offset)?.next_leaf = right_offset;
    if next != NO_PAGE {
        ws.leaf_mut(next)?.prev_leaf = right_offset;
    }

    ws.meta.stats.splits += 1;
    trace!(left = offset, right = right_offset, "Split leaf");
    insert_into_parent(ws, path, offset, separator, right_offset)
}

fn insert_into_parent<I: PageIo>(
    ws: &mut Workspace<'_, I>,
    mut path: Path,
    mut left: Offset,
    mut separator: Vec<u8>,
    mut right: Offset,
) -> Result<(), StoreError> {
    let order = ws.geometry().order();
    loop {
        let Some((parent, index)) = path.pop() else {
            // Root split: the tree grows by one level
            let root = ws.create(Node::Internal(InternalNode::with_children(
                left, separator, right,
            )));
            ws.meta.root = root;
            ws.meta.height += 1;
            trace!(root, height = ws.meta.height, "Grew new root");
            return Ok(());
        };

        let node = ws.internal_mut(parent)?;
        node.insert_after(index, separator, right);
        if node.keys.len() <= order {
            return Ok(());
        }

        let (median, new_right) = node.split();
        let new_offset = ws.create(Node::Internal(new_right));
        ws.meta.stats.splits += 1;
        trace!(left = parent, right = new_offset, "Split internal node");

        left = parent;
        separator = median;
        right = new_offset;
    }
}

fn delete_entry<I: PageIo>(ws: &mut Workspace<'_, I>, key: &[u8]) -> Result<Vec<u8>, StoreError> {
    let (offset, path) = descend_path(ws, key)?;

    let found = match ws.node(offset)? {
        Node::Leaf(leaf) => leaf.find_index(key).is_ok(),
        Node::Internal(_) => return Err(wrong_type(offset)),
    };
    if !found {
        return Err(StoreError::KeyNotFound(key.to_vec()));
    }

    let value = ws.leaf_mut(offset)?.remove(key).unwrap_or_default();
    ws.meta.key_count -= 1;
    rebalance(ws, offset, path)?;
    Ok(value)
}

/// Restore minimum occupancy from `offset` upwards after a removal.
fn rebalance<I: PageIo>(
    ws: &mut Workspace<'_, I>,
    mut offset: Offset,
    mut path: Path,
) -> Result<(), StoreError> {
    let min_keys = ws.geometry().min_keys();
    loop {
        let Some((parent, index)) = path.pop() else {
            return collapse_root(ws, offset);
        };
        if ws.node(offset)?.key_count() >= min_keys {
            return Ok(());
        }

        let (left, right) = {
            let node = ws.internal(parent)?;
            let left = index.checked_sub(1).map(|i| node.children[i]);
            let right = node.children.get(index + 1).copied();
            (left, right)
        };

        if let Some(left) = left {
            if ws.node(left)?.key_count() > min_keys {
                return borrow_from_left(ws, parent, index, left, offset);
            }
        }
        if let Some(right) = right {
            if ws.node(right)?.key_count() > min_keys {
                return borrow_from_right(ws, parent, index, offset, right);
            }
        }

        match (left, right) {
            (_, Some(right)) => merge(ws, parent, index, offset, right)?,
            (Some(left), None) => merge(ws, parent, index - 1, left, offset)?,
            (None, None) => return Ok(()),
        }
        offset = parent;
    }
}

/// Replace an empty internal root by its only child.
fn collapse_root<I: PageIo>(ws: &mut Workspace<'_, I>, root: Offset) -> Result<(), StoreError> {
    let child = match ws.node(root)? {
        Node::Internal(node) if node.keys.is_empty() => node.children[0],
        _ => return Ok(()),
    };
    ws.release(root)?;
    ws.meta.root = child;
    ws.meta.height -= 1;
    trace!(root = child, height = ws.meta.height, "Collapsed root");
    Ok(())
}

/// Move the last key of `left` into `node` through the parent.
fn borrow_from_left<I: PageIo>(
    ws: &mut Workspace<'_, I>,
    parent: Offset,
    index: usize,
    left: Offset,
    node: Offset,
) -> Result<(), StoreError> {
    let separator = match ws.node_mut(left)? {
        Node::Leaf(left_leaf) => {
            let Some(entry) = left_leaf.entries.pop() else {
                return Ok(());
            };
            let separator = entry.key.clone();
            ws.leaf_mut(node)?.entries.insert(0, entry);
            separator
        }
        Node::Internal(left_node) => {
            let (Some(key), Some(child)) = (left_node.keys.pop(), left_node.children.pop()) else {
                return Ok(());
            };
            let down = std::mem::replace(&mut ws.internal_mut(parent)?.keys[index - 1], key);
            let target = ws.internal_mut(node)?;
            target.keys.insert(0, down);
            target.children.insert(0, child);
            ws.meta.stats.rotations_right += 1;
            trace!(from = left, to = node, "Rotated right");
            return Ok(());
        }
    };

    ws.internal_mut(parent)?.keys[index - 1] = separator;
    ws.meta.stats.rotations_right += 1;
    trace!(from = left, to = node, "Rotated right");
    Ok(())
}

/// Move the first key of `right` into `node` through the parent.
fn borrow_from_right<I: PageIo>(
    ws: &mut Workspace<'_, I>,
    parent: Offset,
    index: usize,
    node: Offset,
    right: Offset,
) -> Result<(), StoreError> {
    match ws.node_mut(right)? {
        Node::Leaf(right_leaf) => {
            if right_leaf.entries.is_empty() {
                return Ok(());
            }
            let entry = right_leaf.entries.remove(0);
            let separator = right_leaf
                .entries
                .first()
                .map(|e| e.key.clone())
                .unwrap_or_default();
            ws.leaf_mut(node)?.entries.push(entry);
            ws.internal_mut(parent)?.keys[index] = separator;
        }
        Node::Internal(right_node) => {
            if right_node.keys.is_empty() {
                return Ok(());
            }
            let up = right_node.keys.remove(0);
            let child = right_node.children.remove(0);
            let down = std::mem::replace(&mut ws.internal_mut(parent)?.keys[index], up);
            let target = ws.internal_mut(node)?;
            target.keys.push(down);
            target.children.push(child);
        }
    }

    ws.meta.stats.rotations_left += 1;
    trace!(from = right, to = node, "Rotated left");
    Ok(())
}

/// Merge `right` into `left`, removing separator `index` from the parent.
fn merge<I: PageIo>(
    ws: &mut Workspace<'_, I>,
    parent: Offset,
    index: usize,
    left: Offset,
    right: Offset,
) -> Result<(), StoreError> {
    let (separator, _) = ws.internal_mut(parent)?.remove_after(index);
    let right_node = ws.node(right)?.clone();

    let next = match (ws.node_mut(left)?, right_node) {
        (Node::Leaf(left_leaf), Node::Leaf(right_leaf)) => {
            left_leaf.merge(right_leaf);
            left_leaf.next_leaf
        }
        (Node::Internal(left_node), Node::Internal(right_node)) => {
            left_node.merge(separator, right_node);
            NO_PAGE
        }
        _ => return Err(wrong_type(right)),
    };
    if next != NO_PAGE {
        ws.leaf_mut(next)?.prev_leaf = left;
    }

    ws.release(right)?;
    ws.meta.stats.merges += 1;
    trace!(left, right, "Merged nodes");
    Ok(())
}

/// Move the node at `from` onto the free page `to`, repointing its parent
/// (or the root) and its leaf neighbours. Returns the moved node's children.
fn relocate<I: PageIo>(
    ws: &mut Workspace<'_, I>,
    from: Offset,
    to: Offset,
    parent: Option<Offset>,
) -> Result<Vec<Offset>, StoreError> {
    let node = ws.node(from)?.clone();

    match parent {
        Some(parent) => {
            let parent_node = ws.internal_mut(parent)?;
            if let Some(slot) = parent_node.children.iter_mut().find(|c| **c == from) {
                *slot = to;
            }
        }
        None => ws.meta.root = to,
    }

    let children = match &node {
        Node::Leaf(leaf) => {
            if leaf.prev_leaf != NO_PAGE {
                ws.leaf_mut(leaf.prev_leaf)?.next_leaf = to;
            }
            if leaf.next_leaf != NO_PAGE {
                ws.leaf_mut(leaf.next_leaf)?.prev_leaf = to;
            }
            Vec::new()
        }
        Node::Internal(internal) => internal.children.clone(),
    };

    ws.release(from)?;
    ws.create_at(to, node)?;
    trace!(from, to, "Relocated node");
    Ok(children)
}
