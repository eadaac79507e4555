//! B-tree node types and serialization.
//!
//! Every node occupies one fixed-size page (see `storage::layout`):
//! - Internal nodes: `count` separator keys and `count + 1` child offsets
//! - Leaf nodes: `count` key/value entries plus `prev_leaf`/`next_leaf`
//!   thread links connecting all leaves in key order

// Counts and slot lengths are bounded by the geometry limits (<= 4096).
#![allow(clippy::cast_possible_truncation)]

use crate::storage::layout::{COUNT_OFFSET, Geometry, NEXT_LEAF_OFFSET, PREV_LEAF_OFFSET};
use crate::storage::page::{NO_PAGE, Offset, Page, PageError, PageType};

/// A decoded B-tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl Node {
    /// Decode a node page, verifying its checksum and bounds.
    pub fn from_page(page: &Page, geometry: &Geometry) -> Result<Self, NodeError> {
        if page.len() != geometry.page_size() {
            return Err(NodeError::Page(PageError::WrongSize {
                expected: geometry.page_size(),
                actual: page.len(),
            }));
        }

        let header = page.verify()?;
        let count = page.read_u16(COUNT_OFFSET) as usize;
        if count > geometry.order() {
            return Err(NodeError::CountOutOfRange {
                count,
                max: geometry.order(),
            });
        }

        match header.page_type {
            PageType::Internal => InternalNode::decode(page, geometry, count).map(Self::Internal),
            PageType::Leaf => LeafNode::decode(page, geometry, count).map(Self::Leaf),
            PageType::Free => Err(NodeError::UnexpectedPageType(PageType::Free)),
        }
    }

    /// Encode the node into a sealed page.
    #[must_use]
    pub fn to_page(&self, geometry: &Geometry) -> Page {
        let mut page = Page::new(geometry.page_size());
        match self {
            Self::Internal(node) => {
                node.encode(&mut page, geometry);
                page.seal(PageType::Internal);
            }
            Self::Leaf(node) => {
                node.encode(&mut page, geometry);
                page.seal(PageType::Leaf);
            }
        }
        page
    }

    /// Whether this is a leaf.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Number of keys held by the node.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn key_count(&self) -> usize {
        match self {
            Self::Internal(node) => node.keys.len(),
            Self::Leaf(node) => node.entries.len(),
        }
    }

    /// The key at `index`.
    #[must_use]
    pub fn key(&self, index: usize) -> &[u8] {
        match self {
            Self::Internal(node) => &node.keys[index],
            Self::Leaf(node) => &node.entries[index].key,
        }
    }

    /// Borrow as a leaf, if it is one.
    #[must_use]
    pub const fn as_leaf(&self) -> Option<&LeafNode> {
        match self {
            Self::Leaf(node) => Some(node),
            Self::Internal(_) => None,
        }
    }

}

/// An internal (non-leaf) B-tree node.
///
/// Stores N keys and N+1 child offsets.
/// `children[i]` contains keys < `keys[i]`
/// `children[i+1]` contains keys >= `keys[i]`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InternalNode {
    /// Separator keys in sorted order.
    pub keys: Vec<Vec<u8>>,
    /// Child offsets. `children.len()` == `keys.len()` + 1
    pub children: Vec<Offset>,
}

impl InternalNode {
    /// Create an internal node with two children.
    #[must_use]
    pub fn with_children(left_child: Offset, key: Vec<u8>, right_child: Offset) -> Self {
        Self {
            keys: vec![key],
            children: vec![left_child, right_child],
        }
    }

    fn decode(page: &Page, geometry: &Geometry, count: usize) -> Result<Self, NodeError> {
        let keys = read_keys(page, geometry, count)?;
        let children = (0..=count)
            .map(|i| page.read_u64(geometry.child_offset(i)))
            .collect();
        Ok(Self { keys, children })
    }

    fn encode(&self, page: &mut Page, geometry: &Geometry) {
        page.write_u16(COUNT_OFFSET, self.keys.len() as u16);
        for (i, key) in self.keys.iter().enumerate() {
            write_slot(page, geometry.key_offset(i), key);
        }
        for (i, child) in self.children.iter().enumerate() {
            page.write_u64(geometry.child_offset(i), *child);
        }
    }

    /// Find the child index for a given key.
    #[must_use]
    pub fn find_child_index(&self, key: &[u8]) -> usize {
        match self.keys.binary_search_by(|k| k.as_slice().cmp(key)) {
            Ok(i) => i + 1, // Exact match, go right
            Err(i) => i,    // Insert position
        }
    }

    /// Insert a separator and the child to its right, next to child `index`.
    pub fn insert_after(&mut self, index: usize, key: Vec<u8>, right_child: Offset) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, right_child);
    }

    /// Remove separator `index` and the child to its right.
    pub fn remove_after(&mut self, index: usize) -> (Vec<u8>, Offset) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        (key, child)
    }

    /// Split the node, returning the median key and the new right node.
    ///
    /// The median moves up to the parent and is kept in neither half.
    #[must_use]
    pub fn split(&mut self) -> (Vec<u8>, Self) {
        let mid = self.keys.len() / 2;

        // Right node gets keys and children after median
        let keys: Vec<Vec<u8>> = self.keys.drain(mid + 1..).collect();
        let children: Vec<Offset> = self.children.drain(mid + 1..).collect();

        let median = self.keys.pop().unwrap_or_default();
        (median, Self { keys, children })
    }

    /// Append `separator` and every key and child of `right`.
    pub fn merge(&mut self, separator: Vec<u8>, right: Self) {
        self.keys.push(separator);
        self.keys.extend(right.keys);
        self.children.extend(right.children);
    }
}

/// A key/value entry in a leaf node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// A leaf B-tree node.
///
/// Stores key/value entries and links to sibling leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    /// Entries in sorted order by key.
    pub entries: Vec<LeafEntry>,
    /// Previous leaf in key order, or `NO_PAGE`.
    pub prev_leaf: Offset,
    /// Next leaf in key order, or `NO_PAGE`.
    pub next_leaf: Offset,
}

impl Default for LeafNode {
    fn default() -> Self {
        Self::new()
    }
}

impl LeafNode {
    /// Create a new empty, unlinked leaf.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            prev_leaf: NO_PAGE,
            next_leaf: NO_PAGE,
        }
    }

    fn decode(page: &Page, geometry: &Geometry, count: usize) -> Result<Self, NodeError> {
        let keys = read_keys(page, geometry, count)?;
        let mut entries = Vec::with_capacity(count);
        for (i, key) in keys.into_iter().enumerate() {
            let offset = geometry.value_offset(i);
            let len = page.read_u16(offset) as usize;
            if len > geometry.value_size() {
                return Err(NodeError::ValueLengthOutOfRange {
                    index: i,
                    len,
                    max: geometry.value_size(),
                });
            }
            let value = page.read_bytes(offset + 2, len).to_vec();
            entries.push(LeafEntry { key, value });
        }

        Ok(Self {
            entries,
            prev_leaf: page.read_u64(PREV_LEAF_OFFSET),
            next_leaf: page.read_u64(NEXT_LEAF_OFFSET),
        })
    }

    fn encode(&self, page: &mut Page, geometry: &Geometry) {
        page.write_u16(COUNT_OFFSET, self.entries.len() as u16);
        page.write_u64(PREV_LEAF_OFFSET, self.prev_leaf);
        page.write_u64(NEXT_LEAF_OFFSET, self.next_leaf);
        for (i, entry) in self.entries.iter().enumerate() {
            write_slot(page, geometry.key_offset(i), &entry.key);
            write_slot(page, geometry.value_offset(i), &entry.value);
        }
    }

    /// Find the index where a key should be inserted (or exists).
    pub fn find_index(&self, key: &[u8]) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|e| e.key.as_slice().cmp(key))
    }

    /// Get a value by key.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.find_index(key)
            .ok()
            .map(|i| self.entries[i].value.as_slice())
    }

    /// Insert or update an entry.
    ///
    /// Returns the old value if updating, None if inserting.
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) -> Option<Vec<u8>> {
        match self.find_index(&key) {
            Ok(i) => Some(std::mem::replace(&mut self.entries[i].value, value)),
            Err(i) => {
                self.entries.insert(i, LeafEntry { key, value });
                None
            }
        }
    }

    /// Remove an entry by key.
    ///
    /// Returns the removed value if found.
    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.find_index(key)
            .ok()
            .map(|i| self.entries.remove(i).value)
    }

    /// Split the node, returning the split key and the new right node.
    ///
    /// The split key is a copy of the right node's first key. The right node
    /// inherits `next_leaf`; the caller links `prev_leaf` once the new page
    /// has an offset.
    #[must_use]
    pub fn split(&mut self) -> (Vec<u8>, Self) {
        let mid = self.entries.len() / 2;

        let entries: Vec<LeafEntry> = self.entries.drain(mid..).collect();
        let split_key = entries
            .first()
            .map(|e| e.key.clone())
            .unwrap_or_default();

        let right = Self {
            entries,
            prev_leaf: NO_PAGE,
            next_leaf: self.next_leaf,
        };

        (split_key, right)
    }

    /// Append every entry of `right` and take over its `next_leaf` link.
    pub fn merge(&mut self, right: Self) {
        self.entries.extend(right.entries);
        self.next_leaf = right.next_leaf;
    }
}

fn read_keys(page: &Page, geometry: &Geometry, count: usize) -> Result<Vec<Vec<u8>>, NodeError> {
    let mut keys = Vec::with_capacity(count);
    for i in 0..count {
        let offset = geometry.key_offset(i);
        let len = page.read_u16(offset) as usize;
        if len > geometry.key_size() {
            return Err(NodeError::KeyLengthOutOfRange {
                index: i,
                len,
                max: geometry.key_size(),
            });
        }
        keys.push(page.read_bytes(offset + 2, len).to_vec());
    }
    Ok(keys)
}

fn write_slot(page: &mut Page, offset: usize, bytes: &[u8]) {
    page.write_u16(offset, bytes.len() as u16);
    page.write_bytes(offset + 2, bytes);
}

/// Errors that can occur when decoding B-tree nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Page-level failure (bad type byte, checksum, size).
    Page(PageError),
    /// The page is valid but does not hold a node.
    UnexpectedPageType(PageType),
    /// Expected a leaf and found an internal node, or vice versa.
    WrongNodeType,
    /// Stored key count exceeds the order.
    CountOutOfRange { count: usize, max: usize },
    /// A key slot length exceeds the key size.
    KeyLengthOutOfRange { index: usize, len: usize, max: usize },
    /// A value slot length exceeds the value size.
    ValueLengthOutOfRange { index: usize, len: usize, max: usize },
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Page(e) => write!(f, "{e}"),
            Self::UnexpectedPageType(t) => write!(f, "expected a node page, found {t:?}"),
            Self::WrongNodeType => write!(f, "wrong node type for operation"),
            Self::CountOutOfRange { count, max } => {
                write!(f, "key count {count} exceeds order {max}")
            }
            Self::KeyLengthOutOfRange { index, len, max } => {
                write!(f, "key {index} has length {len} (max {max})")
            }
            Self::ValueLengthOutOfRange { index, len, max } => {
                write!(f, "value {index} has length {len} (max {max})")
            }
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Page(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PageError> for NodeError {
    fn from(e: PageError) -> Self {
        Self::Page(e)
    }
}
