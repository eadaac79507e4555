//! Node page geometry.
//!
//! Every node page has the same size, fixed at creation time by the tree
//! order and the configured key and value slot sizes:
//!
//! ```text
//! 0      8       10        16          24          32
//! +------+-------+---------+-----------+-----------+------------------------+
//! | page | count | reserved| prev_leaf | next_leaf | body                   |
//! | hdr  | (u16) |         | (u64)     | (u64)     |                        |
//! +------+-------+---------+-----------+-----------+------------------------+
//! ```
//!
//! The body holds `order` key slots followed by either `order + 1` child
//! offsets (internal nodes) or `order` value slots (leaves). Key and value
//! slots are a u16 length prefix followed by the fixed-width payload area.
//! Free pages reuse the `prev_leaf` field for the next free page.

use crate::config::ConfigError;
use crate::storage::page::PageHeader;

/// Smallest supported order.
pub const MIN_ORDER: usize = 3;
/// Largest supported order.
pub const MAX_ORDER: usize = 1024;
/// Smallest supported key slot size.
pub const MIN_KEY_SIZE: usize = 1;
/// Largest supported key slot size.
pub const MAX_KEY_SIZE: usize = 1024;
/// Smallest supported value slot size.
pub const MIN_VALUE_SIZE: usize = 1;
/// Largest supported value slot size.
pub const MAX_VALUE_SIZE: usize = 4096;

/// Offset of the key count within a node page.
pub const COUNT_OFFSET: usize = PageHeader::SIZE;
/// Offset of the previous-leaf thread link.
pub const PREV_LEAF_OFFSET: usize = 16;
/// Offset of the next-leaf thread link.
pub const NEXT_LEAF_OFFSET: usize = 24;
/// Offset of the next-free link in a free page.
pub const NEXT_FREE_OFFSET: usize = PREV_LEAF_OFFSET;
/// Offset where the key slots start.
pub const BODY_OFFSET: usize = 32;

/// Length prefix in front of every key and value slot.
const LEN_PREFIX: usize = 2;

/// Size of a child pointer.
const CHILD_SIZE: usize = 8;

/// Fixed sizing parameters of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    order: usize,
    key_size: usize,
    value_size: usize,
}

impl Geometry {
    /// Validate and build a geometry.
    pub fn new(order: usize, key_size: usize, value_size: usize) -> Result<Self, ConfigError> {
        check_range("num_keys", order, MIN_ORDER, MAX_ORDER)?;
        check_range("key_size", key_size, MIN_KEY_SIZE, MAX_KEY_SIZE)?;
        check_range("value_size", value_size, MIN_VALUE_SIZE, MAX_VALUE_SIZE)?;
        Ok(Self {
            order,
            key_size,
            value_size,
        })
    }

    /// Maximum number of keys a node may hold.
    #[must_use]
    pub const fn order(&self) -> usize {
        self.order
    }

    /// Maximum key length in bytes.
    #[must_use]
    pub const fn key_size(&self) -> usize {
        self.key_size
    }

    /// Maximum value length in bytes.
    #[must_use]
    pub const fn value_size(&self) -> usize {
        self.value_size
    }

    /// Minimum number of keys in a non-root node: `ceil(order / 2) - 1`.
    #[must_use]
    pub const fn min_keys(&self) -> usize {
        self.order.div_ceil(2) - 1
    }

    /// Bytes per key slot, including the length prefix.
    #[must_use]
    pub const fn key_slot(&self) -> usize {
        LEN_PREFIX + self.key_size
    }

    /// Bytes per value slot, including the length prefix.
    #[must_use]
    pub const fn value_slot(&self) -> usize {
        LEN_PREFIX + self.value_size
    }

    /// Offset of key slot `index`.
    #[must_use]
    pub const fn key_offset(&self, index: usize) -> usize {
        BODY_OFFSET + index * self.key_slot()
    }

    /// Offset of child pointer `index` in an internal node.
    #[must_use]
    pub const fn child_offset(&self, index: usize) -> usize {
        self.key_offset(self.order) + index * CHILD_SIZE
    }

    /// Offset of value slot `index` in a leaf.
    #[must_use]
    pub const fn value_offset(&self, index: usize) -> usize {
        self.key_offset(self.order) + index * self.value_slot()
    }

    /// Size of every node page in bytes.
    #[must_use]
    pub const fn page_size(&self) -> usize {
        let children = (self.order + 1) * CHILD_SIZE;
        let values = self.order * self.value_slot();
        let tail = if children > values { children } else { values };
        self.key_offset(self.order) + tail
    }
}

fn check_range(name: &str, value: usize, min: usize, max: usize) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("{value} is outside {min}..={max}"),
        });
    }
    Ok(())
}
