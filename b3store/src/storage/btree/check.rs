//! Full-tree consistency checker.
//!
//! Walks every node reachable from the root in key order and collects
//! every defect found instead of stopping at the first. Nodes are read
//! through the cache without disturbing recency or the hit counters, so
//! running the checker does not change what a later operation observes.

use std::collections::HashSet;

use crate::storage::btree::node::Node;
use crate::storage::btree::workspace::TreeMeta;
use crate::storage::cache::NodeCache;
use crate::storage::io::PageIo;
use crate::storage::page::{NO_PAGE, Offset};
use crate::storage::pager::PageStore;

/// A structural defect found by the checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyViolation {
    /// Key `index` is not greater than the key before it.
    KeysNotIncreasing { offset: Offset, index: usize },
    /// A non-root node holds fewer than `min_keys` keys.
    Underflow { offset: Offset, count: usize, min: usize },
    /// A node holds more than `order` keys.
    Overflow { offset: Offset, count: usize, max: usize },
    /// Key `index` falls outside the range its parent's separators allow.
    KeyOutOfRange { offset: Offset, index: usize },
    /// A child pointer does not address a page in the file.
    InvalidChild { parent: Offset, child: Offset },
    /// A page reachable from the root is also on the free list.
    ReachableFreePage { offset: Offset },
    /// A page is reachable along more than one path.
    PageReachedTwice { offset: Offset },
    /// A page could not be read or decoded.
    UnreadablePage { offset: Offset, reason: String },
    /// A node sits at a depth that does not match its kind.
    UnevenDepth { offset: Offset, depth: u64, height: u64 },
    /// A leaf's `next_leaf` does not point at the next leaf in key order.
    NextLinkMismatch { offset: Offset, expected: Offset, found: Offset },
    /// A leaf's `prev_leaf` does not point at the previous leaf in key order.
    PrevLinkMismatch { offset: Offset, expected: Offset, found: Offset },
    /// The header's key count differs from the entries in the leaves.
    KeyCountMismatch { recorded: u64, counted: u64 },
    /// A page is neither reachable nor on the free list.
    LeakedPage { offset: Offset },
}

impl std::fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeysNotIncreasing { offset, index } => {
                write!(f, "node {offset}: key {index} is not increasing")
            }
            Self::Underflow { offset, count, min } => {
                write!(f, "node {offset}: {count} keys, minimum is {min}")
            }
            Self::Overflow { offset, count, max } => {
                write!(f, "node {offset}: {count} keys, maximum is {max}")
            }
            Self::KeyOutOfRange { offset, index } => {
                write!(f, "node {offset}: key {index} outside separator range")
            }
            Self::InvalidChild { parent, child } => {
                write!(f, "node {parent}: child {child} is not a page offset")
            }
            Self::ReachableFreePage { offset } => {
                write!(f, "page {offset} is reachable but on the free list")
            }
            Self::PageReachedTwice { offset } => write!(f, "page {offset} reached twice"),
            Self::UnreadablePage { offset, reason } => {
                write!(f, "page {offset} unreadable: {reason}")
            }
            Self::UnevenDepth {
                offset,
                depth,
                height,
            } => write!(
                f,
                "node {offset}: found at depth {depth} in a tree of height {height}"
            ),
            Self::NextLinkMismatch {
                offset,
                expected,
                found,
            } => write!(
                f,
                "leaf {offset}: next link is {found}, expected {expected}"
            ),
            Self::PrevLinkMismatch {
                offset,
                expected,
                found,
            } => write!(
                f,
                "leaf {offset}: prev link is {found}, expected {expected}"
            ),
            Self::KeyCountMismatch { recorded, counted } => write!(
                f,
                "header records {recorded} keys, leaves hold {counted}"
            ),
            Self::LeakedPage { offset } => {
                write!(f, "page {offset} is neither reachable nor free")
            }
        }
    }
}

/// A node waiting to be visited, with the key range its parent allows.
struct Pending {
    offset: Offset,
    depth: u64,
    lower: Option<Vec<u8>>,
    upper: Option<Vec<u8>>,
}

struct LeafLinks {
    offset: Offset,
    prev: Offset,
    next: Offset,
}

/// Check every structural invariant of the tree described by `meta`.
///
/// Returns an empty list if the tree is consistent.
pub fn check_tree<I: PageIo>(
    pager: &mut PageStore<I>,
    cache: &NodeCache,
    meta: &TreeMeta,
) -> Vec<ConsistencyViolation> {
    let geometry = *pager.geometry();
    let free: HashSet<Offset> = pager.free_list().collect();
    let mut violations = Vec::new();
    let mut seen = HashSet::new();
    let mut leaves = Vec::new();
    let mut counted = 0u64;
    let mut last_key: Option<Vec<u8>> = None;

    let mut stack = vec![Pending {
        offset: meta.root,
        depth: 1,
        lower: None,
        upper: None,
    }];

    while let Some(item) = stack.pop() {
        let offset = item.offset;
        if !seen.insert(offset) {
            violations.push(ConsistencyViolation::PageReachedTwice { offset });
            continue;
        }
        if free.contains(&offset) {
            violations.push(ConsistencyViolation::ReachableFreePage { offset });
        }

        let node = match cache.read_through(offset, pager) {
            Ok(node) => node,
            Err(e) => {
                violations.push(ConsistencyViolation::UnreadablePage {
                    offset,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let count = node.key_count();
        let is_root = offset == meta.root;
        if count > geometry.order() {
            violations.push(ConsistencyViolation::Overflow {
                offset,
                count,
                max: geometry.order(),
            });
        }
        let min = match (&node, is_root) {
            (Node::Leaf(_), true) => 0,
            (Node::Internal(_), true) => 1,
            (_, false) => geometry.min_keys(),
        };
        if count < min {
            violations.push(ConsistencyViolation::Underflow { offset, count, min });
        }

        for index in 0..count {
            let key = node.key(index);
            if index > 0 && node.key(index - 1) >= key {
                violations.push(ConsistencyViolation::KeysNotIncreasing { offset, index });
            }
            let below = item.lower.as_deref().is_some_and(|lower| key < lower);
            let above = item.upper.as_deref().is_some_and(|upper| key >= upper);
            if below || above {
                violations.push(ConsistencyViolation::KeyOutOfRange { offset, index });
            }
        }

        match node {
            Node::Leaf(leaf) => {
                if item.depth != meta.height {
                    violations.push(ConsistencyViolation::UnevenDepth {
                        offset,
                        depth: item.depth,
                        height: meta.height,
                    });
                }
                if let (Some(last), Some(first)) = (&last_key, leaf.entries.first()) {
                    if first.key <= *last {
                        violations.push(ConsistencyViolation::KeysNotIncreasing {
                            offset,
                            index: 0,
                        });
                    }
                }
                if let Some(entry) = leaf.entries.last() {
                    last_key = Some(entry.key.clone());
                }
                counted += leaf.entries.len() as u64;
                leaves.push(LeafLinks {
                    offset,
                    prev: leaf.prev_leaf,
                    next: leaf.next_leaf,
                });
            }
            Node::Internal(internal) => {
                if item.depth >= meta.height {
                    violations.push(ConsistencyViolation::UnevenDepth {
                        offset,
                        depth: item.depth,
                        height: meta.height,
                    });
                    continue;
                }

                // Push right to left so children pop in key order
                for (i, &child) in internal.children.iter().enumerate().rev() {
                    if !pager.is_page_offset(child) {
                        violations.push(ConsistencyViolation::InvalidChild {
                            parent: offset,
                            child,
                        });
                        continue;
                    }
                    let lower = if i == 0 {
                        item.lower.clone()
                    } else {
                        internal.keys.get(i - 1).cloned()
                    };
                    let upper = internal.keys.get(i).cloned().or_else(|| item.upper.clone());
                    stack.push(Pending {
                        offset: child,
                        depth: item.depth + 1,
                        lower,
                        upper,
                    });
                }
            }
        }
    }

    check_threads(&leaves, &mut violations);

    if counted != meta.key_count {
        violations.push(ConsistencyViolation::KeyCountMismatch {
            recorded: meta.key_count,
            counted,
        });
    }

    for index in 0..pager.page_count() {
        let offset = pager.offset_of(index);
        if !seen.contains(&offset) && !free.contains(&offset) {
            violations.push(ConsistencyViolation::LeakedPage { offset });
        }
    }

    violations
}

/// Check that the leaf links match the in-order sequence of leaves.
fn check_threads(leaves: &[LeafLinks], violations: &mut Vec<ConsistencyViolation>) {
    for (i, leaf) in leaves.iter().enumerate() {
        let expected_prev = i.checked_sub(1).map_or(NO_PAGE, |p| leaves[p].offset);
        let expected_next = leaves.get(i + 1).map_or(NO_PAGE, |n| n.offset);

        if leaf.prev != expected_prev {
            violations.push(ConsistencyViolation::PrevLinkMismatch {
                offset: leaf.offset,
                expected: expected_prev,
                found: leaf.prev,
            });
        }
        if leaf.next != expected_next {
            violations.push(ConsistencyViolation::NextLinkMismatch {
                offset: leaf.offset,
                expected: expected_next,
                found: leaf.next,
            });
        }
    }
}
