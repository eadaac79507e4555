//! Disk-based B+ tree.
//!
//! # Structure
//!
//! - Internal nodes hold separator keys and child page offsets. Separators
//!   are routing copies only; every value lives in a leaf.
//! - Leaf nodes hold key/value entries and are doubly linked in key order
//!   for iteration in either direction.
//!
//! Every mutation is staged in a `Workspace` and committed as a unit, so a
//! failed operation leaves the tree as it was.

mod check;
mod cursor;
mod node;
mod tree;
mod workspace;

pub use check::ConsistencyViolation;
pub use cursor::{Cursor, Direction, Entries, Keys};
pub use node::{InternalNode, LeafEntry, LeafNode, Node, NodeError};
pub use tree::BTree;
