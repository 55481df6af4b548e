//! Persistent B+ tree index on harvest year

mod error;
mod node;
mod store;
mod tree;

pub use error::{BPlusTreeError, BPlusTreeResult, IndexError, IndexResult};
pub use node::{BPlusNode, InternalNode, LeafNode, NodeId};
pub use store::{IndexFileStore, IndexMetadata};
pub use tree::BPlusTree;

use crate::buffer::FramePool;

/// Key type of the index (harvest year)
pub type IndexKey = i32;

/// Frame pool specialized to index nodes
pub type NodePool = FramePool<IndexFileStore>;
