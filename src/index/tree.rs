use log::debug;

use crate::heap::Locator;

use super::error::{BPlusTreeError, BPlusTreeResult};
use super::node::{BPlusNode, InternalNode, NodeId};
use super::{IndexKey, NodePool};

/// Persistent B+ tree over the index node pool
///
/// The tree itself carries only the fan-out bound; node state lives in
/// the index file and flows through the frame pool one node at a time,
/// and the root/height metadata lives in the pool's store. A node splits
/// as soon as it reaches `max_keys` keys.
///
/// Equal-key routing is asymmetric on purpose: searches descend left of
/// an equal routing key and then walk the leaf chain rightward, while
/// inserts descend right so duplicates append after their predecessors.
/// Either half alone would lose duplicates that straddle a split.
pub struct BPlusTree {
    max_keys: usize,
}

impl BPlusTree {
    /// Create a tree with the given maximum keys per node (`m >= 2`)
    pub fn new(max_keys: usize) -> BPlusTreeResult<Self> {
        if max_keys < 2 {
            return Err(BPlusTreeError::InvalidFanout(max_keys));
        }
        Ok(Self { max_keys })
    }

    /// Maximum keys a node may hold before it must split
    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    /// Cached tree height; 0 when the root is a leaf. No I/O.
    pub fn height(&self, pool: &NodePool) -> u64 {
        pool.store().height()
    }

    /// Collect every locator stored under `key`, in leaf-chain order
    pub fn search(&self, pool: &mut NodePool, key: IndexKey) -> BPlusTreeResult<Vec<Locator>> {
        let mut node_id = pool.store().root_id();

        // descend to the leftmost leaf that can hold the key
        loop {
            let next = match pool.load(node_id)? {
                BPlusNode::Leaf(_) => break,
                BPlusNode::Internal(node) => node.child_for_search(key).1,
            };
            node_id = next;
        }

        let mut out = Vec::new();
        let mut current = Some(node_id);
        while let Some(id) = current {
            let leaf = pool
                .load(id)?
                .as_leaf()
                .ok_or(BPlusTreeError::WrongNodeVariant(id))?;
            let saw_greater = leaf.collect_equal(key, &mut out);
            current = if saw_greater { None } else { leaf.next_leaf };
        }
        Ok(out)
    }

    /// Insert a `(key, locator)` pair; duplicates are appended, never
    /// deduplicated. Splits propagate upward and a root split grows the
    /// tree by one level.
    pub fn insert(
        &self,
        pool: &mut NodePool,
        key: IndexKey,
        locator: Locator,
    ) -> BPlusTreeResult<()> {
        let root_id = pool.store().root_id();

        if let Some((separator, right_id)) = self.insert_into(pool, root_id, key, locator)? {
            let new_root_id = pool.store_mut().allocate_node_id()?;
            let new_height = pool.store().height() + 1;

            let root = BPlusNode::Internal(InternalNode::new(
                new_root_id,
                vec![separator],
                vec![root_id, right_id],
            ));
            pool.put(root)?;
            pool.mark_dirty(new_root_id);
            pool.store_mut().set_root(new_root_id, new_height)?;
            debug!(
                "root split: new root {} at height {}",
                new_root_id, new_height
            );
        }
        Ok(())
    }

    /// Recursive insert below `node_id`; returns the separator and new
    /// right sibling id when this node split
    fn insert_into(
        &self,
        pool: &mut NodePool,
        node_id: NodeId,
        key: IndexKey,
        locator: Locator,
    ) -> BPlusTreeResult<Option<(IndexKey, NodeId)>> {
        // Routing info is copied out before descending: the recursion
        // below may evict this node's frame.
        let descend = match pool.load(node_id)? {
            BPlusNode::Leaf(_) => None,
            BPlusNode::Internal(node) => Some(node.child_for_insert(key)),
        };

        match descend {
            None => self.insert_into_leaf(pool, node_id, key, locator),
            Some((child_pos, child_id)) => {
                let split = self.insert_into(pool, child_id, key, locator)?;
                let Some((separator, new_child)) = split else {
                    return Ok(None);
                };

                let needs_split = {
                    let node = pool
                        .load(node_id)?
                        .as_internal_mut()
                        .ok_or(BPlusTreeError::WrongNodeVariant(node_id))?;
                    node.insert_split(child_pos, separator, new_child);
                    node.len() >= self.max_keys
                };
                pool.mark_dirty(node_id);
                if !needs_split {
                    return Ok(None);
                }

                let right_id = pool.store_mut().allocate_node_id()?;
                let (promoted, right) = {
                    let node = pool
                        .load(node_id)?
                        .as_internal_mut()
                        .ok_or(BPlusTreeError::WrongNodeVariant(node_id))?;
                    node.split(right_id)
                };
                pool.mark_dirty(node_id);
                pool.put(BPlusNode::Internal(right))?;
                pool.mark_dirty(right_id);
                Ok(Some((promoted, right_id)))
            }
        }
    }

    fn insert_into_leaf(
        &self,
        pool: &mut NodePool,
        node_id: NodeId,
        key: IndexKey,
        locator: Locator,
    ) -> BPlusTreeResult<Option<(IndexKey, NodeId)>> {
        let needs_split = {
            let leaf = pool
                .load(node_id)?
                .as_leaf_mut()
                .ok_or(BPlusTreeError::WrongNodeVariant(node_id))?;
            leaf.insert(key, locator);
            leaf.len() >= self.max_keys
        };
        pool.mark_dirty(node_id);
        if !needs_split {
            return Ok(None);
        }

        let right_id = pool.store_mut().allocate_node_id()?;
        let (separator, right) = {
            let leaf = pool
                .load(node_id)?
                .as_leaf_mut()
                .ok_or(BPlusTreeError::WrongNodeVariant(node_id))?;
            leaf.split(right_id)
        };
        pool.mark_dirty(node_id);
        pool.put(BPlusNode::Leaf(right))?;
        pool.mark_dirty(right_id);
        Ok(Some((separator, right_id)))
    }
}
