//! Node Pool - slab of tree nodes with an index-threaded free list.
//!
//! Tree nodes live in one contiguous `Vec` and link to each other by
//! `u32` index. Removed nodes go back on the free list and are handed out
//! again before the slab grows, so sustained insert/remove churn settles
//! into zero allocations.

use std::fmt;

use serde::Serialize;

use crate::order::{Order, Price};

/// Sentinel value representing an absent child / empty free list
pub const NULL_INDEX: u32 = u32::MAX;

/// Index of a node inside the pool
pub type NodeIndex = u32;

/// A single AVL tree node.
///
/// `price` is duplicated out of the payload so descent never touches the
/// order itself.
#[derive(Clone, Debug)]
pub struct TreeNode {
    /// Price of the payload (0 while on the free list)
    pub price: Price,
    /// Resting order; `None` while the node is on the free list
    pub order: Option<Order>,
    /// Left child (prices `<=` this node)
    pub left: NodeIndex,
    /// Right child
    pub right: NodeIndex,
    /// Height of the subtree rooted here; a leaf is 0
    pub height: i32,
    /// Free list link, only meaningful while the node is free
    next_free: NodeIndex,
}

impl TreeNode {
    /// Create an empty/unlinked node (for the free list)
    #[inline]
    const fn empty() -> Self {
        Self {
            price: 0,
            order: None,
            left: NULL_INDEX,
            right: NULL_INDEX,
            height: 0,
            next_free: NULL_INDEX,
        }
    }

    /// Reset the node for reuse, handing back its payload.
    #[inline]
    fn reset(&mut self) -> Option<Order> {
        self.price = 0;
        self.left = NULL_INDEX;
        self.right = NULL_INDEX;
        self.height = 0;
        self.order.take()
    }
}

/// Allocation counters for a [`NodePool`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Fresh nodes created (slab growth)
    pub allocated: u64,
    /// Acquisitions served from the free list
    pub reused: u64,
    /// Nodes returned to the free list
    pub recycled: u64,
    /// Nodes currently holding an order
    pub live: u32,
    /// Nodes currently on the free list
    pub free: u32,
}

/// Growable pool of tree nodes.
///
/// All mutation goes through `&mut self`; the pool belongs to exactly one
/// order book and is guarded by that book's lock.
pub struct NodePool {
    /// Contiguous block of nodes
    nodes: Vec<TreeNode>,
    /// Head of the free list
    free_head: NodeIndex,
    /// Number of nodes on the free list
    free_count: u32,
    allocated: u64,
    reused: u64,
    recycled: u64,
}

impl NodePool {
    /// Create an empty pool; nodes are allocated on demand.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a pool with `capacity` nodes pre-threaded on the free list.
    ///
    /// # Panics
    /// Panics if capacity reaches `NULL_INDEX`.
    pub fn with_capacity(capacity: u32) -> Self {
        assert!(capacity < NULL_INDEX, "Capacity must be less than NULL_INDEX");

        let mut nodes = vec![TreeNode::empty(); capacity as usize];

        // Each free node points at the following one
        for i in 1..capacity {
            nodes[(i - 1) as usize].next_free = i;
        }

        Self {
            nodes,
            free_head: if capacity > 0 { 0 } else { NULL_INDEX },
            free_count: capacity,
            allocated: capacity as u64,
            reused: 0,
            recycled: 0,
        }
    }

    /// Take a node for `order`, growing the slab only if the free list is empty.
    ///
    /// The returned node has no children and height 0.
    #[inline]
    pub fn acquire(&mut self, order: Order) -> NodeIndex {
        let index = if self.free_head == NULL_INDEX {
            let index = self.nodes.len() as u32;
            assert!(index < NULL_INDEX, "node pool exhausted the index space");
            self.nodes.push(TreeNode::empty());
            self.allocated += 1;
            index
        } else {
            let index = self.free_head;
            self.free_head = self.nodes[index as usize].next_free;
            self.free_count -= 1;
            self.reused += 1;
            index
        };

        let node = &mut self.nodes[index as usize];
        node.next_free = NULL_INDEX;
        node.left = NULL_INDEX;
        node.right = NULL_INDEX;
        node.height = 0;
        node.price = order.price();
        node.order = Some(order);
        index
    }

    /// Return a node to the free list, handing back its payload.
    ///
    /// The caller must have unlinked the node from its tree.
    #[inline]
    pub fn release(&mut self, index: NodeIndex) -> Option<Order> {
        debug_assert!((index as usize) < self.nodes.len(), "Index out of bounds");

        let node = &mut self.nodes[index as usize];
        debug_assert!(node.order.is_some(), "Double release detected");
        let order = node.reset();
        node.next_free = self.free_head;
        self.free_head = index;
        self.free_count += 1;
        self.recycled += 1;
        order
    }

    #[inline]
    pub fn get(&self, index: NodeIndex) -> &TreeNode {
        &self.nodes[index as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, index: NodeIndex) -> &mut TreeNode {
        &mut self.nodes[index as usize]
    }

    /// Number of nodes currently holding an order.
    #[inline]
    pub fn live(&self) -> u32 {
        self.nodes.len() as u32 - self.free_count
    }

    /// Total nodes in the slab (live + free).
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated,
            reused: self.reused,
            recycled: self.recycled,
            live: self.live(),
            free: self.free_count,
        }
    }

    /// Pre-fault the slab so the first inserts don't page in memory.
    pub fn warm_up(&mut self) {
        for node in &mut self.nodes {
            let height = node.height;
            // Volatile write to prevent optimization
            unsafe {
                std::ptr::write_volatile(&mut node.height, height);
            }
        }
    }
}

impl Default for NodePool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePool")
            .field("capacity", &self.capacity())
            .field("live", &self.live())
            .field("free_head", &self.free_head)
            .field("allocated", &self.allocated)
            .field("recycled", &self.recycled)
            .finish()
    }
}
