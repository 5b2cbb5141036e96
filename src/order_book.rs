//! Order Book - one side of the market as an AVL tree keyed by price.
//!
//! Nodes live in a [`NodePool`] and link by index. Orders sharing a price
//! are kept as distinct nodes; insertion sends a price equal to the node's
//! to the left, and removal locates the exact order by identity.

use std::cmp::Ordering;
use std::fmt;

use arrayvec::ArrayVec;

use crate::node_pool::{NodeIndex, NodePool, PoolStats, NULL_INDEX};
use crate::order::{Order, OrderId, Price};

/// Upper bound on tree height for any tree addressable by `u32` indices
/// (an AVL tree of 2^32 nodes is at most ~46 levels deep).
const MAX_DEPTH: usize = 64;

/// Balanced binary search tree of resting orders.
pub struct OrderBook {
    /// Storage for tree nodes
    pool: NodePool,
    /// Root of the tree, `NULL_INDEX` when empty
    root: NodeIndex,
    /// Number of resting orders
    len: usize,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a new order book with `capacity` pre-allocated nodes
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            pool: NodePool::with_capacity(capacity),
            root: NULL_INDEX,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of the tree: -1 when empty, 0 for a single order.
    #[inline]
    pub fn height(&self) -> i32 {
        self.height_of(self.root)
    }

    /// The order stored at the root, if any.
    pub fn root_order(&self) -> Option<&Order> {
        if self.root == NULL_INDEX {
            return None;
        }
        self.pool.get(self.root).order.as_ref()
    }

    /// Allocation counters of the underlying node pool.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Pre-fault the node pool.
    pub fn warm_up(&mut self) {
        self.pool.warm_up();
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Insert an order, rebalancing on the way back up.
    ///
    /// # Complexity
    /// O(log n)
    pub fn insert(&mut self, order: Order) {
        self.root = self.insert_at(self.root, order);
        self.len += 1;
    }

    fn insert_at(&mut self, node: NodeIndex, order: Order) -> NodeIndex {
        if node == NULL_INDEX {
            return self.pool.acquire(order);
        }

        let price = order.price();
        let (node_price, left, right) = self.parts(node);

        if price <= node_price {
            let child = self.insert_at(left, order);
            self.pool.get_mut(node).left = child;
        } else {
            let child = self.insert_at(right, order);
            self.pool.get_mut(node).right = child;
        }

        self.rebalance_after_insert(node, price)
    }

    /// Restore balance at `node` after `price` was inserted below it.
    ///
    /// The inserted price is compared against the child exactly as the
    /// descent did, which tells which grandchild subtree grew.
    fn rebalance_after_insert(&mut self, node: NodeIndex, price: Price) -> NodeIndex {
        self.update_height(node);
        let balance = self.balance_factor(node);
        let (_, left, right) = self.parts(node);

        if balance > 1 {
            if price <= self.pool.get(left).price {
                // Left-Left
                return self.rotate_right(node);
            }
            // Left-Right
            let new_left = self.rotate_left(left);
            self.pool.get_mut(node).left = new_left;
            return self.rotate_right(node);
        }

        if balance < -1 {
            if price > self.pool.get(right).price {
                // Right-Right
                return self.rotate_left(node);
            }
            // Right-Left
            let new_right = self.rotate_right(right);
            self.pool.get_mut(node).right = new_right;
            return self.rotate_left(node);
        }

        node
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Find an order at exactly `price`.
    ///
    /// Returns the first match met by plain BST descent, which is not
    /// necessarily the oldest order at that price.
    pub fn search(&self, price: Price) -> Option<&Order> {
        let mut cur = self.root;
        while cur != NULL_INDEX {
            let node = self.pool.get(cur);
            cur = match price.cmp(&node.price) {
                Ordering::Equal => return node.order.as_ref(),
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };
        }
        None
    }

    /// Whether this exact order (by identity) is resting in the book.
    pub fn contains(&self, order: &Order) -> bool {
        self.find_at(self.root, order.price(), order.id())
    }

    fn find_at(&self, node: NodeIndex, price: Price, id: &OrderId) -> bool {
        if node == NULL_INDEX {
            return false;
        }
        let n = self.pool.get(node);
        match price.cmp(&n.price) {
            Ordering::Less => self.find_at(n.left, price, id),
            Ordering::Greater => self.find_at(n.right, price, id),
            Ordering::Equal => {
                n.order.as_ref().is_some_and(|o| o.id() == id)
                    || self.find_at(n.right, price, id)
                    || self.find_at(n.left, price, id)
            }
        }
    }

    // ========================================================================
    // Remove
    // ========================================================================

    /// Remove a specific order, matched by identity.
    ///
    /// Returns the removed order, or `None` if it was not resting here.
    ///
    /// # Complexity
    /// O(log n + k) where k is the number of orders sharing its price
    pub fn remove(&mut self, order: &Order) -> Option<Order> {
        let mut removed = None;
        self.root = self.remove_at(self.root, order.price(), order.id(), &mut removed);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    fn remove_at(
        &mut self,
        node: NodeIndex,
        price: Price,
        id: &OrderId,
        removed: &mut Option<Order>,
    ) -> NodeIndex {
        if node == NULL_INDEX {
            return NULL_INDEX;
        }

        let (node_price, left, right) = self.parts(node);

        match price.cmp(&node_price) {
            Ordering::Less => {
                let child = self.remove_at(left, price, id, removed);
                self.pool.get_mut(node).left = child;
            }
            Ordering::Greater => {
                let child = self.remove_at(right, price, id, removed);
                self.pool.get_mut(node).right = child;
            }
            Ordering::Equal => {
                let is_target = self
                    .pool
                    .get(node)
                    .order
                    .as_ref()
                    .is_some_and(|o| o.id() == id);
                if is_target {
                    return self.unlink(node, removed);
                }

                // Same price, different order. Rotations can leave equal
                // prices on either side, so try right and then left.
                let child = self.remove_at(right, price, id, removed);
                self.pool.get_mut(node).right = child;
                if removed.is_none() {
                    let child = self.remove_at(left, price, id, removed);
                    self.pool.get_mut(node).left = child;
                }
            }
        }

        self.rebalance(node)
    }

    /// Detach `node` from its subtree and return the new subtree root.
    fn unlink(&mut self, node: NodeIndex, removed: &mut Option<Order>) -> NodeIndex {
        let (_, left, right) = self.parts(node);

        if left == NULL_INDEX || right == NULL_INDEX {
            let child = if left == NULL_INDEX { right } else { left };
            *removed = self.pool.release(node);
            return child;
        }

        // Two children: the in-order successor takes this node's place.
        let (new_right, successor) = self.detach_min(right);
        self.pool.get_mut(node).right = new_right;
        if let Some(successor_order) = self.pool.release(successor) {
            let n = self.pool.get_mut(node);
            n.price = successor_order.price();
            *removed = n.order.replace(successor_order);
        }

        self.rebalance(node)
    }

    /// Cut the minimum node out of the subtree at `node`.
    ///
    /// Returns `(new subtree root, detached node)`.
    fn detach_min(&mut self, node: NodeIndex) -> (NodeIndex, NodeIndex) {
        let (_, left, right) = self.parts(node);
        if left == NULL_INDEX {
            return (right, node);
        }

        let (new_left, min) = self.detach_min(left);
        self.pool.get_mut(node).left = new_left;
        (self.rebalance(node), min)
    }

    /// Restore balance at `node` after a removal below it, choosing the
    /// rotation from the heavy child's balance factor.
    fn rebalance(&mut self, node: NodeIndex) -> NodeIndex {
        self.update_height(node);
        let balance = self.balance_factor(node);
        let (_, left, right) = self.parts(node);

        if balance > 1 {
            if self.balance_factor(left) < 0 {
                let new_left = self.rotate_left(left);
                self.pool.get_mut(node).left = new_left;
            }
            return self.rotate_right(node);
        }

        if balance < -1 {
            if self.balance_factor(right) > 0 {
                let new_right = self.rotate_right(right);
                self.pool.get_mut(node).right = new_right;
            }
            return self.rotate_left(node);
        }

        node
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Iterate resting orders in ascending price order.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self)
    }

    /// All resting orders, ascending by price.
    ///
    /// # Complexity
    /// O(n)
    pub fn in_order_traversal(&self) -> Vec<Order> {
        self.iter().cloned().collect()
    }

    // ========================================================================
    // Invariant checks
    // ========================================================================

    /// Verify ordering, stored heights and the AVL balance bound at every
    /// node, and that the order count agrees with the pool.
    pub fn is_balanced(&self) -> bool {
        self.check_subtree(self.root, None, None).is_some()
            && self.pool.live() as usize == self.len
            && self.iter().count() == self.len
    }

    /// Returns the subtree height if every invariant holds below `node`.
    fn check_subtree(&self, node: NodeIndex, lo: Option<Price>, hi: Option<Price>) -> Option<i32> {
        if node == NULL_INDEX {
            return Some(-1);
        }

        let n = self.pool.get(node);
        let order = n.order.as_ref()?;
        if order.price() != n.price
            || lo.is_some_and(|lo| n.price < lo)
            || hi.is_some_and(|hi| n.price > hi)
        {
            return None;
        }

        let left = self.check_subtree(n.left, lo, Some(n.price))?;
        let right = self.check_subtree(n.right, Some(n.price), hi)?;
        if (left - right).abs() > 1 || n.height != 1 + left.max(right) {
            return None;
        }
        Some(n.height)
    }

    // ========================================================================
    // Node helpers
    // ========================================================================

    #[inline]
    fn parts(&self, node: NodeIndex) -> (Price, NodeIndex, NodeIndex) {
        let n = self.pool.get(node);
        (n.price, n.left, n.right)
    }

    #[inline]
    fn height_of(&self, node: NodeIndex) -> i32 {
        if node == NULL_INDEX {
            -1
        } else {
            self.pool.get(node).height
        }
    }

    #[inline]
    fn update_height(&mut self, node: NodeIndex) {
        let (_, left, right) = self.parts(node);
        let height = 1 + self.height_of(left).max(self.height_of(right));
        self.pool.get_mut(node).height = height;
    }

    #[inline]
    fn balance_factor(&self, node: NodeIndex) -> i32 {
        if node == NULL_INDEX {
            return 0;
        }
        let (_, left, right) = self.parts(node);
        self.height_of(left) - self.height_of(right)
    }

    fn rotate_right(&mut self, y: NodeIndex) -> NodeIndex {
        let x = self.pool.get(y).left;
        let t2 = self.pool.get(x).right;
        self.pool.get_mut(x).right = y;
        self.pool.get_mut(y).left = t2;
        self.update_height(y);
        self.update_height(x);
        x
    }

    fn rotate_left(&mut self, x: NodeIndex) -> NodeIndex {
        let y = self.pool.get(x).right;
        let t2 = self.pool.get(y).left;
        self.pool.get_mut(y).left = x;
        self.pool.get_mut(x).right = t2;
        self.update_height(x);
        self.update_height(y);
        y
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBook")
            .field("len", &self.len)
            .field("height", &self.height())
            .field("pool", &self.pool)
            .finish()
    }
}

impl<'a> IntoIterator for &'a OrderBook {
    type Item = &'a Order;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// In-order iterator over an [`OrderBook`].
pub struct Iter<'a> {
    pool: &'a NodePool,
    stack: ArrayVec<NodeIndex, MAX_DEPTH>,
    remaining: usize,
}

impl<'a> Iter<'a> {
    fn new(book: &'a OrderBook) -> Self {
        let mut iter = Self {
            pool: &book.pool,
            stack: ArrayVec::new(),
            remaining: book.len,
        };
        iter.push_left_spine(book.root);
        iter
    }

    fn push_left_spine(&mut self, mut node: NodeIndex) {
        while node != NULL_INDEX {
            self.stack.push(node);
            node = self.pool.get(node).left;
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Order;

    fn next(&mut self) -> Option<Self::Item> {
        let pool = self.pool;
        loop {
            let node = pool.get(self.stack.pop()?);
            self.push_left_spine(node.right);
            if let Some(order) = node.order.as_ref() {
                self.remaining = self.remaining.saturating_sub(1);
                return Some(order);
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Side;

    fn buy(id: &str, price: Price) -> Order {
        Order::with_id(id, Side::Buy, price)
    }

    fn prices(book: &OrderBook) -> Vec<Price> {
        book.iter().map(Order::price).collect()
    }

    fn book_of(values: &[Price]) -> OrderBook {
        let mut book = OrderBook::new();
        for (i, p) in values.iter().enumerate() {
            book.insert(buy(&format!("o{i}"), *p));
        }
        book
    }

    #[test]
    fn test_empty_book() {
        let book = OrderBook::new();
        assert!(book.is_empty());
        assert_eq!(book.height(), -1);
        assert!(book.root_order().is_none());
        assert!(book.search(10).is_none());
        assert!(book.in_order_traversal().is_empty());
        assert!(book.is_balanced());
    }

    #[test]
    fn test_single_node_height_zero() {
        let book = book_of(&[10]);
        assert_eq!(book.height(), 0);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_ascending_inserts_stay_balanced() {
        let book = book_of(&[10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        assert!(book.height() <= 3, "height {}", book.height());
        assert_eq!(prices(&book), vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        assert!(book.is_balanced());
    }

    #[test]
    fn test_rotation_left_left() {
        let book = book_of(&[30, 20, 10]);
        assert_eq!(book.root_order().map(Order::price), Some(20));
    }

    #[test]
    fn test_rotation_right_right() {
        let book = book_of(&[10, 20, 30]);
        assert_eq!(book.root_order().map(Order::price), Some(20));
    }

    #[test]
    fn test_rotation_left_right() {
        let book = book_of(&[30, 10, 20]);
        assert_eq!(book.root_order().map(Order::price), Some(20));
    }

    #[test]
    fn test_rotation_right_left() {
        let book = book_of(&[10, 30, 20]);
        assert_eq!(book.root_order().map(Order::price), Some(20));
    }

    #[test]
    fn test_equal_price_goes_left() {
        let mut book = OrderBook::new();
        book.insert(buy("first", 50));
        book.insert(buy("second", 50));
        // Root stays "first"; "second" sits in its left subtree.
        assert_eq!(book.root_order().map(|o| o.id().as_str()), Some("first"));
        let ids: Vec<_> = book.iter().map(|o| o.id().as_str()).collect();
        assert_eq!(ids, vec!["second", "first"]);
    }

    #[test]
    fn test_search() {
        let book = book_of(&[50, 30, 70, 20, 40]);
        assert_eq!(book.search(40).map(Order::price), Some(40));
        assert_eq!(book.search(70).map(Order::price), Some(70));
        assert!(book.search(45).is_none());
    }

    #[test]
    fn test_remove_leaf_one_child_two_children() {
        let mut book = book_of(&[50, 30, 70, 20, 40, 60, 80, 10]);
        let all = book.in_order_traversal();
        let find = |p: Price| all.iter().find(|o| o.price() == p).cloned().unwrap();

        // leaf
        assert!(book.remove(&find(80)).is_some());
        assert!(book.is_balanced());
        // one child (20 has left child 10)
        assert!(book.remove(&find(20)).is_some());
        assert!(book.is_balanced());
        // two children (root)
        assert!(book.remove(&find(50)).is_some());
        assert!(book.is_balanced());

        assert_eq!(prices(&book), vec![10, 30, 40, 60, 70]);
        assert_eq!(book.len(), 5);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut empty = OrderBook::new();
        assert!(empty.remove(&buy("x", 10)).is_none());
        assert!(empty.is_empty());

        let mut book = book_of(&[10, 20, 30]);
        assert!(book.remove(&buy("nope", 20)).is_none());
        assert!(book.remove(&buy("nope", 25)).is_none());
        assert_eq!(book.len(), 3);
        assert!(book.is_balanced());
    }

    #[test]
    fn test_duplicate_prices_removable_by_identity() {
        let mut book = OrderBook::new();
        let orders: Vec<_> = ["a", "b", "c"].iter().map(|id| buy(id, 100)).collect();
        for o in &orders {
            book.insert(o.clone());
        }
        assert_eq!(book.len(), 3);
        assert_eq!(prices(&book), vec![100, 100, 100]);

        for (removed, o) in orders.iter().enumerate() {
            assert_eq!(book.remove(o).as_ref(), Some(o));
            assert!(!book.contains(o));
            assert_eq!(book.len(), 2 - removed);
            assert!(book.is_balanced());
        }
        assert!(book.search(100).is_none());
    }

    #[test]
    fn test_duplicates_scattered_by_rotation() {
        // Force equal prices onto both sides of a rotated node.
        let mut book = OrderBook::new();
        let mut inserted = Vec::new();
        for i in 0..64 {
            let o = buy(&format!("d{i}"), 100 + (i % 3));
            book.insert(o.clone());
            inserted.push(o);
        }
        assert!(book.is_balanced());

        for o in inserted.iter().rev() {
            assert!(book.contains(o));
            assert!(book.remove(o).is_some(), "failed to remove {:?}", o);
            assert!(book.is_balanced());
        }
        assert!(book.is_empty());
    }

    #[test]
    fn test_nodes_recycled_on_remove() {
        let mut book = OrderBook::new();
        for round in 0..5 {
            let orders: Vec<_> = (0..100).map(|i| buy(&format!("r{round}-{i}"), i)).collect();
            for o in &orders {
                book.insert(o.clone());
            }
            for o in &orders {
                book.remove(o);
            }
        }

        let stats = book.pool_stats();
        assert_eq!(stats.allocated, 100);
        assert_eq!(stats.recycled, 500);
        assert_eq!(stats.live, 0);
    }

    #[test]
    fn test_iter_exact_size() {
        let book = book_of(&[5, 3, 8, 1]);
        let iter = book.iter();
        assert_eq!(iter.len(), 4);
        assert_eq!((&book).into_iter().count(), 4);
    }
}
