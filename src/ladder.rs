//! One side of one symbol's book: price levels in best-first order, FIFO per level.
//!
//! Orders live in a [`Slab`] arena and each level is a doubly-linked queue threaded
//! through it, so an order can be removed by its [`Slot`] in O(1) without scanning
//! or disturbing its neighbours' positions. Levels sit in a `BTreeMap` keyed by
//! price and are dropped the moment they become empty.

use crate::types::{Order, Side};
use rust_decimal::Decimal;
use slab::Slab;
use std::collections::BTreeMap;

/// Stable position of a resting order inside its ladder.
pub type Slot = usize;

#[derive(Debug)]
struct Node {
    price: Decimal,
    order: Order,
    prev: Option<Slot>,
    next: Option<Slot>,
}

/// Queue head/tail plus aggregates for one price.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PriceLevel {
    head: Option<Slot>,
    tail: Option<Slot>,
    total_quantity: u64,
    order_count: usize,
}

impl PriceLevel {
    pub fn total_quantity(&self) -> u64 {
        self.total_quantity
    }

    pub fn order_count(&self) -> usize {
        self.order_count
    }

    pub fn is_empty(&self) -> bool {
        self.order_count == 0
    }
}

#[derive(Debug)]
pub struct Ladder {
    side: Side,
    levels: BTreeMap<Decimal, PriceLevel>,
    nodes: Slab<Node>,
}

impl Ladder {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
            nodes: Slab::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Highest bid or lowest ask.
    pub fn best_price(&self) -> Option<Decimal> {
        match self.side {
            Side::Buy => self.levels.keys().next_back().copied(),
            Side::Sell => self.levels.keys().next().copied(),
        }
    }

    pub fn level(&self, price: Decimal) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of resting orders.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Quantity the level at `price` can still take before its total overflows.
    pub fn headroom(&self, price: Decimal) -> u64 {
        u64::MAX - self.levels.get(&price).map_or(0, |l| l.total_quantity)
    }

    /// Appends `order` to the back of the level at `price`, creating the level if absent.
    /// Returns `None`, leaving the ladder untouched, if the level total would overflow.
    pub fn insert(&mut self, price: Decimal, order: Order) -> Option<Slot> {
        let total = self
            .levels
            .get(&price)
            .map_or(0, |l| l.total_quantity)
            .checked_add(order.quantity)?;
        let slot = self.nodes.insert(Node {
            price,
            order,
            prev: None,
            next: None,
        });
        let level = self.levels.entry(price).or_default();
        let prev_tail = level.tail;
        if level.head.is_none() {
            level.head = Some(slot);
        }
        level.tail = Some(slot);
        level.total_quantity = total;
        level.order_count += 1;
        if let Some(tail) = prev_tail {
            self.nodes[tail].next = Some(slot);
        }
        self.nodes[slot].prev = prev_tail;
        Some(slot)
    }

    pub fn get(&self, slot: Slot) -> Option<&Order> {
        self.nodes.get(slot).map(|node| &node.order)
    }

    /// Oldest order at `price`.
    pub fn front(&self, price: Decimal) -> Option<(Slot, &Order)> {
        let head = self.levels.get(&price)?.head?;
        Some((head, &self.nodes[head].order))
    }

    pub fn remove_front(&mut self, price: Decimal) -> Option<Order> {
        let head = self.levels.get(&price)?.head?;
        self.remove(head)
    }

    /// Unlinks the order at `slot`. Returns `None` if the slot is vacant.
    pub fn remove(&mut self, slot: Slot) -> Option<Order> {
        if !self.nodes.contains(slot) {
            return None;
        }
        let node = self.nodes.remove(slot);
        if let Some(prev) = node.prev {
            self.nodes[prev].next = node.next;
        }
        if let Some(next) = node.next {
            self.nodes[next].prev = node.prev;
        }
        let Some(level) = self.levels.get_mut(&node.price) else {
            panic!(
                "order {} resting at {} with no level on the {:?} ladder",
                node.order.order_id, node.price, self.side
            );
        };
        if level.head == Some(slot) {
            level.head = node.next;
        }
        if level.tail == Some(slot) {
            level.tail = node.prev;
        }
        level.total_quantity -= node.order.quantity;
        level.order_count -= 1;
        if level.is_empty() {
            self.levels.remove(&node.price);
        }
        Some(node.order)
    }

    /// Takes `by` off the order at `slot` without moving it in its queue.
    /// `by` must be less than the order's quantity; use [`Ladder::remove`] to take it all.
    /// Returns the order's new quantity.
    pub fn reduce(&mut self, slot: Slot, by: u64) -> Option<u64> {
        let node = self.nodes.get_mut(slot)?;
        assert!(
            by < node.order.quantity,
            "reduce by {} would leave order {} at zero or below",
            by,
            node.order.order_id
        );
        node.order.quantity -= by;
        let remaining = node.order.quantity;
        if let Some(level) = self.levels.get_mut(&node.price) {
            level.total_quantity -= by;
        }
        Some(remaining)
    }

    /// Levels from best to worst price.
    pub fn levels(&self) -> Box<dyn Iterator<Item = (Decimal, &PriceLevel)> + '_> {
        let iter = self.levels.iter().map(|(price, level)| (*price, level));
        match self.side {
            Side::Buy => Box::new(iter.rev()),
            Side::Sell => Box::new(iter),
        }
    }

    /// Orders at `price` in time priority.
    pub fn orders_at(&self, price: Decimal) -> LevelIter<'_> {
        LevelIter {
            nodes: &self.nodes,
            cursor: self.levels.get(&price).and_then(|level| level.head),
        }
    }
}

/// FIFO walk over one level.
pub struct LevelIter<'a> {
    nodes: &'a Slab<Node>,
    cursor: Option<Slot>,
}

impl<'a> Iterator for LevelIter<'a> {
    type Item = (Slot, &'a Order);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let nodes: &'a Slab<Node> = self.nodes;
        let node = &nodes[slot];
        self.cursor = node.next;
        Some((slot, &node.order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderId, OrderType, Sequence, Symbol};

    fn order(id: u64, side: Side, qty: u64, price: i64) -> Order {
        Order {
            order_id: OrderId(id),
            symbol: Symbol::from("RVNL"),
            side,
            order_type: OrderType::Limit,
            price: Some(Decimal::from(price)),
            quantity: qty,
            sequence: Sequence(id),
        }
    }

    fn ids_at(ladder: &Ladder, price: i64) -> Vec<u64> {
        ladder
            .orders_at(Decimal::from(price))
            .map(|(_, o)| o.order_id.0)
            .collect()
    }

    #[test]
    fn ask_ladder_best_is_lowest() {
        let mut asks = Ladder::new(Side::Sell);
        asks.insert(Decimal::from(101), order(1, Side::Sell, 5, 101));
        asks.insert(Decimal::from(99), order(2, Side::Sell, 5, 99));
        asks.insert(Decimal::from(100), order(3, Side::Sell, 5, 100));
        assert_eq!(asks.best_price(), Some(Decimal::from(99)));
        let prices: Vec<Decimal> = asks.levels().map(|(p, _)| p).collect();
        assert_eq!(prices, vec![Decimal::from(99), Decimal::from(100), Decimal::from(101)]);
    }

    #[test]
    fn bid_ladder_best_is_highest() {
        let mut bids = Ladder::new(Side::Buy);
        bids.insert(Decimal::from(99), order(1, Side::Buy, 5, 99));
        bids.insert(Decimal::from(101), order(2, Side::Buy, 5, 101));
        assert_eq!(bids.best_price(), Some(Decimal::from(101)));
        let prices: Vec<Decimal> = bids.levels().map(|(p, _)| p).collect();
        assert_eq!(prices, vec![Decimal::from(101), Decimal::from(99)]);
    }

    #[test]
    fn same_price_queues_in_arrival_order() {
        let mut asks = Ladder::new(Side::Sell);
        for id in 1..=3 {
            asks.insert(Decimal::from(100), order(id, Side::Sell, 5, 100));
        }
        assert_eq!(ids_at(&asks, 100), vec![1, 2, 3]);
        let level = asks.level(Decimal::from(100)).unwrap();
        assert_eq!(level.total_quantity(), 15);
        assert_eq!(level.order_count(), 3);
        assert_eq!(asks.remove_front(Decimal::from(100)).unwrap().order_id, OrderId(1));
        assert_eq!(ids_at(&asks, 100), vec![2, 3]);
    }

    #[test]
    fn remove_middle_keeps_neighbours_linked() {
        let mut bids = Ladder::new(Side::Buy);
        let _a = bids.insert(Decimal::from(100), order(1, Side::Buy, 5, 100));
        let b = bids.insert(Decimal::from(100), order(2, Side::Buy, 7, 100)).unwrap();
        let _c = bids.insert(Decimal::from(100), order(3, Side::Buy, 9, 100));
        let removed = bids.remove(b).unwrap();
        assert_eq!(removed.order_id, OrderId(2));
        assert_eq!(ids_at(&bids, 100), vec![1, 3]);
        assert_eq!(bids.level(Decimal::from(100)).unwrap().total_quantity(), 14);
        // New arrivals still go to the back.
        bids.insert(Decimal::from(100), order(4, Side::Buy, 1, 100));
        assert_eq!(ids_at(&bids, 100), vec![1, 3, 4]);
    }

    #[test]
    fn removing_last_order_drops_level() {
        let mut asks = Ladder::new(Side::Sell);
        let slot = asks.insert(Decimal::from(100), order(1, Side::Sell, 5, 100)).unwrap();
        asks.insert(Decimal::from(101), order(2, Side::Sell, 5, 101));
        asks.remove(slot).unwrap();
        assert!(asks.level(Decimal::from(100)).is_none());
        assert_eq!(asks.best_price(), Some(Decimal::from(101)));
        assert_eq!(asks.level_count(), 1);
    }

    #[test]
    fn remove_vacant_slot_returns_none() {
        let mut asks = Ladder::new(Side::Sell);
        let slot = asks.insert(Decimal::from(100), order(1, Side::Sell, 5, 100)).unwrap();
        assert!(asks.remove(slot).is_some());
        assert!(asks.remove(slot).is_none());
        assert!(asks.is_empty());
    }

    #[test]
    fn reduce_keeps_queue_position() {
        let mut asks = Ladder::new(Side::Sell);
        let first = asks.insert(Decimal::from(100), order(1, Side::Sell, 10, 100)).unwrap();
        asks.insert(Decimal::from(100), order(2, Side::Sell, 10, 100));
        assert_eq!(asks.reduce(first, 4), Some(6));
        assert_eq!(ids_at(&asks, 100), vec![1, 2]);
        assert_eq!(asks.get(first).unwrap().quantity, 6);
        assert_eq!(asks.level(Decimal::from(100)).unwrap().total_quantity(), 16);
    }

    #[test]
    fn insert_refuses_level_total_overflow() {
        let mut asks = Ladder::new(Side::Sell);
        let half = u64::MAX / 2 + 1;
        assert!(asks.insert(Decimal::from(100), order(1, Side::Sell, half, 100)).is_some());
        assert_eq!(asks.headroom(Decimal::from(100)), u64::MAX - half);
        assert!(asks.insert(Decimal::from(100), order(2, Side::Sell, half, 100)).is_none());
        assert_eq!(ids_at(&asks, 100), vec![1]);
        assert_eq!(asks.len(), 1);
        let level = asks.level(Decimal::from(100)).unwrap();
        assert_eq!(level.total_quantity(), half);
        assert_eq!(level.order_count(), 1);
        // Other levels are unaffected.
        assert!(asks.insert(Decimal::from(101), order(3, Side::Sell, half, 101)).is_some());
    }

    #[test]
    #[should_panic]
    fn reduce_to_zero_is_refused() {
        let mut asks = Ladder::new(Side::Sell);
        let slot = asks.insert(Decimal::from(100), order(1, Side::Sell, 10, 100)).unwrap();
        asks.reduce(slot, 10);
    }
}
