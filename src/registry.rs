//! Order id → location index for one symbol's book.
//!
//! Cancel and modify go through here instead of scanning ladders. Entries are only
//! written by [`crate::OrderBook`], in the same step as the matching ladder change.

use crate::error::Error;
use crate::ladder::Slot;
use crate::types::{OrderId, Side};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Where a resting order sits: ladder side, price level, slot within the ladder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub side: Side,
    pub price: Decimal,
    pub slot: Slot,
}

#[derive(Debug, Default)]
pub struct OrderRegistry {
    entries: HashMap<OrderId, Location>,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `location` for `order_id`. Returns the previous entry, which callers
    /// treat as a broken invariant.
    pub fn register(&mut self, order_id: OrderId, location: Location) -> Option<Location> {
        self.entries.insert(order_id, location)
    }

    pub fn locate(&self, order_id: OrderId) -> Result<Location, Error> {
        self.entries
            .get(&order_id)
            .copied()
            .ok_or(Error::NotFound(order_id))
    }

    pub fn unregister(&mut self, order_id: OrderId) -> Option<Location> {
        self.entries.remove(&order_id)
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.entries.contains_key(&order_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
