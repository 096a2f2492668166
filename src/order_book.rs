//! Single-symbol order book: bid and ask ladders plus the order registry.
//!
//! Every method that touches a ladder updates the registry in the same call with no
//! fallible step in between, so the two never disagree once a method returns.
//! Liquidity taking is used by [`crate::matching`].

use crate::error::{Error, ValidationError};
use crate::ladder::{Ladder, Slot};
use crate::registry::{Location, OrderRegistry};
use crate::types::{Order, OrderId, RestingOrder, Side, Symbol};
use rust_decimal::Decimal;

/// Aggregate state of one level after a change. `quantity == 0` means the level is gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelState {
    pub side: Side,
    pub price: Decimal,
    pub quantity: u64,
    pub order_count: usize,
}

/// Result of taking liquidity from the book (one per resting order touched).
#[derive(Clone, Debug)]
pub struct Fill {
    pub maker_order_id: OrderId,
    pub price: Decimal,
    pub quantity: u64,
    /// Maker quantity left after this fill; zero means it left the book.
    pub maker_remaining: u64,
    pub level: LevelState,
}

impl Fill {
    pub fn maker_filled(&self) -> bool {
        self.maker_remaining == 0
    }
}

#[derive(Debug)]
pub struct OrderBook {
    symbol: Symbol,
    bids: Ladder,
    asks: Ladder,
    registry: OrderRegistry,
}

fn level_state(ladder: &Ladder, price: Decimal) -> LevelState {
    let level = ladder.level(price);
    LevelState {
        side: ladder.side(),
        price,
        quantity: level.map_or(0, |l| l.total_quantity()),
        order_count: level.map_or(0, |l| l.order_count()),
    }
}

/// Panics unless `slot` holds `order_id`. A mismatch means lost or phantom liquidity.
fn check_slot(ladder: &Ladder, slot: Slot, order_id: OrderId) {
    match ladder.get(slot) {
        Some(order) if order.order_id == order_id => {}
        Some(order) => panic!(
            "registry maps order {} to slot {} holding order {}",
            order_id, slot, order.order_id
        ),
        None => panic!("registry maps order {} to vacant slot {}", order_id, slot),
    }
}

impl OrderBook {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: Ladder::new(Side::Buy),
            asks: Ladder::new(Side::Sell),
            registry: OrderRegistry::new(),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn ladder(&self, side: Side) -> &Ladder {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn parts_mut(&mut self, side: Side) -> (&mut Ladder, &mut OrderRegistry) {
        match side {
            Side::Buy => (&mut self.bids, &mut self.registry),
            Side::Sell => (&mut self.asks, &mut self.registry),
        }
    }

    /// Rests a limit order at the back of its price level. Does not run matching.
    pub fn add_order(&mut self, order: Order) -> Result<LevelState, Error> {
        let order_id = order.order_id;
        let price = order
            .price
            .ok_or(ValidationError::MissingLimitPrice(order_id))?;
        if order.symbol != self.symbol {
            return Err(ValidationError::WrongSymbol {
                order_id,
                expected: self.symbol.clone(),
                actual: order.symbol,
            }
            .into());
        }
        if order.quantity == 0 {
            return Err(ValidationError::InvalidQuantity.into());
        }
        if self.registry.contains(order_id) {
            return Err(ValidationError::DuplicateOrderId(order_id).into());
        }
        let side = order.side;
        let (ladder, registry) = self.parts_mut(side);
        let Some(slot) = ladder.insert(price, order) else {
            return Err(ValidationError::LevelFull(price).into());
        };
        if let Some(previous) = registry.register(order_id, Location { side, price, slot }) {
            panic!("order {} registered twice (was {:?})", order_id, previous);
        }
        Ok(level_state(ladder, price))
    }

    /// Quantity that can still rest at `price` on `side`.
    pub fn level_headroom(&self, side: Side, price: Decimal) -> u64 {
        self.ladder(side).headroom(price)
    }

    /// Removes a resting order. `NotFound` if it already filled or was cancelled.
    pub fn cancel_order(&mut self, order_id: OrderId) -> Result<(Order, LevelState), Error> {
        let location = self.registry.locate(order_id)?;
        let (ladder, registry) = self.parts_mut(location.side);
        check_slot(ladder, location.slot, order_id);
        let Some(order) = ladder.remove(location.slot) else {
            panic!("slot {} vanished while cancelling order {}", location.slot, order_id);
        };
        registry.unregister(order_id);
        Ok((order, level_state(ladder, location.price)))
    }

    /// Lowers a resting order's quantity in place; time priority is kept.
    /// `new_quantity` must be positive and below the current quantity.
    pub fn reduce_order(&mut self, order_id: OrderId, new_quantity: u64) -> Result<LevelState, Error> {
        let location = self.registry.locate(order_id)?;
        let (ladder, _) = self.parts_mut(location.side);
        check_slot(ladder, location.slot, order_id);
        let current = ladder.get(location.slot).map_or(0, |o| o.quantity);
        if new_quantity == 0 || new_quantity >= current {
            return Err(ValidationError::InvalidQuantity.into());
        }
        ladder.reduce(location.slot, current - new_quantity);
        Ok(level_state(ladder, location.price))
    }

    /// Takes up to `quantity` from the side opposite `taker_side`, best price first and
    /// FIFO within a price. With `price_limit` set, stops at the first level the taker
    /// would not cross; `None` takes whatever is there (market order).
    ///
    /// Each step re-reads the front of the best level, so removals never invalidate
    /// a traversal in progress.
    pub fn take_liquidity(
        &mut self,
        taker_side: Side,
        price_limit: Option<Decimal>,
        quantity: u64,
    ) -> Vec<Fill> {
        let maker_side = taker_side.opposite();
        let mut remaining = quantity;
        let mut fills = Vec::new();
        while remaining > 0 {
            let (ladder, registry) = self.parts_mut(maker_side);
            let Some(price) = ladder.best_price() else {
                break;
            };
            if let Some(limit) = price_limit {
                if !taker_side.crosses(limit, price) {
                    break;
                }
            }
            let Some((slot, maker)) = ladder.front(price) else {
                panic!("empty level {} left on the {:?} ladder", price, maker_side);
            };
            let maker_order_id = maker.order_id;
            let available = maker.quantity;
            let fill_qty = remaining.min(available);
            remaining -= fill_qty;
            let maker_remaining = available - fill_qty;
            if maker_remaining == 0 {
                ladder.remove(slot);
                registry.unregister(maker_order_id);
            } else {
                ladder.reduce(slot, fill_qty);
            }
            fills.push(Fill {
                maker_order_id,
                price,
                quantity: fill_qty,
                maker_remaining,
                level: level_state(ladder, price),
            });
        }
        fills
    }

    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        let location = self.registry.locate(order_id).ok()?;
        self.ladder(location.side).get(location.slot)
    }

    pub fn locate(&self, order_id: OrderId) -> Result<RestingOrder, Error> {
        let location = self.registry.locate(order_id)?;
        let ladder = self.ladder(location.side);
        check_slot(ladder, location.slot, order_id);
        let order = ladder
            .get(location.slot)
            .ok_or(Error::NotFound(order_id))?;
        Ok(self.resting(order, location.price))
    }

    fn resting(&self, order: &Order, price: Decimal) -> RestingOrder {
        RestingOrder {
            order_id: order.order_id,
            symbol: self.symbol.clone(),
            side: order.side,
            price,
            quantity: order.quantity,
            sequence: order.sequence,
        }
    }

    /// Resting orders at one price in time priority.
    pub fn orders_at(&self, side: Side, price: Decimal) -> Vec<RestingOrder> {
        self.ladder(side)
            .orders_at(price)
            .map(|(_, order)| self.resting(order, price))
            .collect()
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.registry.contains(order_id)
    }

    /// Number of resting orders on both sides.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn has_resting_orders(&self) -> bool {
        !self.registry.is_empty()
    }

    /// Best bid price (None if empty).
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.best_price()
    }

    /// Best ask price (None if empty).
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.best_price()
    }

    /// Checks every structural invariant and panics on the first violation:
    /// level ordering, one price per level, aggregates, FIFO by sequence,
    /// registry/ladder agreement, and an uncrossed book.
    pub fn assert_consistent(&self) {
        for ladder in [&self.bids, &self.asks] {
            let side = ladder.side();
            let mut previous: Option<Decimal> = None;
            for (price, level) in ladder.levels() {
                if let Some(prev) = previous {
                    match side {
                        Side::Buy => assert!(price < prev, "bid levels out of order at {}", price),
                        Side::Sell => assert!(price > prev, "ask levels out of order at {}", price),
                    }
                }
                previous = Some(price);
                assert!(!level.is_empty(), "empty level {} kept on {:?}", price, side);
                let mut quantity = 0;
                let mut count = 0;
                let mut last_sequence = None;
                for (slot, order) in ladder.orders_at(price) {
                    assert_eq!(order.price, Some(price), "order {} in wrong level", order.order_id);
                    assert_eq!(order.side, side, "order {} on wrong side", order.order_id);
                    assert!(order.quantity > 0, "order {} resting at zero", order.order_id);
                    if let Some(seq) = last_sequence {
                        assert!(order.sequence > seq, "level {} out of time priority", price);
                    }
                    last_sequence = Some(order.sequence);
                    match self.registry.locate(order.order_id) {
                        Ok(location) => assert_eq!(location, Location { side, price, slot }),
                        Err(_) => panic!("order {} resting but not registered", order.order_id),
                    }
                    quantity += order.quantity;
                    count += 1;
                }
                assert_eq!(quantity, level.total_quantity(), "level {} aggregate drifted", price);
                assert_eq!(count, level.order_count(), "level {} count drifted", price);
            }
        }
        assert_eq!(
            self.registry.len(),
            self.bids.len() + self.asks.len(),
            "registry and ladders disagree on resting order count"
        );
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            assert!(bid < ask, "crossed book: bid {} >= ask {}", bid, ask);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderType, Sequence};

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

    fn book() -> OrderBook {
        OrderBook::new(Symbol::from("RVNL"))
    }

    #[test]
    fn add_and_cancel_order() {
        let mut book = book();
        let level = book.add_order(order(1, Side::Buy, 10, 100)).unwrap();
        assert_eq!(level.quantity, 10);
        assert_eq!(book.best_bid(), Some(Decimal::from(100)));
        let (cancelled, level) = book.cancel_order(OrderId(1)).unwrap();
        assert_eq!(cancelled.quantity, 10);
        assert_eq!(level.quantity, 0);
        assert!(book.best_bid().is_none());
        book.assert_consistent();
    }

    #[test]
    fn cancel_twice_is_not_found() {
        let mut book = book();
        book.add_order(order(1, Side::Sell, 10, 100)).unwrap();
        book.cancel_order(OrderId(1)).unwrap();
        assert!(book.cancel_order(OrderId(1)).unwrap_err().is_not_found());
    }

    #[test]
    fn add_order_limit_without_price_returns_err() {
        let mut book = book();
        let mut o = order(1, Side::Buy, 10, 100);
        o.price = None;
        let err = book.add_order(o).unwrap_err();
        assert!(err.to_string().contains("price"));
        assert!(!book.has_resting_orders());
    }

    #[test]
    fn add_order_wrong_symbol_returns_err() {
        let mut book = book();
        let mut o = order(1, Side::Buy, 10, 100);
        o.symbol = Symbol::from("TATASTEEL");
        assert!(matches!(
            book.add_order(o),
            Err(Error::Validation(ValidationError::WrongSymbol { .. }))
        ));
    }

    #[test]
    fn add_order_duplicate_id_returns_err() {
        let mut book = book();
        book.add_order(order(1, Side::Buy, 10, 100)).unwrap();
        assert!(matches!(
            book.add_order(order(1, Side::Buy, 5, 99)),
            Err(Error::Validation(ValidationError::DuplicateOrderId(OrderId(1))))
        ));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn add_order_refuses_overflowing_level() {
        let mut book = book();
        let half = u64::MAX / 2 + 1;
        book.add_order(order(1, Side::Sell, half, 100)).unwrap();
        assert_eq!(book.level_headroom(Side::Sell, Decimal::from(100)), u64::MAX - half);
        assert_eq!(book.level_headroom(Side::Buy, Decimal::from(100)), u64::MAX);
        assert!(matches!(
            book.add_order(order(2, Side::Sell, half, 100)),
            Err(Error::Validation(ValidationError::LevelFull(p))) if p == Decimal::from(100)
        ));
        assert!(!book.contains(OrderId(2)));
        assert_eq!(book.len(), 1);
        book.assert_consistent();
    }

    #[test]
    fn reduce_order_keeps_priority() {
        let mut book = book();
        book.add_order(order(1, Side::Sell, 10, 100)).unwrap();
        book.add_order(order(2, Side::Sell, 10, 100)).unwrap();
        let level = book.reduce_order(OrderId(1), 4).unwrap();
        assert_eq!(level.quantity, 14);
        let ids: Vec<OrderId> = book
            .orders_at(Side::Sell, Decimal::from(100))
            .iter()
            .map(|o| o.order_id)
            .collect();
        assert_eq!(ids, vec![OrderId(1), OrderId(2)]);
        book.assert_consistent();
    }

    #[test]
    fn reduce_order_rejects_increase_and_zero() {
        let mut book = book();
        book.add_order(order(1, Side::Sell, 10, 100)).unwrap();
        assert!(book.reduce_order(OrderId(1), 10).unwrap_err().is_rejection());
        assert!(book.reduce_order(OrderId(1), 0).unwrap_err().is_rejection());
        assert!(book.reduce_order(OrderId(2), 1).unwrap_err().is_not_found());
    }

    #[test]
    fn take_liquidity_walks_levels_best_first() {
        let mut book = book();
        book.add_order(order(1, Side::Sell, 5, 101)).unwrap();
        book.add_order(order(2, Side::Sell, 5, 100)).unwrap();
        book.add_order(order(3, Side::Sell, 5, 102)).unwrap();
        let fills = book.take_liquidity(Side::Buy, Some(Decimal::from(101)), 20);
        let makers: Vec<OrderId> = fills.iter().map(|f| f.maker_order_id).collect();
        assert_eq!(makers, vec![OrderId(2), OrderId(1)]);
        assert!(fills.iter().all(Fill::maker_filled));
        assert_eq!(book.best_ask(), Some(Decimal::from(102)));
        assert!(!book.contains(OrderId(1)));
        assert!(!book.contains(OrderId(2)));
        book.assert_consistent();
    }

    #[test]
    fn take_liquidity_partial_leaves_maker_at_front() {
        let mut book = book();
        book.add_order(order(1, Side::Buy, 10, 100)).unwrap();
        book.add_order(order(2, Side::Buy, 10, 100)).unwrap();
        let fills = book.take_liquidity(Side::Sell, None, 4);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].maker_remaining, 6);
        assert_eq!(fills[0].level.quantity, 16);
        assert_eq!(fills[0].level.order_count, 2);
        assert_eq!(book.locate(OrderId(1)).unwrap().quantity, 6);
        book.assert_consistent();
    }

    #[test]
    fn take_liquidity_stops_at_unmarketable_price() {
        let mut book = book();
        book.add_order(order(1, Side::Buy, 10, 99)).unwrap();
        let fills = book.take_liquidity(Side::Sell, Some(Decimal::from(100)), 10);
        assert!(fills.is_empty());
        assert_eq!(book.best_bid(), Some(Decimal::from(99)));
    }

    #[test]
    fn locate_reports_resting_detail() {
        let mut book = book();
        book.add_order(order(7, Side::Buy, 3, 98)).unwrap();
        let resting = book.locate(OrderId(7)).unwrap();
        assert_eq!(resting.price, Decimal::from(98));
        assert_eq!(resting.quantity, 3);
        assert_eq!(resting.side, Side::Buy);
        assert_eq!(resting.sequence, Sequence(7));
        assert!(book.locate(OrderId(8)).unwrap_err().is_not_found());
    }
}
