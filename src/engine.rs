//! Per-symbol matching engine.
//!
//! Holds one symbol's [`OrderBook`] and trade id counter, runs [`match_order`] for
//! submissions, and handles cancel, modify, locate and snapshot. Every event it
//! produces goes to its [`EventSink`] before the call returns.
//!
//! An engine is single-threaded by construction (`&mut self`); the
//! [`crate::Dispatcher`] gives each one to exactly one worker.

use crate::error::{check_quantity, Error, Result, ValidationError};
use crate::events::{BookUpdate, EventSink, MarketEvent};
use crate::execution::Execution;
use crate::matching::{match_order, MatchOutcome};
use crate::order_book::OrderBook;
use crate::snapshot::BookSnapshot;
use crate::types::{Order, OrderId, RestingOrder, Sequence, Side, Symbol};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Acknowledgement of a successful cancel.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CancelAck {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub sequence: Sequence,
    pub side: Side,
    pub price: Decimal,
    pub cancelled_quantity: u64,
}

/// What a modify did to the order's time priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Priority {
    /// Same price, quantity not increased: reduced in place, queue position kept.
    Retained,
    /// Price changed or quantity increased: cancelled and re-entered under the new sequence.
    Reset,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModifyAck {
    pub order_id: OrderId,
    pub symbol: Symbol,
    /// Sequence of the modify request itself.
    pub sequence: Sequence,
    pub priority: Priority,
    /// Matching result of the re-entered order when priority was reset.
    pub execution: Option<Execution>,
}

pub struct SymbolEngine {
    symbol: Symbol,
    book: OrderBook,
    next_trade_id: u64,
    last_sequence: Option<Sequence>,
    sink: Arc<dyn EventSink>,
    completed: Vec<OrderId>,
}

impl SymbolEngine {
    pub fn new(symbol: Symbol, sink: Arc<dyn EventSink>) -> Self {
        Self {
            book: OrderBook::new(symbol.clone()),
            symbol,
            next_trade_id: 1,
            last_sequence: None,
            sink,
            completed: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Commands must arrive in strictly increasing sequence order.
    fn advance(&mut self, sequence: Sequence) {
        if let Some(last) = self.last_sequence {
            assert!(
                sequence > last,
                "{}: sequence {} applied after {}",
                self.symbol,
                sequence,
                last
            );
        }
        self.last_sequence = Some(sequence);
    }

    /// Matches an admitted order and rests any limit remainder.
    pub fn submit(&mut self, order: Order) -> Result<Execution> {
        info!(
            "order submitted symbol={} order_id={} seq={} side={:?} type={:?} quantity={} price={:?}",
            self.symbol, order.order_id, order.sequence, order.side, order.order_type, order.quantity, order.price
        );
        self.advance(order.sequence);
        let order_id = order.order_id;
        match match_order(&mut self.book, order, self.next_trade_id) {
            Ok(outcome) => Ok(self.apply(outcome)),
            Err(e) => {
                warn!("order rejected symbol={} order_id={}: {}", self.symbol, order_id, e);
                Err(e)
            }
        }
    }

    fn apply(&mut self, outcome: MatchOutcome) -> Execution {
        let MatchOutcome {
            execution,
            events,
            completed,
        } = outcome;
        self.next_trade_id += execution.trades.len() as u64;
        for trade in &execution.trades {
            info!(
                "trade symbol={} trade_id={} maker={} taker={} price={} quantity={}",
                trade.symbol, trade.trade_id.0, trade.maker_order_id, trade.taker_order_id, trade.price, trade.quantity
            );
        }
        for event in events {
            self.publish(event);
        }
        self.completed.extend(completed);
        info!(
            "execution symbol={} order_id={} status={:?} filled={} resting={} unfilled={}",
            self.symbol,
            execution.order_id,
            execution.status,
            execution.filled_quantity,
            execution.resting_quantity,
            execution.unfilled_quantity
        );
        execution
    }

    fn publish(&self, event: MarketEvent) {
        if let MarketEvent::BookUpdate(update) = &event {
            debug!(
                "book update symbol={} side={:?} price={} quantity={} orders={}",
                update.symbol, update.side, update.price, update.quantity, update.order_count
            );
        }
        self.sink.publish(event);
    }

    /// Removes a resting order. `NotFound` if it already filled or was cancelled.
    pub fn cancel(&mut self, order_id: OrderId, sequence: Sequence) -> Result<CancelAck> {
        self.advance(sequence);
        let (order, level) = self.book.cancel_order(order_id)?;
        self.publish(MarketEvent::BookUpdate(BookUpdate::from_level(
            &self.symbol,
            sequence,
            level,
        )));
        self.completed.push(order_id);
        info!(
            "order canceled symbol={} order_id={} seq={} quantity={}",
            self.symbol, order_id, sequence, order.quantity
        );
        Ok(CancelAck {
            order_id,
            symbol: self.symbol.clone(),
            sequence,
            side: order.side,
            price: level.price,
            cancelled_quantity: order.quantity,
        })
    }

    /// Changes a resting order's quantity and/or price.
    ///
    /// Same (or no) price and `quantity` not above the current remaining quantity:
    /// in-place reduction, [`Priority::Retained`]. Otherwise the order is cancelled
    /// and re-entered as a new limit order under `sequence`, which may trade;
    /// [`Priority::Reset`].
    pub fn modify(
        &mut self,
        order_id: OrderId,
        quantity: u64,
        price: Option<Decimal>,
        sequence: Sequence,
    ) -> Result<ModifyAck> {
        self.advance(sequence);
        check_quantity(quantity)?;
        if let Some(p) = price {
            if p <= Decimal::ZERO {
                return Err(ValidationError::InvalidPrice(p).into());
            }
        }
        let current = self
            .book
            .order(order_id)
            .cloned()
            .ok_or(Error::NotFound(order_id))?;
        let price_changed = price.is_some_and(|p| Some(p) != current.price);

        if !price_changed && quantity <= current.quantity {
            if quantity < current.quantity {
                let level = self.book.reduce_order(order_id, quantity)?;
                self.publish(MarketEvent::BookUpdate(BookUpdate::from_level(
                    &self.symbol,
                    sequence,
                    level,
                )));
            }
            info!(
                "order modified in place symbol={} order_id={} seq={} quantity {} -> {}",
                self.symbol, order_id, sequence, current.quantity, quantity
            );
            return Ok(ModifyAck {
                order_id,
                symbol: self.symbol.clone(),
                sequence,
                priority: Priority::Retained,
                execution: None,
            });
        }

        if let Some(target) = price.or(current.price) {
            let mut headroom = self.book.level_headroom(current.side, target);
            if Some(target) == current.price {
                headroom = headroom.saturating_add(current.quantity);
            }
            // Refused up front so the original keeps its place.
            if quantity > headroom {
                return Err(ValidationError::LevelFull(target).into());
            }
        }

        let (cancelled, level) = self.book.cancel_order(order_id)?;
        self.publish(MarketEvent::BookUpdate(BookUpdate::from_level(
            &self.symbol,
            sequence,
            level,
        )));
        info!(
            "order replaced symbol={} order_id={} seq={} quantity {} -> {} price {:?} -> {:?}",
            self.symbol, order_id, sequence, cancelled.quantity, quantity, cancelled.price, price
        );
        let replacement = Order {
            quantity,
            price: price.or(cancelled.price),
            sequence,
            ..cancelled
        };
        let outcome = match match_order(&mut self.book, replacement, self.next_trade_id) {
            Ok(outcome) => outcome,
            Err(e) => {
                // Already off the book.
                self.completed.push(order_id);
                return Err(e);
            }
        };
        let execution = self.apply(outcome);
        Ok(ModifyAck {
            order_id,
            symbol: self.symbol.clone(),
            sequence,
            priority: Priority::Reset,
            execution: Some(execution),
        })
    }

    pub fn locate(&self, order_id: OrderId) -> Result<RestingOrder> {
        self.book.locate(order_id)
    }

    /// Up to `depth` levels per side (all if `None`), with per-order detail if asked.
    pub fn snapshot(&self, depth: Option<usize>, detail: bool) -> BookSnapshot {
        BookSnapshot::capture(&self.book, self.last_sequence, depth, detail)
    }

    /// Orders that left the book since the last call.
    pub fn take_completed(&mut self) -> Vec<OrderId> {
        std::mem::take(&mut self.completed)
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn last_sequence(&self) -> Option<Sequence> {
        self.last_sequence
    }

    /// Best bid price, if any.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.book.best_bid()
    }

    /// Best ask price, if any.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.book.best_ask()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use crate::execution::OrderStatus;
    use crate::types::OrderRequest;

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    struct Harness {
        engine: SymbolEngine,
        log: EventLog,
        seq: u64,
    }

    impl Harness {
        fn new() -> Self {
            init_log();
            let log = EventLog::new();
            Self {
                engine: SymbolEngine::new(Symbol::from("RVNL"), Arc::new(log.clone())),
                log,
                seq: 0,
            }
        }

        fn next_seq(&mut self) -> Sequence {
            self.seq += 1;
            Sequence(self.seq)
        }

        fn limit(&mut self, id: u64, side: Side, qty: u64, price: Decimal) -> Execution {
            let seq = self.next_seq();
            let order = OrderRequest::limit(id, "RVNL", side, qty, price).into_order(seq);
            self.engine.submit(order).unwrap()
        }

        fn market(&mut self, id: u64, side: Side, qty: u64) -> Execution {
            let seq = self.next_seq();
            let order = OrderRequest::market(id, "RVNL", side, qty).into_order(seq);
            self.engine.submit(order).unwrap()
        }

        fn cancel(&mut self, id: u64) -> Result<CancelAck> {
            let seq = self.next_seq();
            self.engine.cancel(OrderId(id), seq)
        }

        fn modify(&mut self, id: u64, qty: u64, price: Option<Decimal>) -> Result<ModifyAck> {
            let seq = self.next_seq();
            self.engine.modify(OrderId(id), qty, price, seq)
        }
    }

    fn px(units: i64, scale: u32) -> Decimal {
        Decimal::new(units, scale)
    }

    #[test]
    fn full_match_at_460_10_empties_both_sides() {
        let mut h = Harness::new();
        h.limit(1, Side::Sell, 10, px(46010, 2));
        let exec = h.limit(2, Side::Buy, 10, px(46010, 2));
        assert_eq!(exec.trades.len(), 1);
        assert_eq!(exec.trades[0].price, px(46010, 2));
        assert_eq!(exec.trades[0].quantity, 10);
        assert_eq!(exec.status, OrderStatus::Filled);
        assert!(h.engine.best_bid().is_none());
        assert!(h.engine.best_ask().is_none());
        assert!(h.engine.locate(OrderId(1)).unwrap_err().is_not_found());
        assert!(h.engine.locate(OrderId(2)).unwrap_err().is_not_found());
        let mut completed = h.engine.take_completed();
        completed.sort();
        assert_eq!(completed, vec![OrderId(1), OrderId(2)]);
    }

    #[test]
    fn partial_fill_leaves_resting_buy_locatable() {
        let mut h = Harness::new();
        h.limit(1, Side::Buy, 20, Decimal::from(100));
        let exec = h.limit(2, Side::Sell, 10, Decimal::from(100));
        assert_eq!(exec.trades.len(), 1);
        assert_eq!(exec.trades[0].quantity, 10);
        let resting = h.engine.locate(OrderId(1)).unwrap();
        assert_eq!(resting.quantity, 10);
        assert_eq!(resting.price, Decimal::from(100));
    }

    #[test]
    fn trade_ids_continue_across_submissions() {
        let mut h = Harness::new();
        h.limit(1, Side::Sell, 5, Decimal::from(100));
        h.limit(2, Side::Sell, 5, Decimal::from(100));
        let first = h.limit(3, Side::Buy, 5, Decimal::from(100));
        let second = h.limit(4, Side::Buy, 5, Decimal::from(100));
        assert_eq!(first.trades[0].trade_id.0, 1);
        assert_eq!(second.trades[0].trade_id.0, 2);
    }

    #[test]
    fn events_reach_sink_in_order() {
        let mut h = Harness::new();
        h.limit(1, Side::Sell, 10, Decimal::from(100));
        h.limit(2, Side::Buy, 4, Decimal::from(100));
        let events = h.log.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], MarketEvent::BookUpdate(_)));
        assert!(matches!(events[1], MarketEvent::Trade(_)));
        assert!(matches!(events[2], MarketEvent::BookUpdate(ref u) if u.quantity == 6));
        let seqs: Vec<u64> = events.iter().map(|e| e.sequence().0).collect();
        assert_eq!(seqs, vec![1, 2, 2]);
    }

    #[test]
    fn market_buy_on_empty_book_reports_unfilled() {
        let mut h = Harness::new();
        let exec = h.market(1, Side::Buy, 25);
        assert!(exec.trades.is_empty());
        assert_eq!(exec.unfilled_quantity, 25);
        assert_eq!(exec.status, OrderStatus::Unfilled);
        assert!(!h.engine.book().has_resting_orders());
        assert!(h.log.events().is_empty());
    }

    #[test]
    fn cancel_resting_order_emits_level_removal() {
        let mut h = Harness::new();
        h.limit(1, Side::Sell, 5, Decimal::from(100));
        let ack = h.cancel(1).unwrap();
        assert_eq!(ack.cancelled_quantity, 5);
        assert_eq!(ack.sequence, Sequence(2));
        assert!(h.engine.best_ask().is_none());
        match h.log.events().last() {
            Some(MarketEvent::BookUpdate(u)) => assert_eq!(u.quantity, 0),
            other => panic!("expected book update, got {:?}", other),
        }
    }

    #[test]
    fn cancel_filled_order_is_not_found_and_leaves_book_alone() {
        let mut h = Harness::new();
        h.limit(1, Side::Sell, 5, Decimal::from(100));
        h.limit(2, Side::Buy, 5, Decimal::from(100));
        h.limit(3, Side::Buy, 7, Decimal::from(99));
        let before = h.engine.snapshot(None, true);
        let events_before = h.log.events().len();
        assert!(h.cancel(1).unwrap_err().is_not_found());
        let after = h.engine.snapshot(None, true);
        assert_eq!(before.bids, after.bids);
        assert_eq!(before.asks, after.asks);
        assert_eq!(h.log.events().len(), events_before);
    }

    #[test]
    fn modify_reduce_same_price_keeps_priority() {
        let mut h = Harness::new();
        h.limit(1, Side::Sell, 10, Decimal::from(100));
        h.limit(2, Side::Sell, 10, Decimal::from(100));
        let ack = h.modify(1, 4, Some(Decimal::from(100))).unwrap();
        assert_eq!(ack.priority, Priority::Retained);
        assert!(ack.execution.is_none());
        let exec = h.limit(3, Side::Buy, 4, Decimal::from(100));
        assert_eq!(exec.trades[0].maker_order_id, OrderId(1));
        assert!(h.engine.locate(OrderId(1)).unwrap_err().is_not_found());
    }

    #[test]
    fn modify_price_change_loses_priority() {
        let mut h = Harness::new();
        h.limit(1, Side::Sell, 10, Decimal::from(101));
        h.limit(2, Side::Sell, 10, Decimal::from(100));
        let ack = h.modify(1, 10, Some(Decimal::from(100))).unwrap();
        assert_eq!(ack.priority, Priority::Reset);
        let resting = h.engine.locate(OrderId(1)).unwrap();
        assert_eq!(resting.sequence, ack.sequence);
        let exec = h.limit(3, Side::Buy, 10, Decimal::from(100));
        assert_eq!(exec.trades[0].maker_order_id, OrderId(2));
    }

    #[test]
    fn modify_quantity_increase_resets_priority() {
        let mut h = Harness::new();
        h.limit(1, Side::Buy, 5, Decimal::from(100));
        h.limit(2, Side::Buy, 5, Decimal::from(100));
        let ack = h.modify(1, 8, None).unwrap();
        assert_eq!(ack.priority, Priority::Reset);
        let exec = h.limit(3, Side::Sell, 5, Decimal::from(100));
        assert_eq!(exec.trades[0].maker_order_id, OrderId(2));
        assert_eq!(h.engine.locate(OrderId(1)).unwrap().quantity, 8);
    }

    #[test]
    fn modify_to_marketable_price_trades() {
        let mut h = Harness::new();
        h.limit(1, Side::Sell, 5, Decimal::from(100));
        h.limit(2, Side::Buy, 5, Decimal::from(98));
        let ack = h.modify(2, 5, Some(Decimal::from(100))).unwrap();
        let exec = ack.execution.expect("re-entered order executes");
        assert_eq!(exec.status, OrderStatus::Filled);
        assert_eq!(exec.trades[0].maker_order_id, OrderId(1));
        assert!(!h.engine.book().has_resting_orders());
    }

    #[test]
    fn modify_unknown_or_invalid() {
        let mut h = Harness::new();
        assert!(h.modify(9, 5, None).unwrap_err().is_not_found());
        h.limit(1, Side::Buy, 5, Decimal::from(100));
        assert!(h.modify(1, 0, None).unwrap_err().is_rejection());
        assert!(h.modify(1, 5, Some(Decimal::ZERO)).unwrap_err().is_rejection());
        assert_eq!(h.engine.locate(OrderId(1)).unwrap().quantity, 5);
    }

    #[test]
    fn modify_above_quantity_cap_keeps_original() {
        let mut h = Harness::new();
        h.limit(1, Side::Buy, 5, Decimal::from(100));
        h.limit(2, Side::Buy, 5, Decimal::from(100));
        let err = h.modify(1, u64::MAX / 2 + 1, Some(Decimal::from(99))).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::QuantityTooLarge { .. })
        ));
        let ids: Vec<OrderId> = h
            .engine
            .book()
            .orders_at(Side::Buy, Decimal::from(100))
            .iter()
            .map(|o| o.order_id)
            .collect();
        assert_eq!(ids, vec![OrderId(1), OrderId(2)]);
        assert!(h.engine.take_completed().is_empty());
        h.engine.book().assert_consistent();
    }

    #[test]
    fn submit_for_other_symbol_is_rejected() {
        let mut h = Harness::new();
        let order = OrderRequest::limit(1, "TATASTEEL", Side::Buy, 5, Decimal::from(100)).into_order(Sequence(1));
        let err = h.engine.submit(order).unwrap_err();
        assert!(err.is_rejection());
        assert!(!h.engine.book().has_resting_orders());
    }

    #[test]
    #[should_panic]
    fn out_of_order_sequence_is_fatal() {
        let mut h = Harness::new();
        h.limit(1, Side::Buy, 5, Decimal::from(100));
        let stale = OrderRequest::limit(2, "RVNL", Side::Buy, 5, Decimal::from(100)).into_order(Sequence(1));
        let _ = h.engine.submit(stale);
    }
}
