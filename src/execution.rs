//! Trades and per-order execution results.
//!
//! [`Trade`] is emitted for each match between a resting maker and an incoming taker.
//! [`Execution`] summarises what happened to one incoming order.

use crate::types::{OrderId, Sequence, Side, Symbol, TradeId};
use rust_decimal::Decimal;

/// One executed match. Immutable once emitted.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub symbol: Symbol,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    pub taker_side: Side,
    pub price: Decimal,
    pub quantity: u64,
    /// Sequence of the taker that caused the match.
    pub sequence: Sequence,
}

impl Trade {
    pub fn buy_order_id(&self) -> OrderId {
        match self.taker_side {
            Side::Buy => self.taker_order_id,
            Side::Sell => self.maker_order_id,
        }
    }

    pub fn sell_order_id(&self) -> OrderId {
        match self.taker_side {
            Side::Buy => self.maker_order_id,
            Side::Sell => self.taker_order_id,
        }
    }
}

/// Where an incoming order ended up after matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OrderStatus {
    /// Limit order, nothing matched, all of it rests.
    Resting,
    /// Limit order, part matched, remainder rests.
    PartiallyFilledResting,
    Filled,
    /// Market order, part matched, remainder discarded.
    PartiallyFilled,
    /// Market order, no liquidity at all.
    Unfilled,
}

impl OrderStatus {
    /// True when the order no longer rests anywhere.
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Resting | OrderStatus::PartiallyFilledResting)
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Execution {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub sequence: Sequence,
    pub status: OrderStatus,
    pub filled_quantity: u64,
    pub resting_quantity: u64,
    /// Market remainder that found no liquidity. Reported, never rested.
    pub unfilled_quantity: u64,
    pub avg_price: Option<Decimal>,
    pub trades: Vec<Trade>,
}

impl Execution {
    pub fn has_unfilled_remainder(&self) -> bool {
        self.unfilled_quantity > 0
    }
}
