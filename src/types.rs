//! Core types and IDs for the matching core.
//!
//! Identifiers are newtype wrappers. [`OrderRequest`] is what producers submit;
//! [`Order`] is the admitted form carrying its [`Sequence`].

use rust_decimal::Decimal;
use std::fmt;

/// Largest quantity a single order may carry. Keeps level totals and notionals far from overflow.
pub const MAX_ORDER_QUANTITY: u64 = 1_000_000_000_000;

/// Unique order identifier. Must be positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-symbol trade identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TradeId(pub u64);

/// Global admission sequence number. Strictly increasing across all symbols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Sequence(pub u64);

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tradable symbol, e.g. `RVNL`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Symbol {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Whether a taker on this side with `limit` may trade against a resting price.
    pub fn crosses(self, limit: Decimal, resting_price: Decimal) -> bool {
        match self {
            Side::Buy => resting_price <= limit,
            Side::Sell => resting_price >= limit,
        }
    }
}

/// Order type: limit (with price) or market (take best available).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

/// Order as submitted by a producer, before admission.
///
/// For limit orders `price` must be `Some(...)`. For market orders it is ignored.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OrderRequest {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: u64,
    #[serde(default)]
    pub price: Option<Decimal>,
}

impl OrderRequest {
    pub fn limit(order_id: u64, symbol: impl Into<Symbol>, side: Side, quantity: u64, price: Decimal) -> Self {
        Self {
            order_id: OrderId(order_id),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
        }
    }

    pub fn market(order_id: u64, symbol: impl Into<Symbol>, side: Side, quantity: u64) -> Self {
        Self {
            order_id: OrderId(order_id),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
        }
    }

    /// Admits the request under `sequence`. Market orders drop any supplied price.
    pub fn into_order(self, sequence: Sequence) -> Order {
        let price = match self.order_type {
            OrderType::Limit => self.price,
            OrderType::Market => None,
        };
        Order {
            order_id: self.order_id,
            symbol: self.symbol,
            side: self.side,
            order_type: self.order_type,
            price,
            quantity: self.quantity,
            sequence,
        }
    }
}

/// Admitted order. `quantity` is the remaining quantity and only ever decreases.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub quantity: u64,
    pub sequence: Sequence,
}

impl Order {
    pub fn is_limit(&self) -> bool {
        matches!(self.order_type, OrderType::Limit)
    }

    pub fn is_market(&self) -> bool {
        matches!(self.order_type, OrderType::Market)
    }
}

/// A resting order as seen from outside the book (snapshots, locate).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RestingOrder {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Decimal,
    pub quantity: u64,
    pub sequence: Sequence,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_crosses_at_or_below_limit() {
        let limit = Decimal::from(100);
        assert!(Side::Buy.crosses(limit, Decimal::from(99)));
        assert!(Side::Buy.crosses(limit, Decimal::from(100)));
        assert!(!Side::Buy.crosses(limit, Decimal::from(101)));
    }

    #[test]
    fn sell_crosses_at_or_above_limit() {
        let limit = Decimal::from(100);
        assert!(Side::Sell.crosses(limit, Decimal::from(101)));
        assert!(Side::Sell.crosses(limit, Decimal::from(100)));
        assert!(!Side::Sell.crosses(limit, Decimal::from(99)));
    }

    #[test]
    fn market_request_drops_price_on_admission() {
        let mut request = OrderRequest::market(7, "RVNL", Side::Sell, 10);
        request.price = Some(Decimal::from(5));
        let order = request.into_order(Sequence(3));
        assert_eq!(order.price, None);
        assert_eq!(order.sequence, Sequence(3));
        assert!(order.is_market());
    }

    #[test]
    fn symbol_serializes_as_plain_string() {
        let json = serde_json::to_string(&Symbol::from("TATASTEEL")).unwrap();
        assert_eq!(json, "\"TATASTEEL\"");
    }
}
