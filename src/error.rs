//! Error taxonomy for admission, lookups and the dispatcher lifecycle.
//!
//! A market order's unmatched remainder is not an error; it is reported in
//! [`crate::Execution::unfilled_quantity`].

use crate::types::{OrderId, Symbol, MAX_ORDER_QUANTITY};
use rust_decimal::Decimal;

/// Bad input, rejected before admission. No state changes.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("order id must be positive")]
    InvalidOrderId,
    #[error("quantity must be positive")]
    InvalidQuantity,
    #[error("quantity {quantity} exceeds the maximum of {max}")]
    QuantityTooLarge { quantity: u64, max: u64 },
    #[error("level {0} cannot hold more quantity")]
    LevelFull(Decimal),
    #[error("unknown symbol {0}")]
    UnknownSymbol(Symbol),
    #[error("limit order {0} has no limit price")]
    MissingLimitPrice(OrderId),
    #[error("price must be positive, got {0}")]
    InvalidPrice(Decimal),
    #[error("order {0} is already live")]
    DuplicateOrderId(OrderId),
    #[error("order {order_id} is for {actual}, not {expected}")]
    WrongSymbol {
        order_id: OrderId,
        expected: Symbol,
        actual: Symbol,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("rejected: {0}")]
    Validation(#[from] ValidationError),
    /// Unknown or already terminal order. Safe for callers to ignore.
    #[error("order {0} not found")]
    NotFound(OrderId),
    #[error("dispatcher is draining; no new work accepted")]
    ShuttingDown,
    #[error("worker for {0} stopped before replying")]
    WorkerUnavailable(Symbol),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Rejects zero and anything above [`MAX_ORDER_QUANTITY`].
pub fn check_quantity(quantity: u64) -> std::result::Result<(), ValidationError> {
    if quantity == 0 {
        return Err(ValidationError::InvalidQuantity);
    }
    if quantity > MAX_ORDER_QUANTITY {
        return Err(ValidationError::QuantityTooLarge {
            quantity,
            max: MAX_ORDER_QUANTITY,
        });
    }
    Ok(())
}
