//! Price-time priority matching.
//!
//! [`match_order`] runs one admitted order against the book: takes liquidity at the
//! resting orders' prices, produces trades and book updates, rests a limit remainder
//! and reports a market remainder as unfilled.

use crate::error::{check_quantity, Error, ValidationError};
use crate::events::{BookUpdate, MarketEvent};
use crate::execution::{Execution, OrderStatus, Trade};
use crate::order_book::OrderBook;
use crate::types::{Order, OrderId, OrderType, TradeId};
use rust_decimal::Decimal;

/// Everything one incoming order caused.
#[derive(Clone, Debug)]
pub struct MatchOutcome {
    pub execution: Execution,
    /// Trades and book updates in the order they happened.
    pub events: Vec<MarketEvent>,
    /// Orders that left the book for good (filled makers, non-resting taker).
    pub completed: Vec<OrderId>,
}

/// Run matching for one order against the book.
///
/// Trade ids start at `next_trade_id`. Fails without touching the book if the order
/// is for another symbol, is a limit order with no price, or its id is already resting.
pub fn match_order(book: &mut OrderBook, order: Order, next_trade_id: u64) -> Result<MatchOutcome, Error> {
    let price_limit = match (order.order_type, order.price) {
        (OrderType::Limit, Some(p)) => Some(p),
        (OrderType::Limit, None) => {
            return Err(ValidationError::MissingLimitPrice(order.order_id).into())
        }
        (OrderType::Market, _) => None,
    };
    if &order.symbol != book.symbol() {
        return Err(ValidationError::WrongSymbol {
            order_id: order.order_id,
            expected: book.symbol().clone(),
            actual: order.symbol,
        }
        .into());
    }
    if book.contains(order.order_id) {
        return Err(ValidationError::DuplicateOrderId(order.order_id).into());
    }
    check_quantity(order.quantity)?;
    if let Some(price) = price_limit {
        // Fills only touch the other side, so the remainder will fit if the whole order does.
        if order.quantity > book.level_headroom(order.side, price) {
            return Err(ValidationError::LevelFull(price).into());
        }
    }

    let symbol = book.symbol().clone();
    let fills = book.take_liquidity(order.side, price_limit, order.quantity);

    let mut trades = Vec::with_capacity(fills.len());
    let mut events = Vec::with_capacity(fills.len() * 2 + 1);
    let mut completed = Vec::new();
    let mut trade_id = next_trade_id;
    let mut filled_qty = 0u64;
    // None once price * quantity no longer fits a Decimal; the average is then unreported.
    let mut notional = Some(Decimal::ZERO);

    for f in &fills {
        filled_qty += f.quantity;
        notional = notional
            .and_then(|n| n.checked_add(f.price.checked_mul(Decimal::from(f.quantity))?));
        let trade = Trade {
            trade_id: TradeId(trade_id),
            symbol: symbol.clone(),
            maker_order_id: f.maker_order_id,
            taker_order_id: order.order_id,
            taker_side: order.side,
            price: f.price,
            quantity: f.quantity,
            sequence: order.sequence,
        };
        trade_id += 1;
        events.push(MarketEvent::Trade(trade.clone()));
        events.push(MarketEvent::BookUpdate(BookUpdate::from_level(
            &symbol,
            order.sequence,
            f.level,
        )));
        trades.push(trade);
        if f.maker_filled() {
            completed.push(f.maker_order_id);
        }
    }

    let avg_price = match notional {
        Some(n) if filled_qty > 0 => n.checked_div(Decimal::from(filled_qty)),
        _ => None,
    };
    let remaining = order.quantity - filled_qty;

    let mut resting_quantity = 0;
    let mut unfilled_quantity = 0;
    let status = if remaining == 0 {
        completed.push(order.order_id);
        OrderStatus::Filled
    } else if order.is_limit() {
        // Remainder goes to the back of its level: time priority is "now".
        let mut rest = order.clone();
        rest.quantity = remaining;
        let level = book.add_order(rest)?;
        events.push(MarketEvent::BookUpdate(BookUpdate::from_level(
            &symbol,
            order.sequence,
            level,
        )));
        resting_quantity = remaining;
        if filled_qty > 0 {
            OrderStatus::PartiallyFilledResting
        } else {
            OrderStatus::Resting
        }
    } else {
        // A market order has no price to rest at.
        unfilled_quantity = remaining;
        completed.push(order.order_id);
        if filled_qty > 0 {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Unfilled
        }
    };

    Ok(MatchOutcome {
        execution: Execution {
            order_id: order.order_id,
            symbol,
            sequence: order.sequence,
            status,
            filled_quantity: filled_qty,
            resting_quantity,
            unfilled_quantity,
            avg_price,
            trades,
        },
        events,
        completed,
    })
}
