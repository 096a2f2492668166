//! Read-only views of one symbol's book, for queries and printing.

use crate::order_book::OrderBook;
use crate::types::{RestingOrder, Sequence, Side, Symbol};
use rust_decimal::Decimal;
use std::fmt;

/// One price level: aggregates, plus per-order detail when requested.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LevelSummary {
    pub price: Decimal,
    pub quantity: u64,
    pub order_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orders: Vec<RestingOrder>,
}

/// Both sides of one book, best price first.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    /// Last sequence the engine applied before this snapshot was taken.
    pub last_sequence: Option<Sequence>,
    pub bids: Vec<LevelSummary>,
    pub asks: Vec<LevelSummary>,
}

impl BookSnapshot {
    /// Captures up to `depth` levels per side (all if `None`).
    pub fn capture(
        book: &OrderBook,
        last_sequence: Option<Sequence>,
        depth: Option<usize>,
        detail: bool,
    ) -> Self {
        let summarize = |side: Side| -> Vec<LevelSummary> {
            book.ladder(side)
                .levels()
                .take(depth.unwrap_or(usize::MAX))
                .map(|(price, level)| LevelSummary {
                    price,
                    quantity: level.total_quantity(),
                    order_count: level.order_count(),
                    orders: if detail {
                        book.orders_at(side, price)
                    } else {
                        Vec::new()
                    },
                })
                .collect()
        };
        Self {
            symbol: book.symbol().clone(),
            last_sequence,
            bids: summarize(Side::Buy),
            asks: summarize(Side::Sell),
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

fn write_side(f: &mut fmt::Formatter<'_>, title: &str, levels: &[LevelSummary]) -> fmt::Result {
    writeln!(f, "  {}:", title)?;
    if levels.is_empty() {
        return writeln!(f, "    (empty)");
    }
    for level in levels {
        let noun = if level.order_count == 1 { "order" } else { "orders" };
        writeln!(
            f,
            "    {:>12}  qty {:>8}  ({} {})",
            level.price, level.quantity, level.order_count, noun
        )?;
        for order in &level.orders {
            writeln!(
                f,
                "      id {} qty {} seq {}",
                order.order_id, order.quantity, order.sequence
            )?;
        }
    }
    Ok(())
}

impl fmt::Display for BookSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last_sequence {
            Some(seq) => writeln!(f, "{} (as of seq {})", self.symbol, seq)?,
            None => writeln!(f, "{}", self.symbol)?,
        }
        write_side(f, "Buy orders", &self.bids)?;
        write_side(f, "Sell orders", &self.asks)
    }
}
