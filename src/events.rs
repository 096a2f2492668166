//! Event feed: trades and book updates, in the order each symbol's engine applied them.
//!
//! Engines publish through the [`EventSink`] trait. [`EventFeed`] fans events out to
//! any number of channel subscribers (analytics, market data); [`EventLog`] keeps them
//! in memory for tests and replays.

use crate::execution::Trade;
use crate::order_book::LevelState;
use crate::types::{Sequence, Side, Symbol};
use crossbeam::channel::{self, Receiver, Sender};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// New aggregate state of one price level. `quantity == 0` means the level was removed.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BookUpdate {
    pub symbol: Symbol,
    pub side: Side,
    pub price: Decimal,
    pub quantity: u64,
    pub order_count: usize,
    pub sequence: Sequence,
}

impl BookUpdate {
    pub fn from_level(symbol: &Symbol, sequence: Sequence, level: LevelState) -> Self {
        Self {
            symbol: symbol.clone(),
            side: level.side,
            price: level.price,
            quantity: level.quantity,
            order_count: level.order_count,
            sequence,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum MarketEvent {
    Trade(Trade),
    BookUpdate(BookUpdate),
}

impl MarketEvent {
    pub fn symbol(&self) -> &Symbol {
        match self {
            MarketEvent::Trade(t) => &t.symbol,
            MarketEvent::BookUpdate(u) => &u.symbol,
        }
    }

    pub fn sequence(&self) -> Sequence {
        match self {
            MarketEvent::Trade(t) => t.sequence,
            MarketEvent::BookUpdate(u) => u.sequence,
        }
    }

    pub fn as_trade(&self) -> Option<&Trade> {
        match self {
            MarketEvent::Trade(t) => Some(t),
            MarketEvent::BookUpdate(_) => None,
        }
    }
}

/// Destination for engine events. Implementations must be callable from any worker.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: MarketEvent);
}

/// Broadcast feed backed by unbounded crossbeam channels. Clones share subscribers.
///
/// Workers publish under a shared read lock; the write lock is taken only to
/// subscribe or to prune dropped receivers.
#[derive(Clone, Default)]
pub struct EventFeed {
    subscribers: Arc<RwLock<Vec<Sender<MarketEvent>>>>,
}

impl EventFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives every event published after this call.
    pub fn subscribe(&self) -> Receiver<MarketEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl EventSink for EventFeed {
    fn publish(&self, event: MarketEvent) {
        let dead: Vec<Sender<MarketEvent>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|tx| tx.send(event.clone()).is_err())
            .cloned()
            .collect();
        if dead.is_empty() {
            return;
        }
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| !dead.iter().any(|d| d.same_channel(tx)));
    }
}

/// In-memory sink. Clone shares the same backing buffer.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<MarketEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MarketEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.events()
            .iter()
            .filter_map(MarketEvent::as_trade)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for EventLog {
    fn publish(&self, event: MarketEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
