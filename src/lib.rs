//! # Symbol Matcher
//!
//! Price-time priority matching core for a single venue: one order book per
//! symbol, owned by exactly one worker thread, with globally sequenced admission.
//!
//! ## Entry point
//!
//! Use [`Dispatcher`]: start it with a [`DispatcherConfig`], then
//! [`Dispatcher::submit`], [`Dispatcher::cancel`], [`Dispatcher::modify`],
//! [`Dispatcher::book`] and [`Dispatcher::locate`]. Trades and book updates are
//! streamed through [`Dispatcher::subscribe`].
//!
//! ## Example
//!
//! ```rust
//! use symbol_matcher::{Dispatcher, DispatcherConfig, OrderRequest, OrderStatus, Side, Symbol};
//! use rust_decimal::Decimal;
//!
//! let dispatcher = Dispatcher::start(DispatcherConfig::with_symbols(["RVNL"]).workers(1)).unwrap();
//! let price = Decimal::new(46010, 2);
//! dispatcher
//!     .submit_and_wait(OrderRequest::limit(1, "RVNL", Side::Sell, 10, price))
//!     .unwrap();
//! let execution = dispatcher
//!     .submit_and_wait(OrderRequest::limit(2, "RVNL", Side::Buy, 10, price))
//!     .unwrap();
//! assert_eq!(execution.status, OrderStatus::Filled);
//! assert_eq!(execution.trades[0].price, price);
//! assert!(dispatcher.book(&Symbol::from("RVNL"), false).unwrap().is_empty());
//! ```
//!
//! ## Lower-level API
//!
//! [`SymbolEngine`] runs one symbol on the caller's thread; [`OrderBook`] and
//! [`match_order`] can be used directly if you manage sequences and trade ids yourself.

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod execution;
pub mod ladder;
pub mod loader;
pub mod market_data_gen;
pub mod matching;
pub mod order_book;
pub mod registry;
pub mod snapshot;
pub mod types;

pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, DrainReport, Ticket};
pub use engine::{CancelAck, ModifyAck, Priority, SymbolEngine};
pub use error::{Error, Result, ValidationError};
pub use events::{BookUpdate, EventFeed, EventLog, EventSink, MarketEvent};
pub use execution::{Execution, OrderStatus, Trade};
pub use loader::LoadError;
pub use market_data_gen::{
    replay_into_dispatcher, replay_into_engine, split_by_symbol, Generator, GeneratorConfig, ReplaySummary,
};
pub use matching::{match_order, MatchOutcome};
pub use order_book::{Fill, LevelState, OrderBook};
pub use snapshot::{BookSnapshot, LevelSummary};
pub use types::{
    Order, OrderId, OrderRequest, OrderType, RestingOrder, Sequence, Side, Symbol, TradeId,
    MAX_ORDER_QUANTITY,
};
