//! Synthetic order generator.
//!
//! Deterministic, configurable multi-symbol order stream for replay tests, demos and
//! benches. Same config and seed give the same stream.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::dispatcher::{Dispatcher, Ticket};
use crate::engine::SymbolEngine;
use crate::error::Result;
use crate::execution::Execution;
use crate::types::{OrderRequest, Sequence, Side, Symbol};

/// Configuration for the generator. All ranges are inclusive.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub seed: u64,
    /// Symbols drawn uniformly per order.
    pub symbols: Vec<Symbol>,
    /// Number of orders [`Generator::all_orders`] returns.
    pub num_orders: usize,
    /// Probability of Buy (0.0..=1.0). Sell otherwise.
    pub buy_ratio: f64,
    /// Probability of Limit (0.0..=1.0). Market otherwise.
    pub limit_ratio: f64,
    /// Limit price range in units of `10^-price_scale`.
    pub price_min: i64,
    pub price_max: i64,
    pub price_scale: u32,
    pub quantity_min: u64,
    pub quantity_max: u64,
    pub first_order_id: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            symbols: vec![Symbol::from("RVNL")],
            num_orders: 1000,
            buy_ratio: 0.5,
            limit_ratio: 0.9,
            price_min: 9500,
            price_max: 10500,
            price_scale: 2,
            quantity_min: 1,
            quantity_max: 100,
            first_order_id: 1,
        }
    }
}

pub struct Generator {
    rng: StdRng,
    config: GeneratorConfig,
    next_order_id: u64,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            next_order_id: config.first_order_id.max(1),
            config,
        }
    }

    pub fn next_order(&mut self) -> OrderRequest {
        let order_id = self.next_order_id;
        self.next_order_id += 1;
        let symbol = match self.config.symbols.len() {
            0 => Symbol::from("RVNL"),
            n => self.config.symbols[self.rng.gen_range(0..n)].clone(),
        };
        let side = if self.rng.gen::<f64>() < self.config.buy_ratio {
            Side::Buy
        } else {
            Side::Sell
        };
        let is_limit = self.rng.gen::<f64>() < self.config.limit_ratio;
        let quantity = self
            .rng
            .gen_range(self.config.quantity_min.max(1)..=self.config.quantity_max.max(1));
        if is_limit {
            let units = self
                .rng
                .gen_range(self.config.price_min.max(1)..=self.config.price_max.max(1));
            let price = Decimal::new(units, self.config.price_scale);
            OrderRequest::limit(order_id, symbol, side, quantity, price)
        } else {
            OrderRequest::market(order_id, symbol, side, quantity)
        }
    }

    pub fn take_orders(&mut self, n: usize) -> Vec<OrderRequest> {
        (0..n).map(|_| self.next_order()).collect()
    }

    /// The full stream as defined by `config.num_orders`.
    pub fn all_orders(&mut self) -> Vec<OrderRequest> {
        self.take_orders(self.config.num_orders)
    }
}

/// Splits a stream into per-symbol streams, keeping relative order.
pub fn split_by_symbol(orders: &[OrderRequest]) -> BTreeMap<Symbol, Vec<OrderRequest>> {
    let mut streams: BTreeMap<Symbol, Vec<OrderRequest>> = BTreeMap::new();
    for order in orders {
        streams.entry(order.symbol.clone()).or_default().push(order.clone());
    }
    streams
}

/// Totals of a replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub orders: usize,
    pub trades: usize,
    pub filled_quantity: u64,
    pub unfilled_quantity: u64,
}

impl ReplaySummary {
    fn record(&mut self, execution: &Execution) {
        self.orders += 1;
        self.trades += execution.trades.len();
        self.filled_quantity += execution.filled_quantity;
        self.unfilled_quantity += execution.unfilled_quantity;
    }
}

/// Replays orders straight into one engine, numbering them from `first_sequence`.
/// Stops at the first rejected order.
pub fn replay_into_engine(
    engine: &mut SymbolEngine,
    orders: impl IntoIterator<Item = OrderRequest>,
    first_sequence: u64,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    for (i, request) in orders.into_iter().enumerate() {
        let execution = engine.submit(request.into_order(Sequence(first_sequence + i as u64)))?;
        summary.record(&execution);
    }
    Ok(summary)
}

/// Submits every order, then waits for all of them. Stops at the first rejection.
pub fn replay_into_dispatcher(
    dispatcher: &Dispatcher,
    orders: impl IntoIterator<Item = OrderRequest>,
) -> Result<ReplaySummary> {
    let tickets = orders
        .into_iter()
        .map(|request| dispatcher.submit(request))
        .collect::<Result<Vec<Ticket>>>()?;
    let mut summary = ReplaySummary::default();
    for ticket in tickets {
        summary.record(&ticket.wait()?);
    }
    Ok(summary)
}
