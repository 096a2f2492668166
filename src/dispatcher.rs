//! Sequencer and dispatcher: admission, global sequencing, per-symbol worker ownership.
//!
//! Every request passes the admission gate, which validates it, assigns the next
//! [`Sequence`] and enqueues it on the owning worker's channel before the gate is
//! released. Per-symbol queue order therefore equals sequence order. Each symbol is
//! owned by exactly one worker thread, so a book is never touched concurrently and
//! no lock spans more than one symbol's book.
//!
//! Queries come in two strengths:
//! - [`Dispatcher::book`] and [`Dispatcher::locate`] go through the symbol's queue
//!   and see every command sequenced before them;
//! - [`Dispatcher::published_book`] returns the last snapshot the worker published,
//!   without waiting.
//!
//! A worker that stops (panics) drops its reply channels; callers get
//! [`Error::WorkerUnavailable`] instead of blocking forever.

use crate::config::DispatcherConfig;
use crate::engine::{CancelAck, ModifyAck, SymbolEngine};
use crate::error::{check_quantity, Error, Result, ValidationError};
use crate::events::{EventFeed, EventSink, MarketEvent};
use crate::execution::Execution;
use crate::snapshot::BookSnapshot;
use crate::types::{OrderId, OrderRequest, OrderType, RestingOrder, Sequence, Symbol};
use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

type Directory = Arc<Mutex<HashMap<OrderId, Symbol>>>;
type Published = Arc<RwLock<HashMap<Symbol, Arc<BookSnapshot>>>>;

enum Command {
    Submit {
        order: crate::types::Order,
        reply: Sender<Result<Execution>>,
    },
    Cancel {
        order_id: OrderId,
        sequence: Sequence,
        reply: Sender<Result<CancelAck>>,
    },
    Modify {
        order_id: OrderId,
        quantity: u64,
        price: Option<Decimal>,
        sequence: Sequence,
        reply: Sender<Result<ModifyAck>>,
    },
    Snapshot {
        detail: bool,
        reply: Sender<BookSnapshot>,
    },
    Locate {
        order_id: OrderId,
        reply: Sender<Result<RestingOrder>>,
    },
}

struct Job {
    symbol: Symbol,
    command: Command,
}

struct Gate {
    next_sequence: u64,
    /// `None` once shutdown has started.
    queues: Option<Vec<Sender<Job>>>,
}

struct Worker {
    index: usize,
    symbols: Vec<Symbol>,
    handle: JoinHandle<usize>,
}

/// Handle to an accepted submission.
#[derive(Debug)]
pub struct Ticket {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub sequence: Sequence,
    reply: Receiver<Result<Execution>>,
}

impl Ticket {
    /// Blocks until the owning worker has matched the order.
    pub fn wait(self) -> Result<Execution> {
        match self.reply.recv() {
            Ok(result) => result,
            Err(_) => Err(Error::WorkerUnavailable(self.symbol)),
        }
    }
}

/// Result of a drained shutdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub workers: usize,
    /// Commands (including queries) the workers processed over their lifetime.
    pub commands_processed: usize,
}

pub struct Dispatcher {
    gate: Mutex<Gate>,
    routes: HashMap<Symbol, usize>,
    symbols: Vec<Symbol>,
    directory: Directory,
    published: Published,
    workers: Mutex<Vec<Worker>>,
    feed: EventFeed,
}

impl Dispatcher {
    pub fn start(config: DispatcherConfig) -> Result<Self> {
        Self::start_with_feed(config, EventFeed::new())
    }

    /// Starts the pool publishing into an existing feed.
    pub fn start_with_feed(config: DispatcherConfig, feed: EventFeed) -> Result<Self> {
        config.validate()?;
        let pool = config.workers.min(config.symbols.len());
        let sink: Arc<dyn EventSink> = Arc::new(feed.clone());
        let directory: Directory = Arc::new(Mutex::new(HashMap::new()));

        let mut routes = HashMap::new();
        let mut shards: Vec<HashMap<Symbol, SymbolEngine>> = (0..pool).map(|_| HashMap::new()).collect();
        let mut initial = HashMap::new();
        for (i, symbol) in config.symbols.iter().enumerate() {
            let engine = SymbolEngine::new(symbol.clone(), Arc::clone(&sink));
            initial.insert(
                symbol.clone(),
                Arc::new(engine.snapshot(Some(config.published_depth), false)),
            );
            routes.insert(symbol.clone(), i % pool);
            shards[i % pool].insert(symbol.clone(), engine);
        }
        let published: Published = Arc::new(RwLock::new(initial));

        let mut queues = Vec::with_capacity(pool);
        let mut workers = Vec::with_capacity(pool);
        for (index, engines) in shards.into_iter().enumerate() {
            let (tx, rx) = channel::unbounded();
            let mut symbols: Vec<Symbol> = engines.keys().cloned().collect();
            symbols.sort();
            let ctx = WorkerContext {
                index,
                directory: Arc::clone(&directory),
                published: Arc::clone(&published),
                published_depth: config.published_depth,
            };
            let handle = thread::Builder::new()
                .name(format!("matcher-{}", index))
                .spawn(move || ctx.run(engines, rx))?;
            queues.push(tx);
            workers.push(Worker {
                index,
                symbols,
                handle,
            });
        }
        info!(
            "dispatcher started workers={} symbols={}",
            pool,
            config.symbols.len()
        );

        Ok(Self {
            gate: Mutex::new(Gate {
                next_sequence: 1,
                queues: Some(queues),
            }),
            routes,
            symbols: config.symbols,
            directory,
            published,
            workers: Mutex::new(workers),
            feed,
        })
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Receives every event published after this call.
    pub fn subscribe(&self) -> Receiver<MarketEvent> {
        self.feed.subscribe()
    }

    fn lock_gate(&self) -> std::sync::MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_directory(&self) -> std::sync::MutexGuard<'_, HashMap<OrderId, Symbol>> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn route(&self, symbol: &Symbol) -> Result<usize> {
        self.routes
            .get(symbol)
            .copied()
            .ok_or_else(|| ValidationError::UnknownSymbol(symbol.clone()).into())
    }

    /// Sends while the caller holds the gate.
    fn send(&self, gate: &Gate, job: Job) -> Result<()> {
        let worker = self.route(&job.symbol)?;
        let queues = gate.queues.as_ref().ok_or(Error::ShuttingDown)?;
        queues[worker]
            .send(job)
            .map_err(|e| Error::WorkerUnavailable(e.into_inner().symbol))
    }

    fn take_sequence(gate: &mut Gate) -> Result<Sequence> {
        if gate.queues.is_none() {
            return Err(Error::ShuttingDown);
        }
        let sequence = Sequence(gate.next_sequence);
        gate.next_sequence += 1;
        Ok(sequence)
    }

    fn symbol_of(&self, order_id: OrderId) -> Result<Symbol> {
        self.lock_directory()
            .get(&order_id)
            .cloned()
            .ok_or(Error::NotFound(order_id))
    }

    /// Validates, sequences and enqueues an order. Returns once the order is queued.
    pub fn submit(&self, request: OrderRequest) -> Result<Ticket> {
        validate(&request)?;
        self.route(&request.symbol)?;

        let mut gate = self.lock_gate();
        if gate.queues.is_none() {
            return Err(Error::ShuttingDown);
        }
        {
            let mut directory = self.lock_directory();
            if directory.contains_key(&request.order_id) {
                return Err(ValidationError::DuplicateOrderId(request.order_id).into());
            }
            directory.insert(request.order_id, request.symbol.clone());
        }
        let sequence = Self::take_sequence(&mut gate)?;
        let order_id = request.order_id;
        let symbol = request.symbol.clone();
        let (reply, rx) = channel::bounded(1);
        let job = Job {
            symbol: symbol.clone(),
            command: Command::Submit {
                order: request.into_order(sequence),
                reply,
            },
        };
        if let Err(e) = self.send(&gate, job) {
            self.lock_directory().remove(&order_id);
            return Err(e);
        }
        drop(gate);
        debug!("order admitted order_id={} symbol={} seq={}", order_id, symbol, sequence);
        Ok(Ticket {
            order_id,
            symbol,
            sequence,
            reply: rx,
        })
    }

    pub fn submit_and_wait(&self, request: OrderRequest) -> Result<Execution> {
        self.submit(request)?.wait()
    }

    /// Cancels a resting order. `NotFound` if it is unknown or already terminal.
    pub fn cancel(&self, order_id: OrderId) -> Result<CancelAck> {
        let (symbol, rx) = {
            let mut gate = self.lock_gate();
            let symbol = self.symbol_of(order_id)?;
            let sequence = Self::take_sequence(&mut gate)?;
            let (reply, rx) = channel::bounded(1);
            self.send(
                &gate,
                Job {
                    symbol: symbol.clone(),
                    command: Command::Cancel {
                        order_id,
                        sequence,
                        reply,
                    },
                },
            )?;
            (symbol, rx)
        };
        await_reply(&symbol, rx)?
    }

    /// Changes quantity and/or price of a resting order. See [`SymbolEngine::modify`]
    /// for when time priority is kept.
    pub fn modify(&self, order_id: OrderId, quantity: u64, price: Option<Decimal>) -> Result<ModifyAck> {
        check_quantity(quantity)?;
        if let Some(p) = price {
            if p <= Decimal::ZERO {
                return Err(ValidationError::InvalidPrice(p).into());
            }
        }
        let (symbol, rx) = {
            let mut gate = self.lock_gate();
            let symbol = self.symbol_of(order_id)?;
            let sequence = Self::take_sequence(&mut gate)?;
            let (reply, rx) = channel::bounded(1);
            self.send(
                &gate,
                Job {
                    symbol: symbol.clone(),
                    command: Command::Modify {
                        order_id,
                        quantity,
                        price,
                        sequence,
                        reply,
                    },
                },
            )?;
            (symbol, rx)
        };
        await_reply(&symbol, rx)?
    }

    /// Full book as of every command sequenced before this call.
    pub fn book(&self, symbol: &Symbol, detail: bool) -> Result<BookSnapshot> {
        self.route(symbol)?;
        let (reply, rx) = channel::bounded(1);
        {
            let gate = self.lock_gate();
            self.send(
                &gate,
                Job {
                    symbol: symbol.clone(),
                    command: Command::Snapshot { detail, reply },
                },
            )?;
        }
        await_reply(symbol, rx)
    }

    /// Last published top-of-book snapshot. Never blocks on the worker; may lag.
    pub fn published_book(&self, symbol: &Symbol) -> Result<Arc<BookSnapshot>> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownSymbol(symbol.clone()).into())
    }

    pub fn locate(&self, order_id: OrderId) -> Result<RestingOrder> {
        let (symbol, rx) = {
            let gate = self.lock_gate();
            let symbol = self.symbol_of(order_id)?;
            let (reply, rx) = channel::bounded(1);
            self.send(
                &gate,
                Job {
                    symbol: symbol.clone(),
                    command: Command::Locate { order_id, reply },
                },
            )?;
            (symbol, rx)
        };
        await_reply(&symbol, rx)?
    }

    /// Number of orders the dispatcher currently routes (live or still in flight).
    pub fn live_orders(&self) -> usize {
        self.lock_directory().len()
    }

    /// Stops admission, lets every worker drain its queue and joins them.
    ///
    /// Commands accepted before this call are all processed. Later calls return an
    /// empty report.
    pub fn shutdown(&self) -> Result<DrainReport> {
        let queues = self.lock_gate().queues.take();
        if queues.is_none() {
            return Ok(DrainReport::default());
        }
        drop(queues);
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        let mut report = DrainReport::default();
        let mut failed = None;
        for worker in workers {
            match worker.handle.join() {
                Ok(processed) => {
                    report.workers += 1;
                    report.commands_processed += processed;
                }
                Err(_) => {
                    warn!("matcher-{} panicked before draining", worker.index);
                    if failed.is_none() {
                        failed = worker.symbols.into_iter().next();
                    }
                }
            }
        }
        info!(
            "dispatcher drained workers={} commands={}",
            report.workers, report.commands_processed
        );
        match failed {
            Some(symbol) => Err(Error::WorkerUnavailable(symbol)),
            None => Ok(report),
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn validate(request: &OrderRequest) -> Result<()> {
    if request.order_id.0 == 0 {
        return Err(ValidationError::InvalidOrderId.into());
    }
    check_quantity(request.quantity)?;
    if request.order_type == OrderType::Limit {
        match request.price {
            None => return Err(ValidationError::MissingLimitPrice(request.order_id).into()),
            Some(p) if p <= Decimal::ZERO => return Err(ValidationError::InvalidPrice(p).into()),
            Some(_) => {}
        }
    }
    Ok(())
}

fn await_reply<T>(symbol: &Symbol, rx: Receiver<T>) -> Result<T> {
    rx.recv().map_err(|_| Error::WorkerUnavailable(symbol.clone()))
}

struct WorkerContext {
    index: usize,
    directory: Directory,
    published: Published,
    published_depth: usize,
}

impl WorkerContext {
    /// Processes jobs until every sender is gone and the queue is empty.
    fn run(self, mut engines: HashMap<Symbol, SymbolEngine>, rx: Receiver<Job>) -> usize {
        debug!("matcher-{} started with {} symbols", self.index, engines.len());
        let mut processed = 0;
        for Job { symbol, command } in rx.iter() {
            let Some(engine) = engines.get_mut(&symbol) else {
                warn!("matcher-{} got a job for unowned symbol {}", self.index, symbol);
                continue;
            };
            processed += 1;
            match command {
                Command::Submit { order, reply } => {
                    let order_id = order.order_id;
                    let result = engine.submit(order);
                    let mut done = engine.take_completed();
                    if result.is_err() && !engine.book().contains(order_id) {
                        done.push(order_id);
                    }
                    self.settle(engine, done, result.is_ok());
                    respond(reply, result);
                }
                Command::Cancel {
                    order_id,
                    sequence,
                    reply,
                } => {
                    let result = engine.cancel(order_id, sequence);
                    let done = engine.take_completed();
                    self.settle(engine, done, result.is_ok());
                    respond(reply, result);
                }
                Command::Modify {
                    order_id,
                    quantity,
                    price,
                    sequence,
                    reply,
                } => {
                    let result = engine.modify(order_id, quantity, price, sequence);
                    let done = engine.take_completed();
                    self.settle(engine, done, result.is_ok());
                    respond(reply, result);
                }
                Command::Snapshot { detail, reply } => {
                    respond(reply, engine.snapshot(None, detail));
                }
                Command::Locate { order_id, reply } => {
                    respond(reply, engine.locate(order_id));
                }
            }
        }
        debug!("matcher-{} drained after {} commands", self.index, processed);
        processed
    }

    /// Runs before the reply is sent, so a caller that sees a terminal result can reuse the id.
    fn settle(&self, engine: &SymbolEngine, done: Vec<OrderId>, changed: bool) {
        if !done.is_empty() {
            let mut directory = self.directory.lock().unwrap_or_else(PoisonError::into_inner);
            for order_id in done {
                if directory.get(&order_id) == Some(engine.symbol()) {
                    directory.remove(&order_id);
                }
            }
        }
        if changed {
            let snapshot = Arc::new(engine.snapshot(Some(self.published_depth), false));
            self.published
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(engine.symbol().clone(), snapshot);
        }
    }
}

fn respond<T>(reply: Sender<T>, value: T) {
    if reply.send(value).is_err() {
        debug!("caller dropped its reply channel");
    }
}
