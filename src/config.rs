//! Dispatcher configuration, from code or the environment.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `MATCHING_WORKERS` | worker threads | available parallelism, else 4 |
//! | `MATCHING_SYMBOLS` | comma-separated tradable symbols | none (required) |
//! | `MATCHING_PUBLISHED_DEPTH` | levels per side in published snapshots | 10 |

use crate::error::{Error, Result};
use crate::types::Symbol;
use std::collections::HashSet;
use std::thread;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Size of the worker pool. At most one worker per symbol is spawned.
    pub workers: usize,
    pub symbols: Vec<Symbol>,
    /// Levels per side kept in each published snapshot.
    pub published_depth: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            symbols: Vec::new(),
            published_depth: 10,
        }
    }
}

impl DispatcherConfig {
    pub fn with_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn published_depth(mut self, depth: usize) -> Self {
        self.published_depth = depth;
        self
    }

    /// Reads the `MATCHING_*` variables. Unset or unparsable numbers fall back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let workers = lookup("MATCHING_WORKERS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.workers);
        let published_depth = lookup("MATCHING_PUBLISHED_DEPTH")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.published_depth);
        let symbols = lookup("MATCHING_SYMBOLS")
            .map(|s| parse_symbols(&s))
            .unwrap_or_default();
        let config = Self {
            workers,
            symbols,
            published_depth,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("at least one worker is required".into()));
        }
        if self.symbols.is_empty() {
            return Err(Error::Config("no symbols configured".into()));
        }
        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if symbol.as_str().trim().is_empty() {
                return Err(Error::Config("blank symbol".into()));
            }
            if !seen.insert(symbol) {
                return Err(Error::Config(format!("symbol {} listed twice", symbol)));
            }
        }
        Ok(())
    }
}

fn parse_symbols(raw: &str) -> Vec<Symbol> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Symbol::from)
        .collect()
}
