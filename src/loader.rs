//! Line-oriented order file parser.
//!
//! One order per line, whitespace separated:
//!
//! ```text
//! # isBuy kind   symbol     id  quantity price
//! 1       LIMIT  RVNL       51  10       460.10
//! 0       MARKET TATASTEEL  52  5
//! ```
//!
//! `isBuy` is `1` (buy) or `0` (sell). The price is required for `LIMIT` and ignored
//! for `MARKET`. Blank lines and lines starting with `#` are skipped.

use crate::types::{OrderRequest, Side};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parses one line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<OrderRequest>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 {
        return Err(format!("expected at least 5 fields, got {}", fields.len()));
    }
    let side = match fields[0] {
        "1" => Side::Buy,
        "0" => Side::Sell,
        other => return Err(format!("side must be 1 or 0, got {:?}", other)),
    };
    let symbol = fields[2];
    let order_id: u64 = fields[3]
        .parse()
        .map_err(|_| format!("bad order id {:?}", fields[3]))?;
    let quantity: u64 = fields[4]
        .parse()
        .map_err(|_| format!("bad quantity {:?}", fields[4]))?;
    let request = match fields[1].to_ascii_uppercase().as_str() {
        "LIMIT" => {
            let raw = fields.get(5).ok_or("LIMIT order needs a price")?;
            let price = Decimal::from_str(raw).map_err(|_| format!("bad price {:?}", raw))?;
            OrderRequest::limit(order_id, symbol, side, quantity, price)
        }
        "MARKET" => OrderRequest::market(order_id, symbol, side, quantity),
        other => return Err(format!("order kind must be LIMIT or MARKET, got {:?}", other)),
    };
    Ok(Some(request))
}

/// Parses every line, stopping at the first bad one. Line numbers are 1-based.
pub fn read_orders(reader: impl BufRead) -> Result<Vec<OrderRequest>, LoadError> {
    let mut orders = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        match parse_line(&line) {
            Ok(Some(order)) => orders.push(order),
            Ok(None) => {}
            Err(reason) => return Err(LoadError::Parse { line: i + 1, reason }),
        }
    }
    Ok(orders)
}

pub fn load_file(path: impl AsRef<Path>) -> Result<Vec<OrderRequest>, LoadError> {
    let file = File::open(path)?;
    read_orders(BufReader::new(file))
}
