use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Security type of an [`Instrument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecType {
    Stock,
    Future,
    Index,
    Forex,
}

/// A tradable contract. Used as a map key; never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instrument {
    /// Ticker, e.g. "AAPL" or "ES".
    pub symbol: String,
    pub sec_type: SecType,
    /// Routing exchange, e.g. "SMART" or "CME".
    pub exchange: String,
    pub currency: String,
    /// Contract expiry for futures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<NaiveDate>,
}

impl Instrument {
    /// US stock routed through SMART in USD.
    pub fn stock(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            sec_type: SecType::Stock,
            exchange: "SMART".to_string(),
            currency: "USD".to_string(),
            expiry: None,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expiry {
            Some(exp) => write!(f, "{} {}", self.symbol, exp.format("%Y%m")),
            None => f.write_str(&self.symbol),
        }
    }
}
