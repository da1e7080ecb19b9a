//! Core domain types shared across modules

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = crate::error::BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(crate::error::BotError::Parse(format!(
                "unknown side: {}",
                other
            ))),
        }
    }
}

/// A single record from the external trade store.
///
/// The ingestion pipeline that populates the store is out of scope; the
/// bot only reads timestamp-ordered, size-filtered slices of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTrade {
    pub market_slug: String,
    pub market_question: String,
    pub outcome: String,
    pub side: Side,
    /// Unit price in [0, 1]
    pub price: Decimal,
    /// Notional size in USD
    pub size_usd: Decimal,
    /// Unix seconds
    pub timestamp: i64,
}

impl StoredTrade {
    pub fn traded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// The venue only supports buying an outcome. Betting against an outcome
/// means buying its complement (binary markets only).
pub fn complement_outcome(outcome: &str) -> String {
    match outcome.to_lowercase().as_str() {
        "yes" => "No".to_string(),
        "no" => "Yes".to_string(),
        // Unrecognized label: treat like Yes and bet the No side
        _ => "No".to_string(),
    }
}
