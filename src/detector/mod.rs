//! Signal detection over the trade store
//!
//! Three independent detectors scan recent trade history for whale-driven
//! patterns. Each is a stateless, read-only pass returning ranked signals
//! in a common envelope; the aggregator runs them all and persists a
//! snapshot of the result.

pub mod aggregator;
pub mod divergence;
pub mod reversal;
pub mod whale_cluster;

pub use aggregator::SignalAggregator;
pub use divergence::DivergenceDetector;
pub use reversal::ReversalDetector;
pub use whale_cluster::WhaleClusterDetector;

use crate::config::DetectorConfig;
use crate::error::Result;
use crate::storage::Database;
use crate::types::Side;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    WhaleCluster,
    SmartMoneyDivergence,
    MomentumReversal,
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorKind::WhaleCluster => write!(f, "whale_cluster"),
            DetectorKind::SmartMoneyDivergence => write!(f, "smart_money_divergence"),
            DetectorKind::MomentumReversal => write!(f, "momentum_reversal"),
        }
    }
}

/// Detector-specific evidence, one variant per detector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "detail_kind", rename_all = "snake_case")]
pub enum SignalDetails {
    WhaleCluster(WhaleClusterDetails),
    Divergence(DivergenceDetails),
    Reversal(ReversalDetails),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhaleClusterDetails {
    pub whale_count: usize,
    pub total_size: Decimal,
    pub avg_price: Decimal,
    pub time_span_minutes: f64,
    pub first_trade: i64,
    pub last_trade: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivergenceDetails {
    /// "bearish_divergence" or "bullish_divergence"
    pub divergence_type: String,
    pub crowd_sentiment: String,
    pub whale_sentiment: String,
    pub market_price: Decimal,
    /// Dominant-side whale notional
    pub whale_size: Decimal,
    pub whale_count: usize,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversalDetails {
    /// "bearish_reversal" or "bullish_reversal"
    pub reversal_type: String,
    /// Signed early-half to recent-half mean price change
    pub price_move: Decimal,
    pub momentum: String,
    pub whale_position: String,
    pub whale_size: Decimal,
    pub whale_count: usize,
    pub current_price: Decimal,
    pub explanation: String,
}

/// Common signal envelope shared by all detectors and the trade gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedSignal {
    #[serde(rename = "type")]
    pub kind: DetectorKind,
    /// Additive tiered score in [0, 100]; not a probability
    pub confidence: u32,
    pub market_slug: String,
    pub market_question: String,
    pub outcome: String,
    /// Direction as computed by the detector, before venue translation
    pub direction: Side,
    pub price: Decimal,
    pub details: SignalDetails,
}

/// Wholesale aggregation result, overwritten on each run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub schema_version: u32,
    /// Unix seconds
    pub generated_at: i64,
    pub whale_clusters: Vec<RankedSignal>,
    pub divergences: Vec<RankedSignal>,
    pub reversals: Vec<RankedSignal>,
    pub top_signals: Vec<RankedSignal>,
}

#[async_trait]
pub trait SignalDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Scan the trade store and return qualifying signals. An empty result
    /// is a legitimate outcome, not an error.
    async fn detect(&self, db: &Database, cfg: &DetectorConfig) -> Result<Vec<RankedSignal>>;
}
