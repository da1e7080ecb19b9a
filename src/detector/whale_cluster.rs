//! Whale cluster detector
//!
//! Fires when several whale-sized trades hit the same market/outcome/side
//! within a short window. Tight clustering reads as coordinated or
//! informed action, so the time-span tier dominates the score.

use super::{
    DetectorKind, RankedSignal, SignalDetails, SignalDetector, WhaleClusterDetails,
};
use crate::config::DetectorConfig;
use crate::error::Result;
use crate::storage::Database;
use crate::types::StoredTrade;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

pub struct WhaleClusterDetector;

#[async_trait]
impl SignalDetector for WhaleClusterDetector {
    fn name(&self) -> &'static str {
        "whale_cluster"
    }

    async fn detect(&self, db: &Database, cfg: &DetectorConfig) -> Result<Vec<RankedSignal>> {
        let cutoff = Utc::now().timestamp() - cfg.cluster_lookback_hours * 3600;
        let trades = db.whale_trades_since(cutoff, cfg.whale_min_size).await?;
        Ok(detect_clusters(&trades, cfg))
    }
}

/// Group whale trades by (market, outcome, side) and keep the groups that
/// qualify as clusters
pub fn detect_clusters(trades: &[StoredTrade], cfg: &DetectorConfig) -> Vec<RankedSignal> {
    let mut groups: BTreeMap<(String, String, String), Vec<&StoredTrade>> = BTreeMap::new();
    for trade in trades {
        groups
            .entry((
                trade.market_slug.clone(),
                trade.outcome.clone(),
                trade.side.to_string(),
            ))
            .or_default()
            .push(trade);
    }

    let mut signals = Vec::new();

    for ((_, _, _), group) in groups {
        if (group.len() as i64) < cfg.min_whales {
            continue;
        }

        // Trades arrive oldest-first from the store
        let first_trade = group.iter().map(|t| t.timestamp).min().unwrap_or(0);
        let last_trade = group.iter().map(|t| t.timestamp).max().unwrap_or(0);
        if last_trade - first_trade > cfg.cluster_window_secs {
            continue;
        }

        let whale_count = group.len();
        let total_size: Decimal = group.iter().map(|t| t.size_usd).sum();
        let avg_price: Decimal =
            group.iter().map(|t| t.price).sum::<Decimal>() / Decimal::from(whale_count);
        let time_span_minutes = (last_trade - first_trade) as f64 / 60.0;

        let confidence = cluster_confidence(whale_count, total_size, time_span_minutes);
        let lead = group[0];

        signals.push(RankedSignal {
            kind: DetectorKind::WhaleCluster,
            confidence,
            market_slug: lead.market_slug.clone(),
            market_question: lead.market_question.clone(),
            outcome: lead.outcome.clone(),
            direction: lead.side,
            price: avg_price,
            details: SignalDetails::WhaleCluster(WhaleClusterDetails {
                whale_count,
                total_size,
                avg_price,
                time_span_minutes,
                first_trade,
                last_trade,
            }),
        });
    }

    // Strongest clusters first: count, then notional
    signals.sort_by(|a, b| {
        let (ac, asize) = cluster_sort_key(a);
        let (bc, bsize) = cluster_sort_key(b);
        bc.cmp(&ac).then(bsize.cmp(&asize))
    });

    signals
}

fn cluster_sort_key(signal: &RankedSignal) -> (usize, Decimal) {
    match &signal.details {
        SignalDetails::WhaleCluster(d) => (d.whale_count, d.total_size),
        _ => (0, Decimal::ZERO),
    }
}

/// Additive confidence score in [0, 100]. Tier boundaries are part of the
/// calibrated behavior; preserve them exactly.
pub fn cluster_confidence(whale_count: usize, total_size: Decimal, time_span_minutes: f64) -> u32 {
    let mut score: u32 = 0;

    // More whales
    if whale_count >= 5 {
        score += 50;
    } else if whale_count >= 4 {
        score += 35;
    } else {
        score += 20;
    }

    // Larger total notional
    if total_size > dec!(50000) {
        score += 30;
    } else if total_size > dec!(25000) {
        score += 20;
    } else if total_size > dec!(15000) {
        score += 15;
    } else if total_size > dec!(10000) {
        score += 10;
    }

    // Faster clustering reads as coordinated action
    if time_span_minutes < 1.0 {
        score += 25;
    } else if time_span_minutes < 5.0 {
        score += 20;
    } else if time_span_minutes < 15.0 {
        score += 15;
    } else if time_span_minutes < 30.0 {
        score += 10;
    }

    score.min(100)
}
