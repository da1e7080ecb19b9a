//! Momentum reversal detector
//!
//! Sharp price moves often overshoot. When whales start positioning
//! against the recent move, they are likely catching the reversal before
//! the crowd does.

use super::{DetectorKind, RankedSignal, ReversalDetails, SignalDetails, SignalDetector};
use crate::config::DetectorConfig;
use crate::error::Result;
use crate::storage::Database;
use crate::types::{Side, StoredTrade};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

const RATIO_BAR: Decimal = dec!(1.5);
const MIN_TRADES: usize = 5;
const MIN_RECENT_WHALES: usize = 2;

pub struct ReversalDetector;

#[async_trait]
impl SignalDetector for ReversalDetector {
    fn name(&self) -> &'static str {
        "momentum_reversal"
    }

    async fn detect(&self, db: &Database, cfg: &DetectorConfig) -> Result<Vec<RankedSignal>> {
        let cutoff = Utc::now().timestamp() - cfg.reversal_lookback_hours * 3600;
        let trades = db.trades_since(cutoff).await?;
        Ok(detect_reversals(&trades, cfg))
    }
}

pub fn detect_reversals(trades: &[StoredTrade], cfg: &DetectorConfig) -> Vec<RankedSignal> {
    let mut groups: BTreeMap<(String, String), Vec<&StoredTrade>> = BTreeMap::new();
    for trade in trades {
        groups
            .entry((trade.market_slug.clone(), trade.outcome.clone()))
            .or_default()
            .push(trade);
    }

    let mut signals = Vec::new();

    for ((_, _), mut group) in groups {
        if group.len() < MIN_TRADES {
            continue;
        }
        group.sort_by_key(|t| t.timestamp);

        let (early, recent) = group.split_at(group.len() / 2);
        let avg_early = mean_price(early);
        let avg_recent = mean_price(recent);
        let price_move = avg_recent - avg_early;

        if price_move.abs() < cfg.min_price_move {
            continue;
        }

        // Whales entering during the recent leg
        let recent_whales: Vec<&&StoredTrade> = recent
            .iter()
            .filter(|t| t.size_usd >= cfg.reversal_whale_min_size)
            .collect();
        if recent_whales.len() < MIN_RECENT_WHALES {
            continue;
        }

        let whale_buy: Decimal = recent_whales
            .iter()
            .filter(|t| t.side == Side::Buy)
            .map(|t| t.size_usd)
            .sum();
        let whale_sell: Decimal = recent_whales
            .iter()
            .filter(|t| t.side == Side::Sell)
            .map(|t| t.size_usd)
            .sum();

        let reversal = if price_move > cfg.min_price_move && whale_sell > whale_buy * RATIO_BAR {
            Some((Side::Sell, "bearish_reversal", "bullish", "bearish", whale_sell))
        } else if price_move < -cfg.min_price_move && whale_buy > whale_sell * RATIO_BAR {
            Some((Side::Buy, "bullish_reversal", "bearish", "bullish", whale_buy))
        } else {
            None
        };

        let Some((direction, rev_type, momentum, position, whale_size)) = reversal else {
            continue;
        };

        let confidence = reversal_confidence(
            whale_size,
            recent_whales.len(),
            price_move.abs(),
            avg_recent,
        );
        if confidence < cfg.reversal_min_confidence {
            continue;
        }

        let lead = group[0];
        let verb = if direction == Side::Sell { "selling" } else { "buying" };
        let moved = if price_move > Decimal::ZERO { "rose" } else { "fell" };
        signals.push(RankedSignal {
            kind: DetectorKind::MomentumReversal,
            confidence,
            market_slug: lead.market_slug.clone(),
            market_question: lead.market_question.clone(),
            outcome: lead.outcome.clone(),
            direction,
            price: avg_recent,
            details: SignalDetails::Reversal(ReversalDetails {
                reversal_type: rev_type.to_string(),
                price_move,
                momentum: momentum.to_string(),
                whale_position: position.to_string(),
                whale_size,
                whale_count: recent_whales.len(),
                current_price: avg_recent,
                explanation: format!(
                    "Price {} {:.1}% but whales {} ${:.0}",
                    moved,
                    (price_move * dec!(100)).abs(),
                    verb,
                    whale_size
                ),
            }),
        });
    }

    signals.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    signals
}

fn mean_price(trades: &[&StoredTrade]) -> Decimal {
    if trades.is_empty() {
        return Decimal::ZERO;
    }
    trades.iter().map(|t| t.price).sum::<Decimal>() / Decimal::from(trades.len())
}

/// Bigger counter-flow, bigger move and more extreme pricing (more room
/// to reverse) all raise the score
pub fn reversal_confidence(
    whale_size: Decimal,
    whale_count: usize,
    price_move: Decimal,
    current_price: Decimal,
) -> u32 {
    let mut score: u32 = 0;

    if whale_size > dec!(40000) {
        score += 35;
    } else if whale_size > dec!(20000) {
        score += 25;
    } else if whale_size > dec!(10000) {
        score += 15;
    } else {
        score += 10;
    }

    if whale_count >= 4 {
        score += 20;
    } else if whale_count >= 3 {
        score += 15;
    } else {
        score += 10;
    }

    if price_move > dec!(0.30) {
        score += 30;
    } else if price_move > dec!(0.20) {
        score += 20;
    } else if price_move > dec!(0.15) {
        score += 15;
    } else {
        score += 10;
    }

    if current_price > dec!(0.80) || current_price < dec!(0.20) {
        score += 15;
    } else if current_price > dec!(0.70) || current_price < dec!(0.30) {
        score += 10;
    }

    score.min(100)
}
