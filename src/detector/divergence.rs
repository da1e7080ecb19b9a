//! Smart money divergence detector
//!
//! Fires when whale order flow opposes the direction implied by the
//! current market price: a crowd-bullish market (price above 0.60) with
//! whales net selling, or a crowd-bearish one (below 0.40) with whales
//! net buying.

use super::{DetectorKind, DivergenceDetails, RankedSignal, SignalDetails, SignalDetector};
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

pub struct DivergenceDetector;

#[async_trait]
impl SignalDetector for DivergenceDetector {
    fn name(&self) -> &'static str {
        "smart_money_divergence"
    }

    async fn detect(&self, db: &Database, cfg: &DetectorConfig) -> Result<Vec<RankedSignal>> {
        let cutoff = Utc::now().timestamp() - cfg.divergence_lookback_hours * 3600;
        let trades = db
            .whale_trades_since(cutoff, cfg.divergence_min_size)
            .await?;
        Ok(detect_divergence(&trades, cfg))
    }
}

pub fn detect_divergence(trades: &[StoredTrade], cfg: &DetectorConfig) -> Vec<RankedSignal> {
    let mut groups: BTreeMap<(String, String), Vec<&StoredTrade>> = BTreeMap::new();
    for trade in trades {
        groups
            .entry((trade.market_slug.clone(), trade.outcome.clone()))
            .or_default()
            .push(trade);
    }

    let mut signals = Vec::new();

    for ((_, _), group) in groups {
        // Need multiple whales for a pattern
        if group.len() < 2 {
            continue;
        }

        let buy_size: Decimal = group
            .iter()
            .filter(|t| t.side == Side::Buy)
            .map(|t| t.size_usd)
            .sum();
        let sell_size: Decimal = group
            .iter()
            .filter(|t| t.side == Side::Sell)
            .map(|t| t.size_usd)
            .sum();

        // Latest trade price stands in for crowd sentiment
        let latest_price = group
            .iter()
            .max_by_key(|t| t.timestamp)
            .map(|t| t.price)
            .unwrap_or_default();

        let divergence = if latest_price > dec!(0.60) && sell_size > buy_size * RATIO_BAR {
            Some((Side::Sell, "bearish_divergence", "bullish", "bearish", sell_size))
        } else if latest_price < dec!(0.40) && buy_size > sell_size * RATIO_BAR {
            Some((Side::Buy, "bullish_divergence", "bearish", "bullish", buy_size))
        } else {
            None
        };

        let Some((direction, div_type, crowd, whales, whale_size)) = divergence else {
            continue;
        };

        let ratio = match direction {
            Side::Buy => buy_size / (sell_size + Decimal::ONE),
            Side::Sell => sell_size / (buy_size + Decimal::ONE),
        };

        let confidence = divergence_confidence(
            whale_size,
            group.len(),
            (latest_price - dec!(0.5)).abs(),
            ratio,
        );

        if confidence < cfg.divergence_min_confidence {
            continue;
        }

        let lead = group[0];
        let verb = if direction == Side::Sell { "selling" } else { "buying" };
        signals.push(RankedSignal {
            kind: DetectorKind::SmartMoneyDivergence,
            confidence,
            market_slug: lead.market_slug.clone(),
            market_question: lead.market_question.clone(),
            outcome: lead.outcome.clone(),
            direction,
            price: latest_price,
            details: SignalDetails::Divergence(DivergenceDetails {
                divergence_type: div_type.to_string(),
                crowd_sentiment: crowd.to_string(),
                whale_sentiment: whales.to_string(),
                market_price: latest_price,
                whale_size,
                whale_count: group.len(),
                explanation: format!(
                    "Market at {:.2} (crowd {}) but whales {} ${:.0}",
                    latest_price, crowd, verb, whale_size
                ),
            }),
        });
    }

    signals.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    signals
}

/// Confidence from dominant notional, whale count, price extremity
/// (distance from 0.5) and how lopsided the whale flow is
pub fn divergence_confidence(
    whale_size: Decimal,
    whale_count: usize,
    price_extremity: Decimal,
    ratio: Decimal,
) -> u32 {
    let mut score: u32 = 0;

    if whale_size > dec!(50000) {
        score += 35;
    } else if whale_size > dec!(25000) {
        score += 25;
    } else if whale_size > dec!(15000) {
        score += 20;
    } else {
        score += 10;
    }

    if whale_count >= 5 {
        score += 25;
    } else if whale_count >= 3 {
        score += 15;
    } else {
        score += 5;
    }

    if price_extremity > dec!(0.35) {
        score += 25;
    } else if price_extremity > dec!(0.25) {
        score += 20;
    } else if price_extremity > dec!(0.15) {
        score += 15;
    } else {
        score += 5;
    }

    if ratio > dec!(5) {
        score += 15;
    } else if ratio > dec!(3) {
        score += 10;
    } else if ratio > dec!(2) {
        score += 5;
    }

    score.min(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whale(side: Side, price: Decimal, size: Decimal, ts: i64) -> StoredTrade {
        StoredTrade {
            market_slug: "m1".to_string(),
            market_question: "Will it happen?".to_string(),
            outcome: "Yes".to_string(),
            side,
            price,
            size_usd: size,
            timestamp: ts,
        }
    }

    #[test]
    fn test_bearish_divergence_fires() {
        // Market at 0.85, whales dumping $60k against $5k of buys
        let cfg = DetectorConfig::default();
        let trades = vec![
            whale(Side::Sell, dec!(0.84), dec!(15000), 100),
            whale(Side::Sell, dec!(0.85), dec!(15000), 200),
            whale(Side::Sell, dec!(0.85), dec!(15000), 300),
            whale(Side::Sell, dec!(0.85), dec!(15000), 400),
            whale(Side::Buy, dec!(0.85), dec!(5000), 500),
        ];

        let signals = detect_divergence(&trades, &cfg);
        assert_eq!(signals.len(), 1);
        let sig = &signals[0];
        assert_eq!(sig.direction, Side::Sell);
        assert!(sig.confidence >= cfg.divergence_min_confidence);
        // 60k (>50k) +35, 5 whales +25, |0.85-0.5| = 0.35 exactly -> +20,
        // ratio 60000/5001 > 5 -> +15
        assert_eq!(sig.confidence, 95);
        match &sig.details {
            SignalDetails::Divergence(d) => {
                assert_eq!(d.divergence_type, "bearish_divergence");
                assert_eq!(d.whale_size, dec!(60000));
            }
            _ => panic!("wrong details variant"),
        }
    }

    #[test]
    fn test_bullish_divergence_fires() {
        let cfg = DetectorConfig::default();
        let trades = vec![
            whale(Side::Buy, dec!(0.25), dec!(20000), 100),
            whale(Side::Buy, dec!(0.24), dec!(20000), 200),
            whale(Side::Buy, dec!(0.25), dec!(20000), 300),
            whale(Side::Sell, dec!(0.25), dec!(4000), 400),
        ];

        let signals = detect_divergence(&trades, &cfg);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].direction, Side::Buy);
        // 60k +35, 4 whales +15, extremity 0.25 -> +15, ratio ~15 -> +15
        assert_eq!(signals[0].confidence, 80);
    }

    #[test]
    fn test_aligned_flow_is_not_divergence() {
        // Price high and whales buying with the crowd: nothing to flag
        let cfg = DetectorConfig::default();
        let trades = vec![
            whale(Side::Buy, dec!(0.80), dec!(30000), 100),
            whale(Side::Buy, dec!(0.81), dec!(30000), 200),
        ];
        assert!(detect_divergence(&trades, &cfg).is_empty());
    }

    #[test]
    fn test_single_whale_is_not_a_pattern() {
        let cfg = DetectorConfig::default();
        let trades = vec![whale(Side::Sell, dec!(0.85), dec!(90000), 100)];
        assert!(detect_divergence(&trades, &cfg).is_empty());
    }

    #[test]
    fn test_mid_price_never_diverges() {
        let cfg = DetectorConfig::default();
        // 0.50 is neither crowd-bullish nor crowd-bearish
        let trades = vec![
            whale(Side::Sell, dec!(0.50), dec!(40000), 100),
            whale(Side::Sell, dec!(0.50), dec!(40000), 200),
        ];
        assert!(detect_divergence(&trades, &cfg).is_empty());
    }

    #[test]
    fn test_low_confidence_discarded() {
        let cfg = DetectorConfig::default();
        // Two whales, small notional, mild extremity: scores below 70
        let trades = vec![
            whale(Side::Sell, dec!(0.62), dec!(4000), 100),
            whale(Side::Sell, dec!(0.62), dec!(4000), 200),
        ];
        // 8k -> +10, 2 whales -> +5, 0.12 -> +5, ratio 8000/1 -> +15 = 35
        assert!(detect_divergence(&trades, &cfg).is_empty());
    }

    #[test]
    fn test_ratio_uses_minority_plus_one() {
        // Zero-sized minority must not divide by zero
        // 60k +35, 5 whales +25, extremity 0.3 -> +20, huge ratio +15
        assert_eq!(divergence_confidence(dec!(60000), 5, dec!(0.3), dec!(60000)), 95);
    }
}
