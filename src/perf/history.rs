//! Signal accuracy ledger
//!
//! Every signal the gate stores gets an append-only history entry with
//! the recommended action and entry price. Once the market resolves, an
//! outcome-check pass writes the result, the correctness flag and the
//! realized edge — exactly once.

use crate::client::{GammaClient, MarketResolution};
use crate::detector::RankedSignal;
use crate::error::Result;
use crate::storage::{Database, SignalHistoryRecord};
use crate::types::Side;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

/// Build the history entry for a freshly stored signal
pub fn record_for(
    signal: &RankedSignal,
    direction: Side,
    outcome: &str,
    position_opened: bool,
) -> SignalHistoryRecord {
    SignalHistoryRecord {
        signal_id: Uuid::new_v4().simple().to_string(),
        signal_type: signal.kind.to_string(),
        market_slug: signal.market_slug.clone(),
        market_name: signal.market_question.clone(),
        market_end_date: None,
        detected_at: Utc::now().timestamp(),
        confidence: signal.confidence as f64,
        recommendation: format!("{}_{}", direction, outcome.to_uppercase()),
        entry_price: signal.price,
        reasoning: serde_json::to_string(&signal.details).ok(),
        outcome_known: false,
        market_result: None,
        final_price: None,
        signal_correct: None,
        edge: None,
        position_opened,
    }
}

/// Score a resolved market against a recommendation like "BUY_YES".
/// Returns (correct, final price of the recommended side, edge).
pub fn score_resolution(
    recommendation: &str,
    winning_outcome: &str,
    entry_price: Decimal,
) -> (Option<bool>, Decimal, Decimal) {
    let mut parts = recommendation.splitn(2, '_');
    let action = parts.next().unwrap_or("BUY");
    let side = parts.next().unwrap_or("YES");

    let side_won = side.eq_ignore_ascii_case(winning_outcome);
    // Binary settlement: the recommended side finishes at 1 or 0
    let final_price = if side_won { Decimal::ONE } else { Decimal::ZERO };

    match action {
        "SELL" => {
            // A sell profits when the side it bet against loses
            let correct = !side_won;
            let edge = entry_price - final_price;
            (Some(correct), final_price, edge)
        }
        _ => {
            let correct = side_won;
            let edge = final_price - entry_price;
            (Some(correct), final_price, edge)
        }
    }
}

/// Resolves pending history entries against the market API
pub struct OutcomeChecker {
    db: Database,
    gamma: GammaClient,
}

impl OutcomeChecker {
    pub fn new(db: Database, gamma: GammaClient) -> Self {
        Self { db, gamma }
    }

    /// Check every pending record. Lookup failures leave the record
    /// pending for the next pass.
    pub async fn check_pending(&self) -> Result<usize> {
        let pending = self.db.pending_history().await?;
        if pending.is_empty() {
            return Ok(0);
        }

        info!("Checking {} pending signal(s)", pending.len());
        let mut resolved_count = 0;

        for record in pending {
            let resolution = match self.gamma.market_resolution(&record.market_slug).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("Resolution lookup failed for {}: {}", record.market_slug, e);
                    continue;
                }
            };

            match resolution {
                MarketResolution::Resolved { winning_outcome } => {
                    let (correct, final_price, edge) = score_resolution(
                        &record.recommendation,
                        &winning_outcome,
                        record.entry_price,
                    );
                    self.db
                        .resolve_history(
                            &record.signal_id,
                            &winning_outcome,
                            Some(final_price),
                            correct,
                            edge,
                        )
                        .await?;
                    resolved_count += 1;
                    info!(
                        "Resolved {}: {} (edge {:+.3})",
                        record.market_slug, winning_outcome, edge
                    );
                }
                MarketResolution::Cancelled => {
                    self.db
                        .resolve_history(&record.signal_id, "CANCELLED", None, None, Decimal::ZERO)
                        .await?;
                    resolved_count += 1;
                }
                MarketResolution::Pending => {
                    self.db.touch_history_checked(&record.signal_id).await?;
                }
            }
        }

        Ok(resolved_count)
    }
}

/// Accuracy aggregates over resolved history, by type and by confidence
/// bucket
#[derive(Debug, Default)]
pub struct AccuracyReport {
    pub total: usize,
    pub correct: usize,
    pub avg_edge: Option<Decimal>,
    pub by_type: Vec<AccuracyLine>,
    pub by_bucket: Vec<AccuracyLine>,
}

#[derive(Debug)]
pub struct AccuracyLine {
    pub label: String,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub avg_edge: Decimal,
}

pub fn accuracy_report(records: &[SignalHistoryRecord]) -> AccuracyReport {
    let scored: Vec<&SignalHistoryRecord> = records
        .iter()
        .filter(|r| r.signal_correct.is_some())
        .collect();

    if scored.is_empty() {
        return AccuracyReport::default();
    }

    let correct = scored
        .iter()
        .filter(|r| r.signal_correct == Some(true))
        .count();
    let edges: Vec<Decimal> = scored.iter().filter_map(|r| r.edge).collect();
    let avg_edge = if edges.is_empty() {
        None
    } else {
        Some(edges.iter().sum::<Decimal>() / Decimal::from(edges.len()))
    };

    let mut by_type: std::collections::BTreeMap<String, Vec<&SignalHistoryRecord>> =
        std::collections::BTreeMap::new();
    let mut by_bucket: std::collections::BTreeMap<String, Vec<&SignalHistoryRecord>> =
        std::collections::BTreeMap::new();

    for &record in &scored {
        by_type
            .entry(record.signal_type.clone())
            .or_default()
            .push(record);
        by_bucket
            .entry(super::confidence_bucket(record.confidence as u32).to_string())
            .or_default()
            .push(record);
    }

    let line = |label: String, records: &[&SignalHistoryRecord]| {
        let correct = records
            .iter()
            .filter(|r| r.signal_correct == Some(true))
            .count();
        let edges: Vec<Decimal> = records.iter().filter_map(|r| r.edge).collect();
        let avg_edge = if edges.is_empty() {
            Decimal::ZERO
        } else {
            edges.iter().sum::<Decimal>() / Decimal::from(edges.len())
        };
        AccuracyLine {
            label,
            total: records.len(),
            correct,
            accuracy: correct as f64 / records.len() as f64,
            avg_edge,
        }
    };

    AccuracyReport {
        total: scored.len(),
        correct,
        avg_edge,
        by_type: by_type.iter().map(|(k, v)| line(k.clone(), v)).collect(),
        by_bucket: by_bucket.iter().map(|(k, v)| line(k.clone(), v)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_buy_yes_correct_when_yes_wins() {
        let (correct, final_price, edge) = score_resolution("BUY_YES", "YES", dec!(0.60));
        assert_eq!(correct, Some(true));
        assert_eq!(final_price, Decimal::ONE);
        assert_eq!(edge, dec!(0.40));
    }

    #[test]
    fn test_buy_yes_wrong_when_no_wins() {
        let (correct, final_price, edge) = score_resolution("BUY_YES", "NO", dec!(0.60));
        assert_eq!(correct, Some(false));
        assert_eq!(final_price, Decimal::ZERO);
        assert_eq!(edge, dec!(-0.60));
    }

    #[test]
    fn test_buy_no_correct_when_no_wins() {
        let (correct, _, edge) = score_resolution("BUY_NO", "NO", dec!(0.30));
        assert_eq!(correct, Some(true));
        assert_eq!(edge, dec!(0.70));
    }

    #[test]
    fn test_sell_yes_profits_when_yes_loses() {
        let (correct, final_price, edge) = score_resolution("SELL_YES", "NO", dec!(0.60));
        assert_eq!(correct, Some(true));
        assert_eq!(final_price, Decimal::ZERO);
        assert_eq!(edge, dec!(0.60));
    }

    #[test]
    fn test_sell_yes_loses_when_yes_wins() {
        let (correct, _, edge) = score_resolution("SELL_YES", "YES", dec!(0.60));
        assert_eq!(correct, Some(false));
        assert_eq!(edge, dec!(-0.40));
    }

    #[test]
    fn test_accuracy_report_buckets() {
        let rec = |signal_type: &str, confidence: f64, correct: bool, edge: Decimal| {
            SignalHistoryRecord {
                signal_id: Uuid::new_v4().simple().to_string(),
                signal_type: signal_type.to_string(),
                market_slug: "m".to_string(),
                market_name: "m?".to_string(),
                market_end_date: None,
                detected_at: 0,
                confidence,
                recommendation: "BUY_YES".to_string(),
                entry_price: dec!(0.5),
                reasoning: None,
                outcome_known: true,
                market_result: Some("YES".to_string()),
                final_price: Some(Decimal::ONE),
                signal_correct: Some(correct),
                edge: Some(edge),
                position_opened: false,
            }
        };

        let records = vec![
            rec("whale_cluster", 95.0, true, dec!(0.4)),
            rec("whale_cluster", 92.0, false, dec!(-0.5)),
            rec("momentum_reversal", 75.0, true, dec!(0.3)),
        ];

        let report = accuracy_report(&records);
        assert_eq!(report.total, 3);
        assert_eq!(report.correct, 2);

        let whale = report
            .by_type
            .iter()
            .find(|l| l.label == "whale_cluster")
            .unwrap();
        assert_eq!(whale.total, 2);
        assert_eq!(whale.correct, 1);

        let high = report
            .by_bucket
            .iter()
            .find(|l| l.label == "90-100%")
            .unwrap();
        assert_eq!(high.total, 2);
    }

    #[test]
    fn test_unscored_records_excluded() {
        let report = accuracy_report(&[]);
        assert_eq!(report.total, 0);
        assert!(report.avg_edge.is_none());
    }
}
