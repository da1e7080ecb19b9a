//! Performance analysis feedback loop
//!
//! Joins closed positions to their originating signals and scores each
//! detector's real-world accuracy. Output is advisory only: the analyzer
//! recommends threshold changes, it never applies them.

pub mod history;

use crate::error::Result;
use crate::storage::{ClosedTrade, Database};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

const UNDERPERFORM_WIN_RATE: f64 = 0.4;
const OUTPERFORM_WIN_RATE: f64 = 0.7;
const MIN_TRADES_FOR_VERDICT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Recommendation {
    pub severity: Severity,
    pub issue: String,
    pub detail: String,
    pub action: String,
}

#[derive(Debug, Clone)]
pub struct TypePerformance {
    pub signal_type: String,
    pub trades: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub total_pnl: Decimal,
    pub avg_pnl: Decimal,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone)]
pub struct BucketPerformance {
    pub bucket: &'static str,
    pub trades: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub total_pnl: Decimal,
    pub avg_pnl: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceReport {
    pub total_closed: usize,
    pub by_signal_type: Vec<TypePerformance>,
    pub by_confidence: Vec<BucketPerformance>,
    pub recommendations: Vec<Recommendation>,
}

pub fn confidence_bucket(confidence: u32) -> &'static str {
    if confidence >= 90 {
        "90-100%"
    } else if confidence >= 80 {
        "80-89%"
    } else {
        "70-79%"
    }
}

/// Pure analysis over closed trades
pub fn analyze(closed: &[ClosedTrade]) -> PerformanceReport {
    if closed.is_empty() {
        return PerformanceReport::default();
    }

    let mut by_type: BTreeMap<String, Vec<&ClosedTrade>> = BTreeMap::new();
    let mut by_bucket: BTreeMap<&'static str, Vec<&ClosedTrade>> = BTreeMap::new();

    for trade in closed {
        by_type.entry(trade.signal_type.clone()).or_default().push(trade);
        by_bucket
            .entry(confidence_bucket(trade.confidence))
            .or_default()
            .push(trade);
    }

    let by_signal_type: Vec<TypePerformance> = by_type
        .into_iter()
        .map(|(signal_type, trades)| {
            let wins = trades.iter().filter(|t| t.pnl > Decimal::ZERO).count();
            let total_pnl: Decimal = trades.iter().map(|t| t.pnl).sum();
            let avg_confidence =
                trades.iter().map(|t| t.confidence as f64).sum::<f64>() / trades.len() as f64;
            TypePerformance {
                signal_type,
                trades: trades.len(),
                wins,
                win_rate: wins as f64 / trades.len() as f64,
                total_pnl,
                avg_pnl: total_pnl / Decimal::from(trades.len()),
                avg_confidence,
            }
        })
        .collect();

    let mut by_confidence: Vec<BucketPerformance> = by_bucket
        .into_iter()
        .map(|(bucket, trades)| {
            let wins = trades.iter().filter(|t| t.pnl > Decimal::ZERO).count();
            let total_pnl: Decimal = trades.iter().map(|t| t.pnl).sum();
            BucketPerformance {
                bucket,
                trades: trades.len(),
                wins,
                win_rate: wins as f64 / trades.len() as f64,
                total_pnl,
                avg_pnl: total_pnl / Decimal::from(trades.len()),
            }
        })
        .collect();
    // Highest bucket first for display
    by_confidence.sort_by(|a, b| b.bucket.cmp(a.bucket));

    let recommendations = recommend(&by_signal_type, &by_confidence);

    PerformanceReport {
        total_closed: closed.len(),
        by_signal_type,
        by_confidence,
        recommendations,
    }
}

fn recommend(
    by_type: &[TypePerformance],
    by_bucket: &[BucketPerformance],
) -> Vec<Recommendation> {
    let mut recs = Vec::new();

    // Higher confidence should mean higher win rate; if the top bucket
    // underperforms the bottom one, the scoring is miscalibrated
    let high = by_bucket.iter().find(|b| b.bucket == "90-100%");
    let low = by_bucket.iter().find(|b| b.bucket == "70-79%");
    if let (Some(high), Some(low)) = (high, low) {
        if high.win_rate < low.win_rate {
            recs.push(Recommendation {
                severity: Severity::Warning,
                issue: "Confidence miscalibration".to_string(),
                detail: format!(
                    "90-100% confidence signals have {:.1}% win rate vs {:.1}% for 70-79%",
                    high.win_rate * 100.0,
                    low.win_rate * 100.0
                ),
                action: "Review confidence calculation logic - may be inverted or need recalibration"
                    .to_string(),
            });
        }
    }

    for perf in by_type {
        if perf.trades < MIN_TRADES_FOR_VERDICT {
            continue;
        }
        if perf.win_rate < UNDERPERFORM_WIN_RATE {
            recs.push(Recommendation {
                severity: Severity::Error,
                issue: format!("{} underperforming", perf.signal_type),
                detail: format!(
                    "Win rate: {:.1}%, Avg P&L: ${:.2}",
                    perf.win_rate * 100.0,
                    perf.avg_pnl
                ),
                action: format!(
                    "Consider disabling {} or lowering position size until algorithm is fixed",
                    perf.signal_type
                ),
            });
        } else if perf.win_rate > OUTPERFORM_WIN_RATE {
            recs.push(Recommendation {
                severity: Severity::Success,
                issue: format!("{} performing well", perf.signal_type),
                detail: format!(
                    "Win rate: {:.1}%, Avg P&L: ${:.2}",
                    perf.win_rate * 100.0,
                    perf.avg_pnl
                ),
                action: format!(
                    "Consider increasing position size or confidence threshold for {}",
                    perf.signal_type
                ),
            });
        }
    }

    recs
}

/// Read closed positions from the store and analyze them
pub async fn analyze_performance(db: &Database) -> Result<PerformanceReport> {
    let closed = db.closed_trades().await?;
    Ok(analyze(&closed))
}
