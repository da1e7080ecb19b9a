//! Paper position ledger
//!
//! Tracks simulated positions from open through mark-to-market to close.
//! No real orders are ever placed; P&L is computed against observed trade
//! prices only.

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::storage::{Database, NewPosition, PaperPosition, PortfolioStats};
use crate::types::Side;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

/// Result of a close attempt
#[derive(Debug, Clone, PartialEq)]
pub enum CloseResult {
    Closed { pnl: Decimal, roi: Decimal },
    /// Missing id or already closed; closing is one-way
    NotFound,
}

#[derive(Debug, Default)]
pub struct MarkSummary {
    pub updated: usize,
    pub missing_price: usize,
}

#[derive(Debug, Clone)]
pub struct RuleExit {
    pub position_id: i64,
    pub market_question: String,
    pub reason: String,
    pub pnl: Decimal,
}

#[derive(Debug)]
pub struct LedgerStats {
    pub portfolio: PortfolioStats,
    pub open_positions: usize,
    pub total_unrealized_pnl: Decimal,
    pub win_rate: Option<Decimal>,
}

/// P&L convention: simple notional. For a BUY the position gains as the
/// price rises; a SELL inverts the sign. ROI is P&L over size.
pub fn compute_pnl(
    direction: Side,
    entry_price: Decimal,
    current_price: Decimal,
    size: Decimal,
) -> (Decimal, Decimal) {
    let pnl = match direction {
        Side::Buy => (current_price - entry_price) * size,
        Side::Sell => (entry_price - current_price) * size,
    };
    let roi = if size > Decimal::ZERO {
        pnl / size
    } else {
        Decimal::ZERO
    };
    (pnl, roi)
}

#[derive(Clone)]
pub struct PositionLedger {
    db: Database,
}

impl PositionLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Manual open through the command surface (no originating signal)
    pub async fn open(&self, new: &NewPosition) -> Result<Option<i64>> {
        self.db.open_position_guarded(new).await
    }

    /// Recompute unrealized P&L for every open position from the latest
    /// observed trade price. Idempotent: unchanged prices produce
    /// unchanged marks. Positions with no observed price are skipped with
    /// a warning.
    pub async fn mark_to_market(&self) -> Result<MarkSummary> {
        let positions = self.db.open_positions().await?;
        let mut summary = MarkSummary::default();

        for pos in positions {
            let price = self
                .db
                .latest_price(&pos.market_slug, &pos.outcome)
                .await?;

            let Some(current) = price else {
                warn!(
                    "No price for {} / {}, skipping mark",
                    pos.market_slug, pos.outcome
                );
                summary.missing_price += 1;
                continue;
            };

            let (pnl, roi) = compute_pnl(pos.direction, pos.entry_price, current, pos.size);
            self.db
                .update_position_mark(pos.id, current, pnl, roi)
                .await?;
            summary.updated += 1;
        }

        info!(
            "Mark-to-market: {} updated, {} missing price",
            summary.updated, summary.missing_price
        );
        Ok(summary)
    }

    /// Close a position at the given exit price. One-way: a second close
    /// on the same id reports NotFound without side effects.
    pub async fn close(&self, id: i64, exit_price: Decimal, reason: &str) -> Result<CloseResult> {
        let Some(pos) = self.db.position(id).await? else {
            return Ok(CloseResult::NotFound);
        };
        if pos.status != "open" {
            return Ok(CloseResult::NotFound);
        }

        let (pnl, roi) = compute_pnl(pos.direction, pos.entry_price, exit_price, pos.size);

        if !self.db.close_position(id, exit_price, pnl, roi, reason).await? {
            // Lost the race with another close
            return Ok(CloseResult::NotFound);
        }

        info!(
            "Closed position #{}: P&L {:.2} ({:.1}%) - {}",
            id,
            pnl,
            roi * dec!(100),
            reason
        );
        Ok(CloseResult::Closed { pnl, roi })
    }

    /// Stop-loss / take-profit pass over marked positions. Relies on the
    /// unrealized fields written by the last mark-to-market.
    pub async fn rule_exits(&self, cfg: &MonitorConfig) -> Result<Vec<RuleExit>> {
        let positions = self.db.open_positions().await?;
        let mut exits = Vec::new();

        for pos in positions {
            let (Some(current), Some(roi)) = (pos.current_price, pos.unrealized_roi) else {
                continue;
            };
            let roi_pct = roi * dec!(100);

            let reason = if roi_pct >= cfg.take_profit_pct {
                format!("Take profit: {:.1}% >= {:.1}%", roi_pct, cfg.take_profit_pct)
            } else if roi_pct <= cfg.stop_loss_pct {
                format!("Stop loss: {:.1}% <= {:.1}%", roi_pct, cfg.stop_loss_pct)
            } else {
                continue;
            };

            if let CloseResult::Closed { pnl, .. } = self.close(pos.id, current, &reason).await? {
                exits.push(RuleExit {
                    position_id: pos.id,
                    market_question: pos.market_question.clone(),
                    reason,
                    pnl,
                });
            }
        }

        Ok(exits)
    }

    pub async fn open_positions(&self) -> Result<Vec<PaperPosition>> {
        self.db.open_positions().await
    }

    /// Aggregate summary: realized counters plus unrealized totals
    pub async fn stats(&self) -> Result<LedgerStats> {
        let portfolio = self.db.portfolio_stats().await?;
        let open = self.db.open_positions().await?;

        let total_unrealized: Decimal = open
            .iter()
            .filter_map(|p| p.unrealized_pnl)
            .sum();

        let win_rate = if portfolio.total_trades > 0 {
            Some(Decimal::from(portfolio.wins) / Decimal::from(portfolio.total_trades))
        } else {
            None
        };

        Ok(LedgerStats {
            portfolio,
            open_positions: open.len(),
            total_unrealized_pnl: total_unrealized,
            win_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StoredTrade;

    fn new_position(market: &str, outcome: &str, direction: Side, entry: Decimal) -> NewPosition {
        NewPosition {
            signal_id: None,
            market_slug: market.to_string(),
            market_question: format!("{}?", market),
            outcome: outcome.to_string(),
            direction,
            entry_price: entry,
            size: dec!(50),
            confidence: 75,
            notes: serde_json::json!({}),
        }
    }

    fn trade(market: &str, outcome: &str, price: Decimal, ts: i64) -> StoredTrade {
        StoredTrade {
            market_slug: market.to_string(),
            market_question: format!("{}?", market),
            outcome: outcome.to_string(),
            side: Side::Buy,
            price,
            size_usd: dec!(100),
            timestamp: ts,
        }
    }

    #[test]
    fn test_pnl_sign_law_buy() {
        // BUY: entry 0.40, exit 0.55, size 50
        let (pnl, roi) = compute_pnl(Side::Buy, dec!(0.40), dec!(0.55), dec!(50));
        assert_eq!(pnl, dec!(7.50));
        assert_eq!(roi, dec!(0.15));
    }

    #[test]
    fn test_pnl_sign_law_sell_inverts() {
        // SELL: entry 0.60, exit 0.45, size 50 must be a gain
        let (pnl, roi) = compute_pnl(Side::Sell, dec!(0.60), dec!(0.45), dec!(50));
        assert_eq!(pnl, dec!(7.50));
        assert!(roi > Decimal::ZERO);
    }

    #[test]
    fn test_pnl_loss_cases() {
        let (pnl, _) = compute_pnl(Side::Buy, dec!(0.55), dec!(0.40), dec!(50));
        assert_eq!(pnl, dec!(-7.50));

        let (pnl, _) = compute_pnl(Side::Sell, dec!(0.45), dec!(0.60), dec!(50));
        assert_eq!(pnl, dec!(-7.50));
    }

    #[test]
    fn test_pnl_zero_size() {
        let (pnl, roi) = compute_pnl(Side::Buy, dec!(0.40), dec!(0.55), Decimal::ZERO);
        assert_eq!(pnl, Decimal::ZERO);
        assert_eq!(roi, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_mark_to_market_is_idempotent() {
        let db = Database::connect_memory().await.unwrap();
        let ledger = PositionLedger::new(db.clone());

        db.insert_trade(&trade("m1", "Yes", dec!(0.55), 100)).await.unwrap();
        ledger
            .open(&new_position("m1", "Yes", Side::Buy, dec!(0.40)))
            .await
            .unwrap()
            .unwrap();

        ledger.mark_to_market().await.unwrap();
        let first = ledger.open_positions().await.unwrap();
        assert_eq!(first[0].unrealized_pnl, Some(dec!(7.5)));
        assert_eq!(first[0].current_price, Some(dec!(0.55)));

        // Unchanged price, unchanged mark
        ledger.mark_to_market().await.unwrap();
        let second = ledger.open_positions().await.unwrap();
        assert_eq!(second[0].unrealized_pnl, first[0].unrealized_pnl);
        assert_eq!(second[0].unrealized_roi, first[0].unrealized_roi);
    }

    #[tokio::test]
    async fn test_mark_skips_missing_price() {
        let db = Database::connect_memory().await.unwrap();
        let ledger = PositionLedger::new(db.clone());

        ledger
            .open(&new_position("m1", "Yes", Side::Buy, dec!(0.40)))
            .await
            .unwrap()
            .unwrap();

        let summary = ledger.mark_to_market().await.unwrap();
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.missing_price, 1);

        let positions = ledger.open_positions().await.unwrap();
        assert_eq!(positions[0].unrealized_pnl, None);
    }

    #[tokio::test]
    async fn test_close_realizes_pnl_and_is_one_way() {
        let db = Database::connect_memory().await.unwrap();
        let ledger = PositionLedger::new(db.clone());

        let id = ledger
            .open(&new_position("m1", "Yes", Side::Buy, dec!(0.40)))
            .await
            .unwrap()
            .unwrap();

        let result = ledger.close(id, dec!(0.55), "manual").await.unwrap();
        assert_eq!(
            result,
            CloseResult::Closed {
                pnl: dec!(7.5),
                roi: dec!(0.15)
            }
        );

        // One-way: re-close reports NotFound
        let again = ledger.close(id, dec!(0.60), "manual").await.unwrap();
        assert_eq!(again, CloseResult::NotFound);

        // Unknown id too
        let missing = ledger.close(9999, dec!(0.60), "manual").await.unwrap();
        assert_eq!(missing, CloseResult::NotFound);

        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.portfolio.total_trades, 1);
        assert_eq!(stats.portfolio.wins, 1);
        assert_eq!(stats.open_positions, 0);
    }

    #[tokio::test]
    async fn test_rule_exits_take_profit_and_stop_loss() {
        let db = Database::connect_memory().await.unwrap();
        let ledger = PositionLedger::new(db.clone());
        let cfg = MonitorConfig::default(); // -15% / +20%

        // Winner: bought at 0.40, now 0.62 (unrealized ROI +22%)
        db.insert_trade(&trade("m1", "Yes", dec!(0.62), 100)).await.unwrap();
        ledger
            .open(&new_position("m1", "Yes", Side::Buy, dec!(0.40)))
            .await
            .unwrap()
            .unwrap();

        // Loser: bought at 0.50, now 0.30 (unrealized ROI -20%)
        db.insert_trade(&trade("m2", "Yes", dec!(0.30), 100)).await.unwrap();
        ledger
            .open(&new_position("m2", "Yes", Side::Buy, dec!(0.50)))
            .await
            .unwrap()
            .unwrap();

        // Holder: bought at 0.50, now 0.52 (+4%)
        db.insert_trade(&trade("m3", "Yes", dec!(0.52), 100)).await.unwrap();
        ledger
            .open(&new_position("m3", "Yes", Side::Buy, dec!(0.50)))
            .await
            .unwrap()
            .unwrap();

        ledger.mark_to_market().await.unwrap();
        let exits = ledger.rule_exits(&cfg).await.unwrap();

        assert_eq!(exits.len(), 2);
        assert!(exits.iter().any(|e| e.reason.contains("Take profit")));
        assert!(exits.iter().any(|e| e.reason.contains("Stop loss")));

        let remaining = ledger.open_positions().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].market_slug, "m3");
    }
}
