//! Trade gate / auto-trader
//!
//! Walks the ranked signals from the latest aggregation snapshot through
//! a series of checks and opens paper positions for the survivors:
//!
//! 1. translate SELL recommendations into buying the opposite outcome
//! 2. category/timing filters (past years, high-frequency, sports,
//!    resolution window)
//! 3. existence check (fail-closed on a definitive 404 only)
//! 4. dedup against open positions
//! 5. persist the signal
//! 6. advisory-gated trade decision
//! 7. open the position and mark the signal traded
//!
//! Accepted trades above the alert threshold come back as alert payloads
//! for external notification.

pub mod advisor;
pub mod filters;

pub use advisor::{AdviceVerdict, AdvisoryClient, AdvisoryOutcome};

use crate::client::{ExistenceCheck, GammaClient};
use crate::config::GateConfig;
use crate::detector::{RankedSignal, SignalDetails, SignalSnapshot};
use crate::error::Result;
use crate::perf::history;
use crate::storage::{Database, NewPosition, NewSignal};
use crate::types::{complement_outcome, Side};
use chrono::{Datelike, Utc};
use rust_decimal_macros::dec;
use serde_json::json;
use tracing::{info, warn};

/// Alert payload for trades worth surfacing externally
#[derive(Debug, Clone)]
pub struct TradeAlert {
    pub position_id: i64,
    pub confidence: u32,
    pub signal_type: String,
    pub market_slug: String,
    pub market_question: String,
    pub direction: Side,
    pub outcome: String,
    pub price: rust_decimal::Decimal,
    pub reasoning: String,
}

/// What happened to one signal on its way through the gate
#[derive(Debug)]
enum Disposition {
    Rejected(String),
    Stored,
    Opened { alert: Option<TradeAlert> },
}

/// Per-run accounting; every rejection carries its reason
#[derive(Debug, Default)]
pub struct GateSummary {
    pub processed: usize,
    pub stored: usize,
    pub opened: usize,
    pub rejected: usize,
    pub failed: usize,
    pub rejections: Vec<(String, String)>,
    pub alerts: Vec<TradeAlert>,
}

pub struct TradeGate {
    db: Database,
    gamma: GammaClient,
    advisor: AdvisoryClient,
    cfg: GateConfig,
}

impl TradeGate {
    pub fn new(db: Database, gamma: GammaClient, advisor: AdvisoryClient, cfg: GateConfig) -> Self {
        Self {
            db,
            gamma,
            advisor,
            cfg,
        }
    }

    /// Process every ranked signal of a snapshot in aggregator order.
    /// Per-signal failures are isolated; the run always completes with a
    /// summary.
    pub async fn process_snapshot(&self, snapshot: &SignalSnapshot) -> GateSummary {
        let mut summary = GateSummary::default();

        for signal in &snapshot.top_signals {
            summary.processed += 1;
            match self.process_signal(signal).await {
                Ok(Disposition::Rejected(reason)) => {
                    info!("Rejected {}: {}", signal.market_slug, reason);
                    summary.rejected += 1;
                    summary.rejections.push((signal.market_slug.clone(), reason));
                }
                Ok(Disposition::Stored) => {
                    summary.stored += 1;
                }
                Ok(Disposition::Opened { alert }) => {
                    summary.stored += 1;
                    summary.opened += 1;
                    if let Some(alert) = alert {
                        summary.alerts.push(alert);
                    }
                }
                Err(e) => {
                    warn!("Signal {} failed: {}", signal.market_slug, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Gate pass: {} processed, {} stored, {} opened, {} rejected, {} failed",
            summary.processed, summary.stored, summary.opened, summary.rejected, summary.failed
        );
        summary
    }

    async fn process_signal(&self, signal: &RankedSignal) -> Result<Disposition> {
        // 1. Venue translation: no shorting, SELL means buy the complement
        let (direction, outcome) = translate_action(signal.direction, &signal.outcome);

        // 2. Category filters
        if let Some(reason) = filters::should_skip_market(
            &signal.market_question,
            &signal.market_slug,
            Utc::now().year(),
        ) {
            return Ok(Disposition::Rejected(reason));
        }

        // 2b. Resolution-window filter, fail-open on lookup trouble
        let timing = match self.gamma.event_timing(&signal.market_slug).await {
            Ok(timing) => timing,
            Err(e) => {
                warn!("Timing lookup failed for {}: {}", signal.market_slug, e);
                None
            }
        };
        if let Some(days) = timing.as_ref().and_then(|t| t.days_until_close()) {
            if let Some(reason) = filters::timing_verdict(days, &self.cfg) {
                return Ok(Disposition::Rejected(reason));
            }
        } else {
            warn!("No timing metadata for {}, allowing", signal.market_slug);
        }

        // 3. Existence check: only a definitive 404 blocks
        match self.gamma.market_exists(&signal.market_slug).await {
            ExistenceCheck::Confirmed => {}
            ExistenceCheck::NotFound => {
                return Ok(Disposition::Rejected(
                    "market does not exist or was delisted".to_string(),
                ));
            }
            ExistenceCheck::Unverified(reason) => {
                warn!(
                    "Could not verify {} ({}), allowing",
                    signal.market_slug, reason
                );
            }
        }

        // 4. Dedup against open positions
        if self.db.has_open_position(&signal.market_slug, &outcome).await? {
            return Ok(Disposition::Rejected(format!(
                "open position already exists for {}",
                outcome
            )));
        }

        // 5. Persist the signal
        let signal_id = self
            .db
            .insert_signal(&NewSignal {
                signal_type: signal.kind.to_string(),
                confidence: signal.confidence,
                market_slug: signal.market_slug.clone(),
                market_question: signal.market_question.clone(),
                outcome: outcome.clone(),
                direction,
                price: signal.price,
                details: serde_json::to_value(&signal.details)?,
            })
            .await?;
        info!(
            "Signal stored: {} {}% - {}",
            signal.kind, signal.confidence, signal.market_question
        );

        // 6. Trade decision
        if signal.confidence < self.cfg.auto_trade_threshold {
            self.log_history(signal, direction, &outcome, None).await;
            return Ok(Disposition::Stored);
        }

        let advisory = self
            .advisor
            .assess(&signal.market_question, &outcome, signal.confidence)
            .await;
        let verdict = advisor::evaluate_advice(
            signal.confidence,
            &advisory,
            self.cfg.auto_trade_threshold,
        );

        let advisor_note = match verdict {
            AdviceVerdict::Reject(reason) => {
                self.log_history(signal, direction, &outcome, None).await;
                return Ok(Disposition::Rejected(reason));
            }
            AdviceVerdict::Accept { advisor_note } => advisor_note,
        };

        // 7. Open the position (re-checks dedup inside one transaction)
        let mut reasoning = format_reasoning(signal);
        if let Some(note) = advisor_note {
            reasoning = format!("{} | Advisor: {}", reasoning, note);
        }

        let mut notes = json!({ "reasoning": reasoning.clone() });
        if let Some(timing) = &timing {
            if let Some(end) = timing.end_date {
                notes["end_date"] = json!(end.to_rfc3339());
            }
            if let Some(title) = &timing.title {
                notes["full_title"] = json!(title);
            }
            if let Some(days) = timing.days_until_close() {
                notes["days_until_close"] = json!(days);
            }
        }

        let position_id = match self
            .db
            .open_position_guarded(&NewPosition {
                signal_id: Some(signal_id),
                market_slug: signal.market_slug.clone(),
                market_question: signal.market_question.clone(),
                outcome: outcome.clone(),
                direction,
                entry_price: signal.price,
                size: self.cfg.position_size,
                confidence: signal.confidence,
                notes,
            })
            .await?
        {
            Some(id) => id,
            None => {
                return Ok(Disposition::Rejected(format!(
                    "open position already exists for {}",
                    outcome
                )));
            }
        };

        info!(
            "Opened position #{}: {} {} @ {} (${})",
            position_id, direction, outcome, signal.price, self.cfg.position_size
        );
        self.log_history(signal, direction, &outcome, Some(position_id))
            .await;

        // 8. Alert payload for high-confidence trades
        let alert = (signal.confidence >= self.cfg.alert_threshold).then(|| TradeAlert {
            position_id,
            confidence: signal.confidence,
            signal_type: signal.kind.to_string(),
            market_slug: signal.market_slug.clone(),
            market_question: signal.market_question.clone(),
            direction,
            outcome,
            price: signal.price,
            reasoning,
        });

        Ok(Disposition::Opened { alert })
    }

    /// Accuracy-tracking entry for every stored signal; failures here
    /// never affect the trade path
    async fn log_history(
        &self,
        signal: &RankedSignal,
        direction: Side,
        outcome: &str,
        position_id: Option<i64>,
    ) {
        let record = history::record_for(signal, direction, outcome, position_id.is_some());
        if let Err(e) = self.db.insert_history(&record).await {
            warn!("Failed to log signal history: {}", e);
        }
    }
}

/// SELL on an outcome becomes BUY on the complementary outcome; BUY
/// passes through
pub fn translate_action(direction: Side, outcome: &str) -> (Side, String) {
    match direction {
        Side::Buy => (Side::Buy, outcome.to_string()),
        Side::Sell => (Side::Buy, complement_outcome(outcome)),
    }
}

/// Human-readable reasoning stored with the position
pub fn format_reasoning(signal: &RankedSignal) -> String {
    let conf = signal.confidence;
    match &signal.details {
        SignalDetails::WhaleCluster(d) => format!(
            "{}% confidence: {} whales, ${:.0} in {:.0} min",
            conf, d.whale_count, d.total_size, d.time_span_minutes
        ),
        SignalDetails::Divergence(d) => format!(
            "{}% confidence: Whales betting ${:.0} against crowd sentiment",
            conf, d.whale_size
        ),
        SignalDetails::Reversal(d) => format!(
            "{}% confidence: Price moved {:.1}%, whales counter-positioned ${:.0}",
            conf,
            d.price_move * dec!(100),
            d.whale_size
        ),
    }
}
