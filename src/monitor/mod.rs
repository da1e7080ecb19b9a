//! Long-running monitor loop
//!
//! One cooperative loop drives the whole pipeline on a fixed interval:
//! detect → gate → mark-to-market → rule exits → outcome check. Every
//! sub-check runs under its own timeout and no failure aborts the loop.
//! The sleep between passes happens in one-second slices so a shutdown
//! signal is honored promptly, and a heartbeat row is written after every
//! completed pass for external health checks.

use crate::config::{DetectorConfig, MonitorConfig};
use crate::detector::SignalAggregator;
use crate::error::Result;
use crate::gate::TradeGate;
use crate::ledger::PositionLedger;
use crate::perf::history::OutcomeChecker;
use crate::storage::Database;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

pub struct Monitor {
    db: Database,
    aggregator: SignalAggregator,
    gate: TradeGate,
    ledger: PositionLedger,
    outcome_checker: OutcomeChecker,
    detector_cfg: DetectorConfig,
    cfg: MonitorConfig,
}

impl Monitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        aggregator: SignalAggregator,
        gate: TradeGate,
        ledger: PositionLedger,
        outcome_checker: OutcomeChecker,
        detector_cfg: DetectorConfig,
        cfg: MonitorConfig,
    ) -> Self {
        Self {
            db,
            aggregator,
            gate,
            ledger,
            outcome_checker,
            detector_cfg,
            cfg,
        }
    }

    /// Run until the shutdown flag flips. Checks the flag before every
    /// pass and between sleep slices.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "Monitor starting: {}s interval, {}s per sub-check",
            self.cfg.interval_secs, self.cfg.check_timeout_secs
        );

        while !*shutdown.borrow() {
            let started = Instant::now();
            self.run_pass().await;

            if let Err(e) = self.db.write_heartbeat(std::process::id()).await {
                warn!("Heartbeat write failed: {}", e);
            }
            info!("Pass complete ({:.1}s)", started.elapsed().as_secs_f64());

            // Sleep in slices so shutdown is honored within a second
            let mut remaining = self.cfg.interval_secs;
            while remaining > 0 && !*shutdown.borrow() {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    _ = shutdown.changed() => {}
                }
                remaining -= 1;
            }
        }

        info!("Monitor stopped");
        Ok(())
    }

    /// One pass over all sub-checks, each bounded and isolated
    async fn run_pass(&self) {
        let timeout = Duration::from_secs(self.cfg.check_timeout_secs);

        // 1 + 2: detect, aggregate and gate the ranked signals
        match tokio::time::timeout(
            timeout,
            self.aggregator.aggregate(&self.db, &self.detector_cfg),
        )
        .await
        {
            Ok(Ok(snapshot)) => {
                match tokio::time::timeout(timeout, self.gate.process_snapshot(&snapshot)).await {
                    Ok(summary) => {
                        for alert in &summary.alerts {
                            info!(
                                "HIGH CONFIDENCE ALERT: {}% {} - {} {} @ {} - {}",
                                alert.confidence,
                                alert.signal_type,
                                alert.direction,
                                alert.outcome,
                                alert.price,
                                alert.market_question
                            );
                        }
                    }
                    Err(_) => warn!("Gate pass timed out (>{}s)", self.cfg.check_timeout_secs),
                }
            }
            Ok(Err(e)) => error!("Aggregation failed: {}", e),
            Err(_) => warn!("Aggregation timed out (>{}s)", self.cfg.check_timeout_secs),
        }

        // 3: mark open positions to market
        match tokio::time::timeout(timeout, self.ledger.mark_to_market()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("Mark-to-market failed: {}", e),
            Err(_) => warn!("Mark-to-market timed out (>{}s)", self.cfg.check_timeout_secs),
        }

        // 4: stop-loss / take-profit exits
        match tokio::time::timeout(timeout, self.ledger.rule_exits(&self.cfg)).await {
            Ok(Ok(exits)) => {
                for exit in exits {
                    info!(
                        "Auto-closed #{}: {} (P&L {:.2}) - {}",
                        exit.position_id, exit.reason, exit.pnl, exit.market_question
                    );
                }
            }
            Ok(Err(e)) => error!("Exit check failed: {}", e),
            Err(_) => warn!("Exit check timed out (>{}s)", self.cfg.check_timeout_secs),
        }

        // 5: resolve pending signal history, best-effort
        match tokio::time::timeout(timeout, self.outcome_checker.check_pending()).await {
            Ok(Ok(resolved)) if resolved > 0 => info!("Resolved {} signal outcome(s)", resolved),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Outcome check failed: {}", e),
            Err(_) => warn!("Outcome check timed out (>{}s)", self.cfg.check_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GammaClient;
    use crate::config::{ClientConfig, GateConfig};
    use crate::gate::AdvisoryClient;

    async fn test_monitor() -> Monitor {
        let db = Database::connect_memory().await.unwrap();
        let client_cfg = ClientConfig::default();
        let gamma = GammaClient::new(&client_cfg).unwrap();
        let advisor = AdvisoryClient::new(&crate::config::AdvisoryConfig::default());
        let gate = TradeGate::new(db.clone(), gamma.clone(), advisor, GateConfig::default());
        let ledger = PositionLedger::new(db.clone());
        let outcome_checker = OutcomeChecker::new(db.clone(), gamma);
        Monitor::new(
            db,
            SignalAggregator::new(),
            gate,
            ledger,
            outcome_checker,
            DetectorConfig::default(),
            MonitorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_shutdown_before_first_pass() {
        let monitor = test_monitor().await;
        let (tx, rx) = watch::channel(true);

        // Flag already set: run must return without doing a pass
        let result = tokio::time::timeout(Duration::from_secs(2), monitor.run(rx)).await;
        assert!(result.is_ok());
        drop(tx);
    }
}
