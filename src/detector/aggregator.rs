//! Signal aggregation and ranking
//!
//! Runs every detector, concatenates their signals, ranks by confidence
//! and persists the snapshot the trade gate consumes. One detector
//! blowing up must not take the others down with it.

use super::{
    DetectorKind, DivergenceDetector, RankedSignal, ReversalDetector, SignalDetector,
    SignalSnapshot, WhaleClusterDetector, SNAPSHOT_SCHEMA_VERSION,
};
use crate::config::DetectorConfig;
use crate::error::Result;
use crate::storage::Database;
use chrono::Utc;
use tracing::{info, warn};

pub struct SignalAggregator {
    detectors: Vec<Box<dyn SignalDetector>>,
}

impl Default for SignalAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalAggregator {
    pub fn new() -> Self {
        Self {
            detectors: vec![
                Box::new(WhaleClusterDetector),
                Box::new(DivergenceDetector),
                Box::new(ReversalDetector),
            ],
        }
    }

    pub fn with_detectors(detectors: Vec<Box<dyn SignalDetector>>) -> Self {
        Self { detectors }
    }

    /// Run all detectors, rank, persist and return the snapshot
    pub async fn aggregate(&self, db: &Database, cfg: &DetectorConfig) -> Result<SignalSnapshot> {
        let mut combined: Vec<RankedSignal> = Vec::new();

        for detector in &self.detectors {
            match detector.detect(db, cfg).await {
                Ok(signals) => {
                    info!("{}: {} signal(s)", detector.name(), signals.len());
                    combined.extend(signals);
                }
                Err(e) => {
                    // A failed detector contributes zero signals
                    warn!("{} failed: {}", detector.name(), e);
                }
            }
        }

        let snapshot = build_snapshot(combined, cfg.top_n);
        db.save_snapshot(&snapshot).await?;
        info!(
            "Aggregated {} ranked signal(s) (of {} total)",
            snapshot.top_signals.len(),
            snapshot.whale_clusters.len() + snapshot.divergences.len() + snapshot.reversals.len()
        );

        Ok(snapshot)
    }
}

/// Sort by confidence descending (stable: ties keep detector-relative
/// order) and keep the top N
pub fn build_snapshot(combined: Vec<RankedSignal>, top_n: usize) -> SignalSnapshot {
    let whale_clusters = filter_kind(&combined, DetectorKind::WhaleCluster);
    let divergences = filter_kind(&combined, DetectorKind::SmartMoneyDivergence);
    let reversals = filter_kind(&combined, DetectorKind::MomentumReversal);

    let mut top_signals = combined;
    top_signals.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    top_signals.truncate(top_n);

    SignalSnapshot {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        generated_at: Utc::now().timestamp(),
        whale_clusters,
        divergences,
        reversals,
        top_signals,
    }
}

fn filter_kind(signals: &[RankedSignal], kind: DetectorKind) -> Vec<RankedSignal> {
    signals.iter().filter(|s| s.kind == kind).cloned().collect()
}
