//! Polymarket Whale-Flow Paper Trading Bot
//!
//! Turns an externally ingested stream of on-chain prediction-market
//! trades into risk-gated simulated trading decisions.
//!
//! ## Architecture
//!
//! ```text
//! Trade Store → Detectors (whale cluster / divergence / reversal)
//!                  → Aggregator → Trade Gate (filters → oracle) → Ledger
//!                                        ↑                          ↓
//!                              Advisory Oracle          Mark-to-Market / Close
//!                                                               ↓
//!                                                    Performance Analyzer
//! ```

pub mod client;
pub mod config;
pub mod detector;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod monitor;
pub mod perf;
pub mod storage;
pub mod types;

#[cfg(test)]
mod config_tests;
