//! Configuration loading and per-section settings
//!
//! Layered config: `config.toml` (optional) overridden by `POLYFLOW_*`
//! environment variables. Every threshold the detectors and the gate use
//! lives here and is passed in explicitly; nothing reads ambient state.

use crate::error::{BotError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub advisory: AdvisoryConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(Path::new(path)).required(false))
            .add_source(
                config::Environment::with_prefix("POLYFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| BotError::Config(e.to_string()))?;

        let mut parsed: Config = cfg
            .try_deserialize()
            .map_err(|e| BotError::Config(e.to_string()))?;

        parsed.database.path = shellexpand::tilde(&parsed.database.path).into_owned();
        Ok(parsed)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "data/trading.db".to_string()
}

/// Remote endpoints for market metadata, existence checks and resolution
/// lookups.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,
    #[serde(default = "default_site_url")]
    pub site_url: String,
    #[serde(default = "default_clob_url")]
    pub clob_url: String,
    /// Per-request timeout for all best-effort lookups
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gamma_url: default_gamma_url(),
            site_url: default_site_url(),
            clob_url: default_clob_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_site_url() -> String {
    "https://polymarket.com".to_string()
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

/// Detector thresholds. The tier boundaries feed the additive confidence
/// scores and are kept exactly as calibrated; change with care.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Minimum trade size (USD) to count as a whale for clustering
    #[serde(default = "default_whale_min_size")]
    pub whale_min_size: Decimal,
    /// Max seconds between first and last trade of a cluster
    #[serde(default = "default_cluster_window")]
    pub cluster_window_secs: i64,
    /// Minimum whales to form a cluster
    #[serde(default = "default_min_whales")]
    pub min_whales: i64,
    #[serde(default = "default_cluster_lookback")]
    pub cluster_lookback_hours: i64,

    /// Higher whale bar for divergence signals
    #[serde(default = "default_divergence_min_size")]
    pub divergence_min_size: Decimal,
    #[serde(default = "default_divergence_lookback")]
    pub divergence_lookback_hours: i64,
    #[serde(default = "default_min_signal_confidence")]
    pub divergence_min_confidence: u32,

    #[serde(default = "default_reversal_lookback")]
    pub reversal_lookback_hours: i64,
    /// Whale bar for counter-momentum positioning
    #[serde(default = "default_divergence_min_size")]
    pub reversal_whale_min_size: Decimal,
    /// Minimum early-half to recent-half price move to qualify as momentum
    #[serde(default = "default_min_price_move")]
    pub min_price_move: Decimal,
    #[serde(default = "default_min_signal_confidence")]
    pub reversal_min_confidence: u32,

    /// Ranked signals kept per aggregation run
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            whale_min_size: default_whale_min_size(),
            cluster_window_secs: default_cluster_window(),
            min_whales: default_min_whales(),
            cluster_lookback_hours: default_cluster_lookback(),
            divergence_min_size: default_divergence_min_size(),
            divergence_lookback_hours: default_divergence_lookback(),
            divergence_min_confidence: default_min_signal_confidence(),
            reversal_lookback_hours: default_reversal_lookback(),
            reversal_whale_min_size: default_divergence_min_size(),
            min_price_move: default_min_price_move(),
            reversal_min_confidence: default_min_signal_confidence(),
            top_n: default_top_n(),
        }
    }
}

fn default_whale_min_size() -> Decimal {
    dec!(2000)
}

fn default_cluster_window() -> i64 {
    3600
}

fn default_min_whales() -> i64 {
    3
}

fn default_cluster_lookback() -> i64 {
    2
}

fn default_divergence_min_size() -> Decimal {
    dec!(3000)
}

fn default_divergence_lookback() -> i64 {
    4
}

fn default_min_signal_confidence() -> u32 {
    70
}

fn default_reversal_lookback() -> i64 {
    6
}

fn default_min_price_move() -> Decimal {
    dec!(0.15)
}

fn default_top_n() -> usize {
    10
}

/// Trade gate thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Fixed notional per paper position (USD)
    #[serde(default = "default_position_size")]
    pub position_size: Decimal,
    /// Minimum confidence to open a position automatically
    #[serde(default = "default_auto_trade_threshold")]
    pub auto_trade_threshold: u32,
    /// Minimum confidence to surface an alert payload
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u32,
    /// Markets resolving sooner than this are skipped
    #[serde(default = "default_min_days_to_close")]
    pub min_days_to_close: i64,
    /// Markets resolving later than this lock capital up too long
    #[serde(default = "default_max_days_to_close")]
    pub max_days_to_close: i64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            position_size: default_position_size(),
            auto_trade_threshold: default_auto_trade_threshold(),
            alert_threshold: default_alert_threshold(),
            min_days_to_close: default_min_days_to_close(),
            max_days_to_close: default_max_days_to_close(),
        }
    }
}

fn default_position_size() -> Decimal {
    dec!(50)
}

fn default_auto_trade_threshold() -> u32 {
    70
}

fn default_alert_threshold() -> u32 {
    80
}

fn default_min_days_to_close() -> i64 {
    7
}

fn default_max_days_to_close() -> i64 {
    180
}

/// Advisory oracle (news-aware LLM estimator). Empty api_key disables the
/// client and the gate falls back to algorithmic-only decisions.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AdvisoryConfig {
    #[serde(default)]
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Monitor loop settings
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Bound on each sub-check within a pass
    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: u64,
    /// Close when unrealized ROI falls at or below this (percent)
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    /// Close when unrealized ROI reaches this (percent)
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            check_timeout_secs: default_check_timeout(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
        }
    }
}

fn default_interval() -> u64 {
    300
}

fn default_check_timeout() -> u64 {
    60
}

fn default_stop_loss_pct() -> Decimal {
    dec!(-15)
}

fn default_take_profit_pct() -> Decimal {
    dec!(20)
}
