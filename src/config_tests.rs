//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_detector_config_default() {
        let config = DetectorConfig::default();
        assert_eq!(config.whale_min_size, dec!(2000));
        assert_eq!(config.cluster_window_secs, 3600);
        assert_eq!(config.min_whales, 3);
        assert_eq!(config.cluster_lookback_hours, 2);
        assert_eq!(config.divergence_min_size, dec!(3000));
        assert_eq!(config.divergence_lookback_hours, 4);
        assert_eq!(config.divergence_min_confidence, 70);
        assert_eq!(config.reversal_lookback_hours, 6);
        assert_eq!(config.reversal_whale_min_size, dec!(3000));
        assert_eq!(config.min_price_move, dec!(0.15));
        assert_eq!(config.reversal_min_confidence, 70);
        assert_eq!(config.top_n, 10);
    }

    #[test]
    fn test_detector_config_from_empty_toml() {
        let config: DetectorConfig = toml::from_str("").unwrap();
        assert_eq!(config.whale_min_size, dec!(2000));
        assert_eq!(config.top_n, 10);
    }

    #[test]
    fn test_gate_config_default() {
        let config = GateConfig::default();
        assert_eq!(config.position_size, dec!(50));
        assert_eq!(config.auto_trade_threshold, 70);
        assert_eq!(config.alert_threshold, 80);
        assert_eq!(config.min_days_to_close, 7);
        assert_eq!(config.max_days_to_close, 180);
    }

    #[test]
    fn test_gate_config_deserialize() {
        let toml_str = r#"
position_size = 25
auto_trade_threshold = 75
alert_threshold = 85
min_days_to_close = 14
max_days_to_close = 90
"#;
        let config: GateConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.position_size, dec!(25));
        assert_eq!(config.auto_trade_threshold, 75);
        assert_eq!(config.alert_threshold, 85);
        assert_eq!(config.min_days_to_close, 14);
        assert_eq!(config.max_days_to_close, 90);
    }

    #[test]
    fn test_monitor_config_defaults() {
        let config: MonitorConfig = toml::from_str("").unwrap();
        assert_eq!(config.interval_secs, 300);
        assert_eq!(config.check_timeout_secs, 60);
        assert_eq!(config.stop_loss_pct, dec!(-15));
        assert_eq!(config.take_profit_pct, dec!(20));
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.gamma_url, "https://gamma-api.polymarket.com");
        assert_eq!(config.site_url, "https://polymarket.com");
        assert_eq!(config.clob_url, "https://clob.polymarket.com");
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn test_advisory_config_minimal() {
        let config: AdvisoryConfig = toml::from_str("").unwrap();
        assert!(config.api_key.is_empty());
        assert!(config.model.is_none());
        assert!(config.base_url.is_none());
    }

    #[test]
    fn test_advisory_config_with_model() {
        let toml_str = r#"
api_key = "xai-xxx"
model = "grok-4-1-fast-reasoning"
base_url = "https://api.x.ai"
"#;
        let config: AdvisoryConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_key, "xai-xxx");
        assert_eq!(config.model, Some("grok-4-1-fast-reasoning".to_string()));
        assert_eq!(config.base_url, Some("https://api.x.ai".to_string()));
    }

    #[test]
    fn test_database_config_default_path() {
        let config: DatabaseConfig = toml::from_str("").unwrap();
        assert_eq!(config.path, "data/trading.db");
    }

    #[test]
    fn test_full_config_from_empty_sections() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.gate.auto_trade_threshold, 70);
        assert_eq!(config.monitor.interval_secs, 300);
        assert_eq!(config.detector.min_whales, 3);
    }

    #[test]
    fn test_full_config_overrides() {
        let toml_str = r#"
[database]
path = "custom/bot.db"

[detector]
whale_min_size = 5000

[gate]
position_size = 100

[monitor]
interval_secs = 600
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database.path, "custom/bot.db");
        assert_eq!(config.detector.whale_min_size, dec!(5000));
        // Untouched fields keep their defaults
        assert_eq!(config.detector.min_whales, 3);
        assert_eq!(config.gate.position_size, dec!(100));
        assert_eq!(config.monitor.interval_secs, 600);
    }
}
