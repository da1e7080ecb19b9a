//! Category and timing filters for incoming signals
//!
//! Markets we never want the auto-trader touching: stale questions about
//! past years, sub-hour churn markets that expire before the next pass,
//! and sports (no information asymmetry for whales to exploit).

use crate::config::GateConfig;
use regex::Regex;
use std::sync::OnceLock;

/// Markets that expire too fast for a ~5 minute monitoring cycle
const HIGH_FREQ_PATTERNS: &[&str] = &[
    "15 min",
    "15min",
    "5 min",
    "5min",
    "10 min",
    "10min",
    "1 hour",
    "1hr",
    "30 min",
    "30min",
    "2 hour",
    "2hr",
    "up or down",
    "higher or lower",
    "updown",
    "btc-updown",
    "eth-updown",
    "next hour",
    "next minute",
    "within 1 hour",
    "in the next hour",
    "hourly",
    "minute by minute",
    "real-time",
];

const SPORTS_PATTERNS: &[&str] = &[
    "nba",
    "nfl",
    "nhl",
    "mlb",
    "premier league",
    "champions league",
    "world cup",
    "soccer",
    "football",
    "basketball",
    "baseball",
    "hockey",
    "vs.",
    "spread:",
];

const SPORTS_SLUG_PATTERNS: &[&str] = &[
    "nfl-",
    "nba-",
    "mlb-",
    "nhl-",
    "ufc-",
    "fifa-",
    "super-bowl",
    "world-cup",
    "olympics",
    "premier-league",
    "champions-league",
];

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(20\d{2})\b").expect("valid year regex"))
}

/// Category filters. Returns the rejection reason, or None to let the
/// signal through.
pub fn should_skip_market(question: &str, slug: &str, current_year: i32) -> Option<String> {
    for cap in year_regex().captures_iter(question) {
        if let Ok(year) = cap[1].parse::<i32>() {
            if year < current_year {
                return Some(format!("market about past year ({})", year));
            }
        }
    }

    let question_lower = question.to_lowercase();
    let slug_lower = slug.to_lowercase();

    if HIGH_FREQ_PATTERNS
        .iter()
        .any(|p| question_lower.contains(p) || slug_lower.contains(p))
    {
        return Some("high-frequency market".to_string());
    }

    if SPORTS_PATTERNS
        .iter()
        .any(|p| question_lower.contains(p) || slug_lower.contains(p))
        || SPORTS_SLUG_PATTERNS.iter().any(|p| slug_lower.contains(p))
    {
        return Some("sports market".to_string());
    }

    None
}

/// Resolution-window filter. Called only when the metadata lookup
/// succeeded; lookup failures fail open at the call site.
pub fn timing_verdict(days_until_close: i64, cfg: &GateConfig) -> Option<String> {
    if days_until_close < 0 {
        Some(format!(
            "market already closed {} day(s) ago",
            days_until_close.abs()
        ))
    } else if days_until_close < cfg.min_days_to_close {
        Some(format!(
            "market closes in {} day(s) (too soon)",
            days_until_close
        ))
    } else if days_until_close > cfg.max_days_to_close {
        Some(format!(
            "market closes in {} day(s) (capital locked too long)",
            days_until_close
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_past_year_is_skipped() {
        let reason = should_skip_market(
            "Will the U.S. collect between $100b and $200b in revenue in 2025?",
            "us-revenue-2025",
            2026,
        );
        assert!(reason.unwrap().contains("2025"));
    }

    #[test]
    fn test_future_year_is_allowed() {
        assert!(should_skip_market("Will Trump win the 2028 election?", "trump-2028", 2026).is_none());
    }

    #[test]
    fn test_current_year_is_allowed() {
        assert!(should_skip_market("Will the PPLE party win in 2026?", "pple-win-2026", 2026).is_none());
    }

    #[test]
    fn test_high_frequency_markets_skipped() {
        assert_eq!(
            should_skip_market("Bitcoin Up or Down - 3pm ET?", "bitcoin-up-or-down-3pm", 2026),
            Some("high-frequency market".to_string())
        );
        assert_eq!(
            should_skip_market("BTC next candle", "btc-updown-15m-1730000000", 2026),
            Some("high-frequency market".to_string())
        );
        assert_eq!(
            should_skip_market("Will Bitcoin hit $100k in the next hour?", "btc-100k", 2026),
            Some("high-frequency market".to_string())
        );
    }

    #[test]
    fn test_sports_markets_skipped() {
        assert_eq!(
            should_skip_market("Will the Lakers win tonight?", "nba-lakers-vs-celtics", 2026),
            Some("sports market".to_string())
        );
        assert_eq!(
            should_skip_market("Chiefs vs. Eagles winner?", "chiefs-eagles", 2026),
            Some("sports market".to_string())
        );
    }

    #[test]
    fn test_political_market_passes() {
        assert!(should_skip_market(
            "Will the Fed cut rates at the next FOMC meeting in 2027?",
            "fed-cut-2027",
            2026
        )
        .is_none());
    }

    #[test]
    fn test_timing_window() {
        let cfg = GateConfig::default();
        assert!(timing_verdict(-3, &cfg).unwrap().contains("closed"));
        assert!(timing_verdict(2, &cfg).unwrap().contains("too soon"));
        assert!(timing_verdict(200, &cfg).unwrap().contains("locked"));
        assert!(timing_verdict(7, &cfg).is_none());
        assert!(timing_verdict(180, &cfg).is_none());
        assert!(timing_verdict(45, &cfg).is_none());
    }
}
