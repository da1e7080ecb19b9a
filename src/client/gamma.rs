//! Market metadata, existence and resolution lookups
//!
//! Every call here is best-effort with a short timeout. Callers decide
//! what a failure means: timing and price lookups fail open, only the
//! definitive 404 on the existence check fails closed.

use crate::config::ClientConfig;
use crate::error::{BotError, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

/// Tri-state existence result; callers pattern-match instead of guessing
/// what an error meant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistenceCheck {
    Confirmed,
    /// Definitive 404: the market does not exist or was delisted
    NotFound,
    /// Could not verify (timeout, 5xx, ...) — allow with a warning
    Unverified(String),
}

/// Resolution state of a market
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketResolution {
    Pending,
    Resolved { winning_outcome: String },
    Cancelled,
}

/// Timing metadata for an event, from the metadata API
#[derive(Debug, Clone)]
pub struct EventTiming {
    pub end_date: Option<DateTime<Utc>>,
    pub title: Option<String>,
}

impl EventTiming {
    pub fn days_until_close(&self) -> Option<i64> {
        self.end_date.map(|end| (end - Utc::now()).num_days())
    }
}

#[derive(Debug, Deserialize)]
struct GammaEvent {
    title: Option<String>,
    #[serde(rename = "endDate")]
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GammaMarket {
    outcomes: Option<String>,       // JSON string, e.g. "[\"Yes\", \"No\"]"
    #[serde(rename = "outcomePrices")]
    outcome_prices: Option<String>, // JSON string, e.g. "[\"0.55\", \"0.45\"]"
}

#[derive(Debug, Deserialize)]
struct ClobMarket {
    #[serde(default)]
    closed: bool,
    #[serde(default = "default_active")]
    active: bool,
    #[serde(default)]
    tokens: Vec<ClobToken>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ClobToken {
    outcome: Option<String>,
    #[serde(default)]
    winner: bool,
}

#[derive(Clone)]
pub struct GammaClient {
    http: Client,
    gamma_url: String,
    site_url: String,
    clob_url: String,
}

impl GammaClient {
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            gamma_url: cfg.gamma_url.trim_end_matches('/').to_string(),
            site_url: cfg.site_url.trim_end_matches('/').to_string(),
            clob_url: cfg.clob_url.trim_end_matches('/').to_string(),
        })
    }

    /// End date and full title for an event
    pub async fn event_timing(&self, slug: &str) -> Result<Option<EventTiming>> {
        let url = format!("{}/events", self.gamma_url);
        let resp = self.http.get(&url).query(&[("slug", slug)]).send().await?;

        if !resp.status().is_success() {
            return Err(BotError::Api(format!(
                "events lookup for {} returned {}",
                slug,
                resp.status()
            )));
        }

        let events: Vec<GammaEvent> = resp.json().await?;
        let Some(event) = events.into_iter().next() else {
            return Ok(None);
        };

        Ok(Some(EventTiming {
            end_date: event.end_date.as_ref().and_then(|s| s.parse().ok()),
            title: event.title,
        }))
    }

    /// Lightweight existence probe against the public market page
    pub async fn market_exists(&self, slug: &str) -> ExistenceCheck {
        let url = format!("{}/event/{}", self.site_url, slug);
        match self.http.head(&url).send().await {
            Ok(resp) if resp.status().is_success() => ExistenceCheck::Confirmed,
            Ok(resp) if resp.status().as_u16() == 404 => ExistenceCheck::NotFound,
            Ok(resp) => ExistenceCheck::Unverified(format!("status {}", resp.status())),
            Err(e) => ExistenceCheck::Unverified(e.to_string()),
        }
    }

    /// Current price of one outcome of a market
    pub async fn outcome_price(&self, slug: &str, outcome: &str) -> Result<Option<Decimal>> {
        let url = format!("{}/markets/{}", self.gamma_url, slug);
        let resp = self.http.get(&url).send().await?;

        if !resp.status().is_success() {
            debug!("Market {} returned {}", slug, resp.status());
            return Ok(None);
        }

        let market: GammaMarket = resp.json().await?;

        // The API returns prices as a JSON string of string numbers
        let prices: Vec<Decimal> = market
            .outcome_prices
            .as_ref()
            .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
            .map(|strings| {
                strings
                    .iter()
                    .filter_map(|p| p.parse::<Decimal>().ok())
                    .collect()
            })
            .unwrap_or_default();

        let names: Vec<String> = market
            .outcomes
            .as_ref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_else(|| vec!["Yes".to_string(), "No".to_string()]);

        let wanted = outcome.to_lowercase();
        Ok(names
            .iter()
            .position(|n| n.to_lowercase() == wanted)
            .and_then(|i| prices.get(i).copied()))
    }

    /// Resolution state for accuracy tracking
    pub async fn market_resolution(&self, slug: &str) -> Result<MarketResolution> {
        let url = format!("{}/markets/{}", self.clob_url, slug);
        let resp = self.http.get(&url).send().await?;

        if !resp.status().is_success() {
            return Ok(MarketResolution::Pending);
        }

        let market: ClobMarket = resp.json().await?;

        if !market.closed && market.active {
            return Ok(MarketResolution::Pending);
        }

        for token in &market.tokens {
            if token.winner {
                if let Some(outcome) = &token.outcome {
                    return Ok(MarketResolution::Resolved {
                        winning_outcome: outcome.to_uppercase(),
                    });
                }
            }
        }

        // Closed with no winner flag: likely voided
        if market.closed {
            return Ok(MarketResolution::Cancelled);
        }

        Ok(MarketResolution::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_days_until_close() {
        let timing = EventTiming {
            end_date: Some(Utc::now() + Duration::days(30)),
            title: Some("Some market".to_string()),
        };
        // Rounds down, so either 29 or 30 depending on sub-second timing
        let days = timing.days_until_close().unwrap();
        assert!((29..=30).contains(&days));

        let no_date = EventTiming {
            end_date: None,
            title: None,
        };
        assert!(no_date.days_until_close().is_none());
    }

    #[test]
    fn test_parse_clob_market_winner() {
        let json = r#"{
            "closed": true,
            "active": false,
            "tokens": [
                {"outcome": "Yes", "winner": false},
                {"outcome": "No", "winner": true}
            ]
        }"#;
        let market: ClobMarket = serde_json::from_str(json).unwrap();
        assert!(market.closed);
        assert!(market.tokens[1].winner);
    }

    #[test]
    fn test_parse_gamma_market_prices() {
        let json = r#"{
            "outcomes": "[\"Yes\", \"No\"]",
            "outcomePrices": "[\"0.55\", \"0.45\"]"
        }"#;
        let market: GammaMarket = serde_json::from_str(json).unwrap();
        let prices: Vec<String> =
            serde_json::from_str(market.outcome_prices.as_deref().unwrap()).unwrap();
        assert_eq!(prices, vec!["0.55", "0.45"]);
    }
}
