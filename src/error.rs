//! Error types for the bot

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BotError>;

#[derive(Debug, Error)]
pub enum BotError {
    /// Market confirmed nonexistent or delisted. Fatal to the signal,
    /// not to the run.
    #[error("Market not found: {0}")]
    MarketNotFound(String),

    /// Advisory oracle unreachable or returned garbage. Callers degrade
    /// to algorithmic-only gating.
    #[error("Advisory error: {0}")]
    Advisory(String),

    /// Remote API call failed (metadata, price lookup). Fail-open unless
    /// documented otherwise.
    #[error("API error: {0}")]
    Api(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unparseable payload (signal details, advisory response section).
    /// Skip the record, keep the batch.
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for BotError {
    fn from(e: serde_json::Error) -> Self {
        BotError::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = BotError::MarketNotFound("some-market".to_string());
        assert_eq!(e.to_string(), "Market not found: some-market");

        let e = BotError::Advisory("timeout".to_string());
        assert!(e.to_string().contains("Advisory"));
    }

    #[test]
    fn test_serde_error_maps_to_parse() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{nope");
        let e: BotError = bad.unwrap_err().into();
        assert!(matches!(e, BotError::Parse(_)));
    }
}
