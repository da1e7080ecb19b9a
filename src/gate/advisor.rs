//! Advisory oracle client
//!
//! Consults a news-aware LLM estimator before opening a position. The
//! oracle is strictly best-effort: unreachable or unparseable responses
//! degrade the gate to algorithmic-only decisions, they never block the
//! run.

use crate::config::AdvisoryConfig;
use crate::error::{BotError, Result};
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://api.x.ai";
const DEFAULT_MODEL: &str = "grok-4-1-fast-reasoning";

/// Concerns longer than this read as a flagged ambiguity
const CONCERNS_REJECT_LEN: usize = 50;
/// Oracle and detector disagreeing by more than this is irreconcilable
const MAX_DISAGREEMENT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisoryRecommendation {
    Trade,
    Hold,
    Skip,
}

/// Parsed oracle assessment
#[derive(Debug, Clone)]
pub struct AdvisoryAssessment {
    /// Probability estimate on the same 0-100 scale the detectors use
    pub probability: f64,
    pub concerns: String,
    pub recommendation: AdvisoryRecommendation,
}

/// Explicit tri-state: callers pattern-match instead of treating an
/// outage like a SKIP
#[derive(Debug, Clone)]
pub enum AdvisoryOutcome {
    Assessed(AdvisoryAssessment),
    Unavailable,
}

pub struct AdvisoryClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AdvisoryClient {
    pub fn new(cfg: &AdvisoryConfig) -> Self {
        Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key: cfg.api_key.clone(),
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: cfg
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    /// Ask the oracle for an independent probability estimate
    pub async fn assess(
        &self,
        market_question: &str,
        outcome: &str,
        algo_confidence: u32,
    ) -> AdvisoryOutcome {
        if self.api_key.is_empty() {
            return AdvisoryOutcome::Unavailable;
        }

        let prompt = format!(
            r#"Based on the latest news from accurate sources, analyze this prediction market:

Market Question: {}
Betting on outcome: {}
Algorithmic confidence: {}%

Please provide your assessment in this exact format:
PROBABILITY: [0-100]%
KEY FACTORS: [bullet points of relevant news]
CONCERNS: [any ambiguities, definitional issues, or red flags]
RECOMMENDATION: [TRADE/HOLD/SKIP]

Focus on facts from reputable sources and be specific about timing and definitions."#,
            market_question, outcome, algo_confidence
        );

        match self.call(&prompt).await {
            Ok(response) => match parse_assessment(&response) {
                Ok(assessment) => AdvisoryOutcome::Assessed(assessment),
                Err(e) => {
                    warn!("Advisory response unparseable: {}", e);
                    AdvisoryOutcome::Unavailable
                }
            },
            Err(e) => {
                warn!("Advisory oracle unreachable: {}", e);
                AdvisoryOutcome::Unavailable
            }
        }
    }

    async fn call(&self, prompt: &str) -> Result<String> {
        let request = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a prediction market analyst with access to the latest news. Provide probability estimates based on current information from reputable sources."
                },
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.3,
            "max_tokens": 500
        });

        let resp: serde_json::Value = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        resp["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| BotError::Advisory("empty oracle response".to_string()))
    }
}

fn probability_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"PROBABILITY:\s*(\d+(?:\.\d+)?)").expect("valid regex"))
}

fn any_percent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("valid regex"))
}

fn concerns_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)CONCERNS:\s*(.+?)(?:RECOMMENDATION:|$)").expect("valid regex")
    })
}

fn recommendation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"RECOMMENDATION:\s*(\w+)").expect("valid regex"))
}

pub fn parse_assessment(text: &str) -> Result<AdvisoryAssessment> {
    Ok(AdvisoryAssessment {
        probability: parse_probability(text),
        concerns: extract_concerns(text),
        recommendation: extract_recommendation(text),
    })
}

/// PROBABILITY line first, any percentage as fallback, 50 if neither
pub fn parse_probability(text: &str) -> f64 {
    if let Some(cap) = probability_regex().captures(text) {
        if let Ok(p) = cap[1].parse() {
            return p;
        }
    }
    any_percent_regex()
        .captures(text)
        .and_then(|cap| cap[1].parse().ok())
        .unwrap_or(50.0)
}

/// Concerns only count when they contain a red-flag keyword; routine
/// hedging is not a rejection signal
pub fn extract_concerns(text: &str) -> String {
    const RED_FLAGS: &[&str] = &["partial", "ambiguous", "unclear", "definition", "depends on"];

    if let Some(cap) = concerns_regex().captures(text) {
        let concerns = cap[1].trim();
        let lower = concerns.to_lowercase();
        if RED_FLAGS.iter().any(|flag| lower.contains(flag)) {
            return concerns.chars().take(200).collect();
        }
    }
    String::new()
}

pub fn extract_recommendation(text: &str) -> AdvisoryRecommendation {
    match recommendation_regex()
        .captures(text)
        .map(|cap| cap[1].to_uppercase())
        .as_deref()
    {
        Some("TRADE") => AdvisoryRecommendation::Trade,
        Some("SKIP") => AdvisoryRecommendation::Skip,
        _ => AdvisoryRecommendation::Hold,
    }
}

/// Verdict of combining the detector score with the oracle opinion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdviceVerdict {
    Accept { advisor_note: Option<String> },
    Reject(String),
}

/// Decision tree, evaluated in order. The oracle probability and the
/// detector confidence share the 0-100 scale by convention.
pub fn evaluate_advice(
    algo_confidence: u32,
    advisory: &AdvisoryOutcome,
    fallback_threshold: u32,
) -> AdviceVerdict {
    let algo = algo_confidence as f64;

    let assessment = match advisory {
        AdvisoryOutcome::Unavailable => {
            // Degrade to algorithmic-only gating
            return if algo_confidence >= fallback_threshold {
                AdviceVerdict::Accept {
                    advisor_note: Some("advisory unavailable".to_string()),
                }
            } else {
                AdviceVerdict::Reject(format!(
                    "advisory unavailable and confidence {} below {}",
                    algo_confidence, fallback_threshold
                ))
            };
        }
        AdvisoryOutcome::Assessed(a) => a,
    };

    if assessment.concerns.len() > CONCERNS_REJECT_LEN {
        return AdviceVerdict::Reject(format!(
            "advisory flagged concerns: {}",
            assessment.concerns.chars().take(100).collect::<String>()
        ));
    }

    match assessment.recommendation {
        AdvisoryRecommendation::Hold => {
            return AdviceVerdict::Reject("advisory recommends HOLD".to_string());
        }
        AdvisoryRecommendation::Skip => {
            return AdviceVerdict::Reject("advisory recommends SKIP".to_string());
        }
        AdvisoryRecommendation::Trade => {}
    }

    if (assessment.probability - algo).abs() > MAX_DISAGREEMENT {
        return AdviceVerdict::Reject(format!(
            "irreconcilable disagreement: {}% algo vs {}% oracle",
            algo_confidence, assessment.probability
        ));
    }

    let aligned = algo >= 70.0 && assessment.probability >= 60.0;
    let oracle_led = assessment.probability >= 75.0 && algo >= 60.0;

    if aligned || oracle_led {
        AdviceVerdict::Accept {
            advisor_note: Some(format!("{}% algo, {}% oracle", algo_confidence, assessment.probability)),
        }
    } else {
        AdviceVerdict::Reject(format!(
            "insufficient combined confidence ({}% algo, {}% oracle)",
            algo_confidence, assessment.probability
        ))
    }
}
