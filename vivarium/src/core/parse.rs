//! Extraction of structured answers from free-form model responses.
//!
//! Providers return arbitrary text. The donor game only relies on two
//! conventions: donation decisions carry an `ANSWER: <number>` line, and
//! strategy statements carry a line starting `My strategy will be`.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Marker every strategy statement must start with (case-insensitive).
pub const STRATEGY_MARKER: &str = "My strategy will be";

static ANSWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ANSWER:\s*(\d*\.?\d+)").expect("answer regex should be valid"));

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("no ANSWER line found in response: {0:?}")]
    MissingAnswer(String),
    #[error("could not parse donation amount {0:?}")]
    BadAmount(String),
}

/// Extract the donated amount from a decision response.
///
/// Matches the first `ANSWER: <number>` occurrence; the number may be an
/// integer or a decimal. Negative amounts cannot match.
pub fn parse_donation_answer(response: &str) -> Result<f64, ParseError> {
    let captures = ANSWER_RE
        .captures(response)
        .ok_or_else(|| ParseError::MissingAnswer(response.to_string()))?;
    let raw = &captures[1];
    raw.parse::<f64>()
        .map_err(|_| ParseError::BadAmount(raw.to_string()))
}

/// Extract the strategy sentence from a strategy response.
///
/// Scans lines for one starting with [`STRATEGY_MARKER`] (case-insensitive)
/// and returns the remainder of that line. `None` means the caller should
/// retry with a reformulation prompt.
pub fn extract_strategy(response: &str) -> Option<String> {
    let marker = STRATEGY_MARKER.to_lowercase();
    response.lines().find_map(|line| {
        let trimmed = line.trim();
        if trimmed.to_lowercase().starts_with(&marker) {
            Some(trimmed[STRATEGY_MARKER.len()..].trim().to_string())
        } else {
            None
        }
    })
}
