//! Review verdicts.
//!
//! The review stage judges a round against the plot goal. Malformed
//! reviewer output gets the benefit of the doubt, and an exhausted
//! retry budget forces acceptance — both as typed variants so neither
//! case travels as an error.

use super::extract_json;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

/// Scores and feedback from the reviewer role.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewResult {
    /// Whether the reviewer accepted the round.
    pub pass: bool,
    /// What to fix, when rejected.
    #[serde(default)]
    pub feedback: String,
    /// Per-metric scores, e.g. character consistency or plot advancement.
    #[serde(default)]
    pub scores: HashMap<String, f64>,
}

/// Outcome of the review stage.
#[derive(Debug, Clone)]
pub enum ReviewVerdict {
    /// Parsed from the reviewer's payload.
    Parsed(ReviewResult),
    /// The payload was malformed; the round passes by default.
    Default,
    /// The retry budget ran out; the last utterances are kept.
    Forced,
}

impl ReviewVerdict {
    /// Parse the reviewer's reply.
    pub fn parse(reply: &str) -> Self {
        match serde_json::from_str::<ReviewResult>(extract_json(reply)) {
            Ok(result) => ReviewVerdict::Parsed(result),
            Err(err) => {
                warn!(error = %err, "malformed review; passing by default");
                ReviewVerdict::Default
            }
        }
    }

    /// Whether the round's utterances are accepted.
    pub fn passed(&self) -> bool {
        match self {
            ReviewVerdict::Parsed(result) => result.pass,
            ReviewVerdict::Default | ReviewVerdict::Forced => true,
        }
    }

    /// Reviewer feedback, when any was given.
    pub fn feedback(&self) -> Option<&str> {
        match self {
            ReviewVerdict::Parsed(result) if !result.feedback.is_empty() => {
                Some(result.feedback.as_str())
            }
            _ => None,
        }
    }
}
