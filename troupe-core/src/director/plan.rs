//! Director plan payloads.
//!
//! The assign stage exchanges a structured JSON payload with the agent
//! collaborator. A malformed payload is a typed variant that casts
//! every candidate with a generic instruction; it is never an error
//! and never aborts the round.

use super::extract_json;
use crate::character::Character;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Generic instruction used when the director did not provide one.
pub const DEFAULT_INSTRUCTION: &str = "Speak naturally, following your personality.";

/// Plot goal produced by the plan stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotGoal(pub String);

impl PlotGoal {
    /// The goal text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlotGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload shape expected from the director role.
#[derive(Debug, Deserialize)]
struct PlanPayload {
    #[serde(default)]
    selected_characters: Vec<String>,
    #[serde(default)]
    instructions: HashMap<String, String>,
}

/// Speaker assignment for one round.
#[derive(Debug, Clone)]
pub enum DirectorPlan {
    /// Parsed from the director's payload.
    Parsed {
        /// Characters chosen to act this round.
        selected: Vec<String>,
        /// Per-character speaking instructions.
        instructions: HashMap<String, String>,
    },
    /// The payload was malformed: every candidate acts with the
    /// generic instruction.
    Default,
}

impl DirectorPlan {
    /// Parse the director's reply.
    pub fn parse(reply: &str) -> Self {
        match serde_json::from_str::<PlanPayload>(extract_json(reply)) {
            Ok(payload) => DirectorPlan::Parsed {
                selected: payload.selected_characters,
                instructions: payload.instructions,
            },
            Err(err) => {
                warn!(error = %err, "malformed director plan; casting all candidates");
                DirectorPlan::Default
            }
        }
    }

    /// Whether this plan came from a well-formed payload.
    pub fn is_parsed(&self) -> bool {
        matches!(self, DirectorPlan::Parsed { .. })
    }

    /// Resolve the acting set against the round's candidates.
    ///
    /// Names not in the candidate set are dropped. An empty result
    /// falls back to the first candidate, so a round with any
    /// candidates at all always produces output.
    pub fn cast<'a>(&self, candidates: &'a [Character]) -> Vec<&'a Character> {
        let chosen: Vec<&Character> = match self {
            DirectorPlan::Parsed { selected, .. } => candidates
                .iter()
                .filter(|character| selected.iter().any(|name| name == &character.name))
                .collect(),
            DirectorPlan::Default => candidates.iter().collect(),
        };
        if chosen.is_empty() {
            candidates.first().map(|first| vec![first]).unwrap_or_default()
        } else {
            chosen
        }
    }

    /// The speaking instruction for a character.
    pub fn instruction_for(&self, character: &str) -> &str {
        match self {
            DirectorPlan::Parsed { instructions, .. } => instructions
                .get(character)
                .map(String::as_str)
                .unwrap_or(DEFAULT_INSTRUCTION),
            DirectorPlan::Default => DEFAULT_INSTRUCTION,
        }
    }
}
