//! Director-managed round orchestration.
//!
//! Mirrors a theatre chain of command: a writer plans the beat, a
//! director casts it, the characters perform, and a reviewer gates
//! quality with a bounded retry budget. A degraded single-pass
//! generator stands in when the chain fails.

mod fallback;
mod pipeline;
mod plan;
mod review;

pub use fallback::FallbackGenerator;
pub(crate) use pipeline::character_role;
pub use pipeline::{
    DirectedRound, DirectorPipeline, Performance, PipelineConfig, PipelineError, RoundContext,
    Utterance,
};
pub use plan::{DirectorPlan, PlotGoal, DEFAULT_INSTRUCTION};
pub use review::{ReviewResult, ReviewVerdict};

/// Extract JSON from a reply that might wrap it in markdown code fences.
pub(crate) fn extract_json(text: &str) -> &str {
    let text = text.trim();

    // Handle ```json ... ``` blocks
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Handle ``` ... ``` blocks (without json specifier)
    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        let text = r#"{"selected_characters": [], "instructions": {}}"#;
        assert_eq!(extract_json(text), text);
    }

    #[test]
    fn test_extract_json_markdown() {
        let text = "```json\n{\"pass\": true}\n```";
        assert_eq!(extract_json(text), r#"{"pass": true}"#);
    }

    #[test]
    fn test_extract_json_markdown_no_specifier() {
        let text = "```\n{\"pass\": false}\n```";
        assert_eq!(extract_json(text), r#"{"pass": false}"#);
    }
}
