//! Agent collaborator contract.
//!
//! The engine is agnostic to the language-model backend. Every role it
//! drives (writer, director, reviewer, character, and the degraded
//! fallback) goes through [`AgentProvider::generate`].

use crate::message::Message;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from the agent collaborator.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The backend rejected or failed the request.
    #[error("generation failed: {0}")]
    Backend(String),

    /// The backend returned no usable text.
    #[error("generation returned no text")]
    Empty,
}

/// External language-model collaborator.
///
/// `role_context` describes who is speaking (persona and standing
/// orders), `instructions` what they should do right now, and `memory`
/// the messages they may draw on. How the backend folds these into a
/// prompt is its own business; [`format_transcript`] renders the
/// memory the way the engine's own prompts do.
#[async_trait]
pub trait AgentProvider: Send + Sync {
    /// Generate one reply for the given role.
    async fn generate(
        &self,
        role_context: &str,
        instructions: &str,
        memory: &[Message],
    ) -> Result<String, GenerationError>;
}

#[async_trait]
impl<T: AgentProvider + ?Sized> AgentProvider for std::sync::Arc<T> {
    async fn generate(
        &self,
        role_context: &str,
        instructions: &str,
        memory: &[Message],
    ) -> Result<String, GenerationError> {
        (**self).generate(role_context, instructions, memory).await
    }
}

/// Render messages as transcript lines for prompt context.
pub fn format_transcript<'a>(messages: impl IntoIterator<Item = &'a Message>) -> String {
    let lines: Vec<String> = messages.into_iter().map(Message::transcript_line).collect();
    if lines.is_empty() {
        "(no recorded memory)".to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::message::Sender;

    #[test]
    fn test_format_transcript() {
        let mut store = MemoryStore::with_characters(["Mage"]);
        store.write_group("Warrior", "Onward!", Sender::Character);
        store.write_group("Mage", "Carefully.", Sender::Character);

        let text = format_transcript(store.shared_log());
        assert_eq!(text, "Warrior: Onward!\nMage: Carefully.");
    }

    #[test]
    fn test_format_empty_transcript() {
        assert_eq!(format_transcript([]), "(no recorded memory)");
    }
}
