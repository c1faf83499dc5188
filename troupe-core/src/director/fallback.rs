//! Degraded single-pass generation.
//!
//! When the directed pipeline fails, each candidate character gets one
//! direct generation call with a compact context: no planning, no
//! review. A character whose call fails is skipped; the rest still
//! speak. The same pass, with an opening instruction, seeds a fresh
//! scene with establishing lines.

use super::pipeline::{character_role, classify_reply, Performance};
use crate::character::Character;
use crate::llm::AgentProvider;
use crate::memory::MemoryStore;
use crate::message::Message;
use tracing::warn;

/// Shared-history lines included in the compact context.
const FALLBACK_HISTORY: usize = 5;

/// Single-pass per-character generator used when the pipeline fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackGenerator;

impl FallbackGenerator {
    /// Create a fallback generator.
    pub fn new() -> Self {
        Self
    }

    /// Generate one reply per candidate, independently.
    pub async fn round(
        &self,
        agent: &dyn AgentProvider,
        store: &MemoryStore,
        scene: &str,
        candidates: &[Character],
        user_input: Option<&str>,
    ) -> Vec<Performance> {
        let mut instructions = String::from("Give one short in-character reply to the scene so far.");
        if let Some(line) = user_input {
            instructions = format!("The user just said: {line}\n\n{instructions}");
        }
        self.single_pass(agent, store, scene, candidates, &instructions)
            .await
    }

    /// Generate one establishing line per character for a fresh scene.
    pub async fn opening(
        &self,
        agent: &dyn AgentProvider,
        store: &MemoryStore,
        scene: &str,
        candidates: &[Character],
    ) -> Vec<Performance> {
        self.single_pass(
            agent,
            store,
            scene,
            candidates,
            "The scene is just beginning. Open with a single establishing line \
             that shows who your character is.",
        )
        .await
    }

    async fn single_pass(
        &self,
        agent: &dyn AgentProvider,
        store: &MemoryStore,
        scene: &str,
        candidates: &[Character],
        instructions: &str,
    ) -> Vec<Performance> {
        let memory: Vec<Message> = store.recent_shared(FALLBACK_HISTORY).to_vec();
        let mut performances = Vec::with_capacity(candidates.len());
        for character in candidates {
            match agent
                .generate(&character_role(scene, character), instructions, &memory)
                .await
            {
                Ok(reply) => performances.push(classify_reply(&character.name, &reply)),
                Err(err) => {
                    warn!(
                        character = %character.name,
                        error = %err,
                        "fallback generation failed; skipping character"
                    );
                }
            }
        }
        performances
    }
}
