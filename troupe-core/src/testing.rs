//! Testing utilities.
//!
//! Deterministic mock collaborators for exercising sessions without a
//! language-model backend:
//! - [`MockAgent`]: scripted per-role replies, failure injection, and
//!   call recording
//! - [`MockEmbedder`]: stable bag-of-words vectors
//! - [`SessionHarness`]: a session wired to both mocks
//!
//! The agent mock tells roles apart by markers in the role context, so
//! one mock serves writer, director, reviewer, and character calls.

use crate::character::Character;
use crate::llm::{AgentProvider, GenerationError};
use crate::memory::MemoryStore;
use crate::message::Message;
use crate::retrieval::{Embedder, EmbeddingError};
use crate::session::{RoundOutcome, Session, SessionConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Role-context markers, matching the static role preambles.
const WRITER_MARKER: &str = "scriptwriter";
const DIRECTOR_MARKER: &str = "stage director";
const REVIEWER_MARKER: &str = "drama critic";

/// A recorded call to [`MockAgent::generate`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// The role context the engine passed.
    pub role_context: String,
    /// The instructions the engine passed.
    pub instructions: String,
    /// How many memory messages came along.
    pub memory_len: usize,
}

/// Scripted agent collaborator.
///
/// Defaults: a bland plot goal, an unparseable assignment (which casts
/// every candidate), a passing review, and one stock line for any
/// character.
pub struct MockAgent {
    plot_goal: String,
    assignment: String,
    review: String,
    character_lines: HashMap<String, String>,
    default_line: String,
    failures: Vec<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockAgent {
    /// Create a mock with benign defaults.
    pub fn new() -> Self {
        Self {
            plot_goal: "Keep the conversation moving.".to_string(),
            assignment: String::new(),
            review: r#"{"pass": true, "feedback": "", "scores": {}}"#.to_string(),
            character_lines: HashMap::new(),
            default_line: "We press on.".to_string(),
            failures: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Script the writer's plot goal.
    pub fn with_plot_goal(mut self, goal: impl Into<String>) -> Self {
        self.plot_goal = goal.into();
        self
    }

    /// Script the director's assignment payload.
    pub fn with_assignment(mut self, payload: impl Into<String>) -> Self {
        self.assignment = payload.into();
        self
    }

    /// Script the reviewer's payload, returned on every review call.
    pub fn with_review(mut self, payload: impl Into<String>) -> Self {
        self.review = payload.into();
        self
    }

    /// Script one character's line, matched by name.
    pub fn with_character_line(
        mut self,
        name: impl Into<String>,
        line: impl Into<String>,
    ) -> Self {
        self.character_lines.insert(name.into(), line.into());
        self
    }

    /// Fail every call whose role context contains `marker`.
    ///
    /// Use a role marker (`"scriptwriter"`, `"stage director"`,
    /// `"drama critic"`) or a character fragment (`"You are Mage."`).
    pub fn with_failure(mut self, marker: impl Into<String>) -> Self {
        self.failures.push(marker.into());
        self
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of recorded calls whose role context contains `marker`.
    pub fn calls_matching(&self, marker: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.role_context.contains(marker))
            .count()
    }
}

impl Default for MockAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentProvider for MockAgent {
    async fn generate(
        &self,
        role_context: &str,
        instructions: &str,
        memory: &[Message],
    ) -> Result<String, GenerationError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedCall {
                role_context: role_context.to_string(),
                instructions: instructions.to_string(),
                memory_len: memory.len(),
            });

        if self
            .failures
            .iter()
            .any(|marker| role_context.contains(marker.as_str()))
        {
            return Err(GenerationError::Backend("scripted failure".to_string()));
        }

        if role_context.contains(WRITER_MARKER) {
            return Ok(self.plot_goal.clone());
        }
        if role_context.contains(DIRECTOR_MARKER) {
            return Ok(self.assignment.clone());
        }
        if role_context.contains(REVIEWER_MARKER) {
            return Ok(self.review.clone());
        }

        let line = self
            .character_lines
            .iter()
            .find(|(name, _)| role_context.contains(&format!("You are {name}.")))
            .map(|(_, line)| line.clone())
            .unwrap_or_else(|| self.default_line.clone());
        Ok(line)
    }
}

/// Deterministic bag-of-words embedder.
///
/// Words are hashed into a fixed number of buckets, so texts sharing
/// vocabulary score high on cosine similarity.
pub struct MockEmbedder {
    dimensions: usize,
    fail: bool,
}

impl MockEmbedder {
    /// Create a working embedder.
    pub fn new() -> Self {
        Self {
            dimensions: 32,
            fail: false,
        }
    }

    /// Create an embedder that always fails.
    pub fn failing() -> Self {
        Self {
            dimensions: 32,
            fail: true,
        }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.fail {
            return Err(EmbeddingError::Provider("scripted failure".to_string()));
        }
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vector[fnv1a(word) as usize % self.dimensions] += 1.0;
        }
        Ok(vector)
    }
}

fn fnv1a(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// A session wired to mock collaborators, with the agent kept
/// inspectable.
pub struct SessionHarness {
    /// The shared mock agent, for asserting on recorded calls.
    pub agent: Arc<MockAgent>,
    /// The session under test.
    pub session: Session,
}

impl SessionHarness {
    /// Create a harness with default mocks and a multi-speaker session.
    pub fn new(scene: &str, characters: Vec<Character>) -> Self {
        Self::with_agent(scene, characters, MockAgent::new())
    }

    /// Create a harness with a scripted agent.
    pub fn with_agent(scene: &str, characters: Vec<Character>, agent: MockAgent) -> Self {
        Self::from_config(SessionConfig::new(scene).with_characters(characters), agent)
    }

    /// Create a harness from a full session config.
    pub fn from_config(config: SessionConfig, agent: MockAgent) -> Self {
        let agent = Arc::new(agent);
        let session = Session::new(config, Box::new(Arc::clone(&agent)));
        Self { agent, session }
    }

    /// Create a harness with semantic retrieval enabled.
    pub fn from_config_with_embedder(config: SessionConfig, agent: MockAgent) -> Self {
        let agent = Arc::new(agent);
        let session = Session::with_embedder(
            config,
            Box::new(Arc::clone(&agent)),
            Box::new(MockEmbedder::new()),
        );
        Self { agent, session }
    }

    /// Run one round.
    pub async fn round(&mut self, user_input: Option<&str>) -> RoundOutcome {
        self.session.run_round(user_input).await
    }
}

/// Assert that a character's memory contains a message with this text.
#[track_caller]
pub fn assert_remembers(store: &MemoryStore, character: &str, needle: &str) {
    assert!(
        store.read(character, 0).iter().any(|m| m.content.contains(needle)),
        "expected '{character}' to remember '{needle}'"
    );
}

/// Assert that a character's memory contains no message with this text.
#[track_caller]
pub fn assert_never_heard(store: &MemoryStore, character: &str, needle: &str) {
    assert!(
        store.read(character, 0).iter().all(|m| !m.content.contains(needle)),
        "expected '{character}' to have never heard '{needle}'"
    );
}
