//! Session - the primary public API for running a scene.
//!
//! A [`Session`] owns the memory store, turn state, character roster,
//! and collaborator handles for one conversation; nothing is shared
//! across sessions. It replaces the ambient per-UI state of a chat
//! frontend with one explicit object that is passed around by
//! reference.

use crate::character::Character;
use crate::director::{
    DirectedRound, DirectorPipeline, DirectorPlan, FallbackGenerator, Performance,
    PipelineConfig, PlotGoal, ReviewVerdict, RoundContext, Utterance,
};
use crate::llm::AgentProvider;
use crate::memory::{MemoryError, MemoryStore};
use crate::message::{Message, Sender};
use crate::retrieval::{Embedder, HybridRetriever};
use crate::turn::{TurnCoordinator, TurnMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Configuration for creating a new session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Scene description.
    pub scene: String,

    /// Initial character roster.
    pub characters: Vec<Character>,

    /// Speaking mode.
    pub mode: TurnMode,

    /// Display name for the user's own lines.
    pub user_name: String,

    /// Pipeline tunables (retry budget, retrieval windows).
    pub pipeline: PipelineConfig,
}

impl SessionConfig {
    /// Create a config for the given scene.
    pub fn new(scene: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
            characters: Vec::new(),
            mode: TurnMode::MultiSpeaker,
            user_name: "User".to_string(),
            pipeline: PipelineConfig::default(),
        }
    }

    /// Add a character to the initial roster.
    pub fn with_character(mut self, character: Character) -> Self {
        self.characters.push(character);
        self
    }

    /// Add several characters to the initial roster.
    pub fn with_characters(mut self, characters: impl IntoIterator<Item = Character>) -> Self {
        self.characters.extend(characters);
        self
    }

    /// Set the speaking mode.
    pub fn with_mode(mut self, mode: TurnMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the user's display name.
    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = name.into();
        self
    }

    /// Set the perform-retry budget.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.pipeline.max_retries = max_retries;
        self
    }

    /// Set the retrieval window sizes.
    pub fn with_retrieval(mut self, recent_k: usize, relevant_k: usize) -> Self {
        self.pipeline.recent_k = recent_k;
        self.pipeline.relevant_k = relevant_k;
        self
    }
}

/// Result of one round request.
///
/// A round always completes; at worst the utterance list is empty.
#[derive(Debug)]
pub struct RoundOutcome {
    /// Accepted utterances, in speaking order.
    pub utterances: Vec<Utterance>,
    /// Characters that deliberately stayed silent.
    pub abstained: Vec<String>,
    /// The writer's plot goal (absent on fallback rounds).
    pub plot_goal: Option<PlotGoal>,
    /// The director's casting plan (absent on fallback rounds).
    pub plan: Option<DirectorPlan>,
    /// The reviewer's verdict (absent on fallback rounds).
    pub review: Option<ReviewVerdict>,
    /// Perform retries executed before the verdict.
    pub retry_count: usize,
    /// Whether the round degraded to single-pass generation.
    pub via_fallback: bool,
}

impl RoundOutcome {
    fn empty() -> Self {
        Self {
            utterances: Vec::new(),
            abstained: Vec::new(),
            plot_goal: None,
            plan: None,
            review: None,
            retry_count: 0,
            via_fallback: false,
        }
    }

    fn from_directed(directed: DirectedRound) -> Self {
        let (utterances, abstained) = split_performances(directed.performances);
        Self {
            utterances,
            abstained,
            plot_goal: Some(directed.plot_goal),
            plan: Some(directed.plan),
            review: Some(directed.review),
            retry_count: directed.retry_count,
            via_fallback: false,
        }
    }

    fn from_fallback(performances: Vec<Performance>) -> Self {
        let (utterances, abstained) = split_performances(performances);
        Self {
            utterances,
            abstained,
            via_fallback: true,
            ..Self::empty()
        }
    }

    /// Whether the round produced no accepted utterances.
    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }
}

fn split_performances(performances: Vec<Performance>) -> (Vec<Utterance>, Vec<String>) {
    let mut utterances = Vec::new();
    let mut abstained = Vec::new();
    for performance in performances {
        match performance {
            Performance::Spoken(utterance) => utterances.push(utterance),
            Performance::Abstained { speaker } => abstained.push(speaker),
        }
    }
    (utterances, abstained)
}

/// Serializable session state.
///
/// The embedding index is not part of the snapshot; restoring re-offers
/// every stored message to the indexer instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Scene description.
    pub scene: String,
    /// Character roster.
    pub characters: Vec<Character>,
    /// Display name for the user's lines.
    pub user_name: String,
    /// Shared log, private partitions, and the message clock.
    pub store: MemoryStore,
    /// Speaking mode and rotation index.
    pub turn_state: TurnCoordinator,
}

/// A running multi-character scene.
pub struct Session {
    scene: String,
    characters: Vec<Character>,
    user_name: String,
    store: MemoryStore,
    retriever: HybridRetriever,
    coordinator: TurnCoordinator,
    pipeline: DirectorPipeline,
    fallback: FallbackGenerator,
    agent: Box<dyn AgentProvider>,
}

impl Session {
    /// Create a session without semantic retrieval (recency only).
    pub fn new(config: SessionConfig, agent: Box<dyn AgentProvider>) -> Self {
        Self::build(config, agent, HybridRetriever::new())
    }

    /// Create a session with an embedding collaborator for semantic
    /// retrieval.
    pub fn with_embedder(
        config: SessionConfig,
        agent: Box<dyn AgentProvider>,
        embedder: Box<dyn Embedder>,
    ) -> Self {
        Self::build(config, agent, HybridRetriever::with_embedder(embedder))
    }

    fn build(config: SessionConfig, agent: Box<dyn AgentProvider>, retriever: HybridRetriever) -> Self {
        let store = MemoryStore::with_characters(config.characters.iter().map(|c| c.name.as_str()));
        Self {
            scene: config.scene,
            characters: config.characters,
            user_name: config.user_name,
            store,
            retriever,
            coordinator: TurnCoordinator::new(config.mode),
            pipeline: DirectorPipeline::new(config.pipeline),
            fallback: FallbackGenerator::new(),
            agent,
        }
    }

    /// Restore a session from a snapshot.
    ///
    /// Stored messages are re-offered to the embedding indexer, since
    /// the index itself is never persisted.
    pub async fn restore(
        snapshot: SessionSnapshot,
        agent: Box<dyn AgentProvider>,
        embedder: Option<Box<dyn Embedder>>,
    ) -> Self {
        let retriever = match embedder {
            Some(embedder) => HybridRetriever::with_embedder(embedder),
            None => HybridRetriever::new(),
        };
        let mut session = Self {
            scene: snapshot.scene,
            characters: snapshot.characters,
            user_name: snapshot.user_name,
            store: snapshot.store,
            retriever,
            coordinator: snapshot.turn_state,
            pipeline: DirectorPipeline::default(),
            fallback: FallbackGenerator::new(),
            agent,
        };
        session.reindex().await;
        session
    }

    async fn reindex(&mut self) {
        let shared: Vec<Message> = self.store.shared_log().to_vec();
        for message in &shared {
            self.retriever.index_message(message).await;
        }
        let names: Vec<String> = self.characters.iter().map(|c| c.name.clone()).collect();
        for name in names {
            let private: Vec<Message> = self
                .store
                .read_private_only(&name)
                .into_iter()
                .cloned()
                .collect();
            for message in &private {
                self.retriever.index_message(message).await;
            }
        }
    }

    /// The scene description.
    pub fn scene(&self) -> &str {
        &self.scene
    }

    /// The current character roster.
    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    /// The memory store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// The hybrid retriever.
    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    /// The turn coordinator.
    pub fn coordinator(&self) -> &TurnCoordinator {
        &self.coordinator
    }

    /// Replace the pipeline tunables, e.g. after a restore.
    pub fn with_pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline = DirectorPipeline::new(config);
        self
    }

    /// Switch speaking modes mid-session.
    pub fn set_mode(&mut self, mode: TurnMode) {
        self.coordinator.set_mode(mode);
    }

    /// Add a character to the roster mid-session.
    ///
    /// The newcomer starts with an empty memory partition: no backfill
    /// of earlier history. A duplicate name is ignored.
    pub fn add_character(&mut self, character: Character) {
        if self.characters.iter().any(|c| c.name == character.name) {
            debug!(name = %character.name, "character already present; ignoring");
            return;
        }
        self.store.add_partition(&character.name);
        self.characters.push(character);
    }

    /// Run one round of conversation.
    ///
    /// Records the user's line (if any), selects candidates, runs the
    /// directed pipeline (degrading to single-pass fallback on any
    /// collaborator failure), writes accepted utterances back to
    /// memory, and advances the turn state. Always completes.
    pub async fn run_round(&mut self, user_input: Option<&str>) -> RoundOutcome {
        if let Some(line) = user_input {
            let user_name = self.user_name.clone();
            let message = self.store.write_group(&user_name, line, Sender::User);
            self.retriever.index_message(&message).await;
        }

        let candidates: Vec<Character> = self
            .coordinator
            .select(&self.characters)
            .into_iter()
            .cloned()
            .collect();
        if candidates.is_empty() {
            debug!("no candidates for this round; nothing to generate");
            return RoundOutcome::empty();
        }

        let ctx = RoundContext {
            scene: &self.scene,
            roster: &self.characters,
            candidates: &candidates,
            user_input,
        };

        let outcome = match self
            .pipeline
            .run_round(self.agent.as_ref(), &self.store, &mut self.retriever, &ctx)
            .await
        {
            Ok(directed) => RoundOutcome::from_directed(directed),
            Err(err) => {
                warn!(error = %err, "pipeline failed; degrading to single-pass generation");
                let performances = self
                    .fallback
                    .round(
                        self.agent.as_ref(),
                        &self.store,
                        &self.scene,
                        &candidates,
                        user_input,
                    )
                    .await;
                RoundOutcome::from_fallback(performances)
            }
        };

        self.commit(&outcome).await;
        self.coordinator.advance(self.characters.len());
        outcome
    }

    /// Open a fresh scene with one establishing line per character.
    ///
    /// A single-pass generation: no director artifacts and no turn
    /// rotation.
    pub async fn open_scene(&mut self) -> RoundOutcome {
        let candidates = self.characters.clone();
        let performances = self
            .fallback
            .opening(self.agent.as_ref(), &self.store, &self.scene, &candidates)
            .await;
        let outcome = RoundOutcome::from_fallback(performances);
        self.commit(&outcome).await;
        outcome
    }

    /// Hold a private exchange between the user and one character.
    ///
    /// Both the user's line and the reply are written to the target's
    /// private partition only. The caller must target an existing
    /// character; a generation failure is logged and yields no reply.
    pub async fn private_chat(
        &mut self,
        character_name: &str,
        user_message: &str,
    ) -> Result<Option<Utterance>, MemoryError> {
        let Some(character) = self
            .characters
            .iter()
            .find(|c| c.name == character_name)
            .cloned()
        else {
            return Err(MemoryError::UnknownCharacter(character_name.to_string()));
        };

        let user_name = self.user_name.clone();
        let message =
            self.store
                .write_private(&character.name, &user_name, user_message, Sender::User)?;
        self.retriever.index_message(&message).await;

        let config = self.pipeline.config().clone();
        let memory: Vec<Message> = self
            .retriever
            .hybrid(
                &self.store,
                &character.name,
                user_message,
                config.recent_k,
                config.relevant_k,
            )
            .await
            .into_iter()
            .cloned()
            .collect();

        let instructions = format!(
            "You are in a one-on-one private conversation with {user_name}; \
             the other characters cannot hear you. \
             {user_name} just said: {user_message}\n\n\
             Reply with one short line, speaking freely."
        );

        match self
            .agent
            .generate(
                &crate::director::character_role(&self.scene, &character),
                &instructions,
                &memory,
            )
            .await
        {
            Ok(reply) => {
                let content = reply.trim().to_string();
                if content.is_empty() {
                    return Ok(None);
                }
                let message = self.store.write_private(
                    &character.name,
                    &character.name,
                    &content,
                    Sender::Character,
                )?;
                self.retriever.index_message(&message).await;
                Ok(Some(Utterance {
                    speaker: character.name,
                    content,
                }))
            }
            Err(err) => {
                warn!(
                    character = %character.name,
                    error = %err,
                    "private reply generation failed"
                );
                Ok(None)
            }
        }
    }

    /// Discard every message and restart the turn rotation, keeping the
    /// scene and roster.
    pub fn reset(&mut self) {
        self.store.reset();
        self.retriever.clear_index();
        self.coordinator.reset();
    }

    /// Capture the serializable session state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            scene: self.scene.clone(),
            characters: self.characters.clone(),
            user_name: self.user_name.clone(),
            store: self.store.clone(),
            turn_state: self.coordinator.clone(),
        }
    }

    async fn commit(&mut self, outcome: &RoundOutcome) {
        for utterance in &outcome.utterances {
            let message =
                self.store
                    .write_group(&utterance.speaker, &utterance.content, Sender::Character);
            self.retriever.index_message(&message).await;
        }
    }
}
