//! Multi-character scene engine with scoped memory and an AI director.
//!
//! This crate provides:
//! - A scoped memory store: one shared event log plus a private view
//!   per character
//! - Hybrid retrieval fusing a recency window with semantic similarity
//!   search
//! - A turn coordinator with multi-speaker and rotating single-speaker
//!   modes
//! - A plan/assign/perform/review director pipeline with bounded retry
//!   and a degraded single-pass fallback
//!
//! The language-model and embedding backends are collaborator traits
//! ([`AgentProvider`], [`Embedder`]); the engine never talks to a
//! network itself.
//!
//! # Quick Start
//!
//! ```ignore
//! use troupe_core::{Character, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SessionConfig::new("A tavern cellar, after closing time")
//!         .with_character(Character::new("Warrior", "brave, blunt, impatient"))
//!         .with_character(Character::new("Mage", "careful, curious, secretive"));
//!
//!     let mut session = Session::new(config, Box::new(my_backend));
//!     let outcome = session.run_round(Some("What was that noise?")).await;
//!     for line in &outcome.utterances {
//!         println!("{}: {}", line.speaker, line.content);
//!     }
//! }
//! ```

pub mod character;
pub mod director;
pub mod llm;
pub mod memory;
pub mod message;
pub mod retrieval;
pub mod session;
pub mod testing;
pub mod turn;

// Primary public API
pub use character::Character;
pub use director::{
    DirectorPipeline, DirectorPlan, FallbackGenerator, Performance, PipelineConfig,
    PipelineError, PlotGoal, ReviewResult, ReviewVerdict, Utterance,
};
pub use llm::{AgentProvider, GenerationError};
pub use memory::{MemoryError, MemoryStore};
pub use message::{Message, MessageId, Scope, Sender, Timestamp};
pub use retrieval::{Embedder, EmbeddingError, HybridRetriever};
pub use session::{RoundOutcome, Session, SessionConfig, SessionSnapshot};
pub use turn::{TurnCoordinator, TurnMode};
