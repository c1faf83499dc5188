//! Hybrid memory retrieval.
//!
//! Answers "what should this character remember right now" by fusing
//! two signals: a recency window (what was just said) and semantic
//! similarity search (old but topically relevant facts a fixed window
//! would drop). The similarity side runs against an external embedding
//! collaborator and degrades to recency alone when that collaborator
//! is missing or failing; the degradation is logged and counted, never
//! surfaced to the caller.

use crate::memory::MemoryStore;
use crate::message::{Message, MessageId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from the embedding collaborator.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The provider rejected or failed the request.
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// No embedding provider is configured for this session.
    #[error("no embedding provider available")]
    Unavailable,
}

/// External embedding collaborator.
///
/// Maps text to a fixed-length vector; the retriever ranks candidates
/// by cosine similarity of these vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Produce a vector for the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for std::sync::Arc<T> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        (**self).embed(text).await
    }
}

/// Hybrid retriever: recency window fused with semantic search.
pub struct HybridRetriever {
    embedder: Option<Box<dyn Embedder>>,
    index: HashMap<MessageId, Vec<f32>>,
    index_failures: u64,
    degraded_queries: u64,
}

impl HybridRetriever {
    /// Create a recency-only retriever with no embedding collaborator.
    pub fn new() -> Self {
        Self {
            embedder: None,
            index: HashMap::new(),
            index_failures: 0,
            degraded_queries: 0,
        }
    }

    /// Create a retriever backed by an embedding collaborator.
    pub fn with_embedder(embedder: Box<dyn Embedder>) -> Self {
        Self {
            embedder: Some(embedder),
            ..Self::new()
        }
    }

    /// Whether semantic search is available at all.
    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Offer a message to the embedding index.
    ///
    /// Fire-and-forget: a failed embedding is logged and counted, the
    /// message is simply absent from semantic results, and the caller's
    /// write never fails because of it.
    pub async fn index_message(&mut self, message: &Message) {
        let Some(embedder) = &self.embedder else {
            return;
        };
        match embedder.embed(&message.content).await {
            Ok(vector) => {
                self.index.insert(message.id, vector);
            }
            Err(err) => {
                self.index_failures += 1;
                warn!(
                    message_id = %message.id,
                    error = %err,
                    "failed to index message for semantic retrieval"
                );
            }
        }
    }

    /// The last `k` messages visible to a character, in timestamp order.
    pub fn recent<'a>(&self, store: &'a MemoryStore, character: &str, k: usize) -> &'a [Message] {
        store.read(character, k)
    }

    /// Top-`k` messages visible to a character, ranked by similarity of
    /// content to `query`.
    ///
    /// Messages that never made it into the index are skipped.
    pub async fn semantic<'a>(
        &self,
        store: &'a MemoryStore,
        character: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<&'a Message>, EmbeddingError> {
        let embedder = self.embedder.as_ref().ok_or(EmbeddingError::Unavailable)?;
        let query_vector = embedder.embed(query).await?;

        let mut scored: Vec<(f32, &Message)> = store
            .read(character, 0)
            .iter()
            .filter_map(|message| {
                self.index
                    .get(&message.id)
                    .map(|vector| (cosine_similarity(&query_vector, vector), message))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, message)| message).collect())
    }

    /// Union of recency and semantic results for a character.
    ///
    /// De-duplicated by message identity (two distinct messages with
    /// identical text both survive) and re-sorted ascending by
    /// timestamp. A failing or absent semantic side degrades the result
    /// to the recency window alone.
    pub async fn hybrid<'a>(
        &mut self,
        store: &'a MemoryStore,
        character: &str,
        query: &str,
        recent_k: usize,
        relevant_k: usize,
    ) -> Vec<&'a Message> {
        let recent = self.recent(store, character, recent_k);
        let relevant = match self.semantic(store, character, query, relevant_k).await {
            Ok(found) => found,
            Err(EmbeddingError::Unavailable) => {
                self.degraded_queries += 1;
                debug!(character, "no embedding provider; using recency window only");
                Vec::new()
            }
            Err(err) => {
                self.degraded_queries += 1;
                warn!(
                    character,
                    error = %err,
                    "semantic retrieval failed; falling back to recency window"
                );
                Vec::new()
            }
        };

        let mut seen: HashSet<MessageId> = HashSet::new();
        let mut combined: Vec<&Message> = Vec::new();
        for message in recent.iter().chain(relevant) {
            if seen.insert(message.id) {
                combined.push(message);
            }
        }
        combined.sort_by_key(|message| message.timestamp);
        combined
    }

    /// Number of queries that degraded to recency alone.
    pub fn degraded_queries(&self) -> u64 {
        self.degraded_queries
    }

    /// Number of messages that failed to index.
    pub fn index_failures(&self) -> u64 {
        self.index_failures
    }

    /// Number of messages currently in the index.
    pub fn indexed_len(&self) -> usize {
        self.index.len()
    }

    /// Drop every index entry, keeping the collaborator and counters.
    pub fn clear_index(&mut self) {
        self.index.clear();
    }
}

impl Default for HybridRetriever {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::message::Sender;

    struct KeywordEmbedder;

    /// Embeds into a two-dimensional space: treasure-ness and danger-ness.
    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let lower = text.to_lowercase();
            let treasure = lower.matches("treasure").count() as f32;
            let danger = lower.matches("danger").count() as f32;
            Ok(vec![treasure, danger, 1.0])
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::Provider("offline".to_string()))
        }
    }

    fn seeded_store() -> MemoryStore {
        let mut store = MemoryStore::with_characters(["Mage"]);
        store.write_group("Warrior", "The treasure is behind the waterfall", Sender::Character);
        store.write_group("Rogue", "I heard wolves last night", Sender::Character);
        store.write_group("Mage", "This bridge looks like danger", Sender::Character);
        store
    }

    async fn indexed_retriever(store: &MemoryStore) -> HybridRetriever {
        let mut retriever = HybridRetriever::with_embedder(Box::new(KeywordEmbedder));
        for message in store.shared_log().to_vec() {
            retriever.index_message(&message).await;
        }
        retriever
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn test_semantic_ranks_by_similarity() {
        let store = seeded_store();
        let retriever = indexed_retriever(&store).await;

        let found = retriever
            .semantic(&store, "Mage", "where is the treasure", 1)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].content.contains("treasure"));
    }

    #[tokio::test]
    async fn test_hybrid_dedups_by_identity() {
        let store = seeded_store();
        let mut retriever = indexed_retriever(&store).await;

        // The treasure line is both recent (window of 5) and the top
        // semantic hit; it must appear exactly once.
        let combined = retriever.hybrid(&store, "Mage", "treasure", 5, 5).await;
        let treasure_hits = combined
            .iter()
            .filter(|m| m.content.contains("treasure"))
            .count();
        assert_eq!(treasure_hits, 1);
        assert_eq!(combined.len(), 3);
    }

    #[tokio::test]
    async fn test_hybrid_keeps_repeated_text_distinct() {
        let mut store = MemoryStore::with_characters(["Mage"]);
        store.write_group("Warrior", "Stay close", Sender::Character);
        store.write_group("Warrior", "Stay close", Sender::Character);

        let mut retriever = indexed_retriever(&store).await;
        let combined = retriever.hybrid(&store, "Mage", "anything", 5, 5).await;
        assert_eq!(combined.len(), 2);
    }

    #[tokio::test]
    async fn test_hybrid_sorted_by_timestamp() {
        let store = seeded_store();
        let mut retriever = indexed_retriever(&store).await;

        let combined = retriever.hybrid(&store, "Mage", "danger treasure", 2, 2).await;
        for window in combined.windows(2) {
            assert!(window[0].timestamp < window[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_hybrid_degrades_on_embedder_failure() {
        let store = seeded_store();
        let mut retriever = HybridRetriever::with_embedder(Box::new(FailingEmbedder));

        let combined = retriever.hybrid(&store, "Mage", "treasure", 2, 5).await;
        assert_eq!(combined.len(), 2);
        assert_eq!(retriever.degraded_queries(), 1);
    }

    #[tokio::test]
    async fn test_hybrid_without_embedder_is_recency_only() {
        let store = seeded_store();
        let mut retriever = HybridRetriever::new();

        let combined = retriever.hybrid(&store, "Mage", "treasure", 2, 5).await;
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[1].content, "This bridge looks like danger");
        assert_eq!(retriever.degraded_queries(), 1);
    }

    #[tokio::test]
    async fn test_index_failure_is_swallowed() {
        let store = seeded_store();
        let mut retriever = HybridRetriever::with_embedder(Box::new(FailingEmbedder));

        let message = store.shared_log()[0].clone();
        retriever.index_message(&message).await;
        assert_eq!(retriever.index_failures(), 1);
        assert_eq!(retriever.indexed_len(), 0);
    }

    #[tokio::test]
    async fn test_semantic_respects_visibility() {
        let mut store = MemoryStore::with_characters(["Mage", "Warrior"]);
        store.write_group("Rogue", "nothing of note", Sender::Character);
        let secret = store
            .write_private("Mage", "User", "the treasure map is fake", Sender::User)
            .unwrap();

        let mut retriever = HybridRetriever::with_embedder(Box::new(KeywordEmbedder));
        for message in store.shared_log().to_vec() {
            retriever.index_message(&message).await;
        }
        retriever.index_message(&secret).await;

        // Indexed, but invisible to anyone except the target.
        let for_warrior = retriever
            .semantic(&store, "Warrior", "treasure", 5)
            .await
            .unwrap();
        assert!(for_warrior.iter().all(|m| !m.scope.is_private()));

        let for_mage = retriever.semantic(&store, "Mage", "treasure", 5).await.unwrap();
        assert!(for_mage.iter().any(|m| m.id == secret.id));
    }
}
