//! Scoped conversation memory.
//!
//! The store owns the shared event log, one private partition per
//! character, and the monotonic clock that orders every message. Group
//! writes fan out to every partition; private writes land in exactly
//! one. Messages are never edited or deleted short of a full reset.

use crate::message::{Message, Scope, Sender, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from memory operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The targeted character has no memory partition.
    #[error("unknown character: {0}")]
    UnknownCharacter(String),
}

/// Scoped message store: one shared log plus a private view per character.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    shared_log: Vec<Message>,
    partitions: HashMap<String, Vec<Message>>,
    clock: Timestamp,
}

impl MemoryStore {
    /// Create an empty store with no partitions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with an empty partition per character name.
    pub fn with_characters<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut store = Self::new();
        for name in names {
            store.add_partition(name);
        }
        store
    }

    /// Add an empty partition for a character joining the session.
    ///
    /// Joining grants no retroactive history: only messages written
    /// after the join appear in the new partition. No-op if the
    /// partition already exists.
    pub fn add_partition(&mut self, character: &str) {
        self.partitions.entry(character.to_string()).or_default();
    }

    /// Check whether a character has a partition.
    pub fn has_partition(&self, character: &str) -> bool {
        self.partitions.contains_key(character)
    }

    /// Names of all characters with a partition.
    pub fn partition_names(&self) -> Vec<&str> {
        self.partitions.keys().map(String::as_str).collect()
    }

    fn tick(&mut self) -> Timestamp {
        self.clock = self.clock.next();
        self.clock
    }

    /// Append a group message.
    ///
    /// The message lands in the shared event log and is copied into
    /// every current partition, so N characters yield N+1 stored copies
    /// sharing one id, timestamp, speaker, and content.
    pub fn write_group(&mut self, speaker: &str, content: &str, sender: Sender) -> Message {
        let timestamp = self.tick();
        let message = Message::new(timestamp, speaker, content, sender, Scope::Group);
        for partition in self.partitions.values_mut() {
            partition.push(message.clone());
        }
        self.shared_log.push(message.clone());
        message
    }

    /// Append a private message visible only to `character`.
    ///
    /// The caller must target an existing partition.
    pub fn write_private(
        &mut self,
        character: &str,
        speaker: &str,
        content: &str,
        sender: Sender,
    ) -> Result<Message, MemoryError> {
        if !self.partitions.contains_key(character) {
            return Err(MemoryError::UnknownCharacter(character.to_string()));
        }
        let timestamp = self.tick();
        let message = Message::new(
            timestamp,
            speaker,
            content,
            sender,
            Scope::Private {
                to: character.to_string(),
            },
        );
        if let Some(partition) = self.partitions.get_mut(character) {
            partition.push(message.clone());
        }
        Ok(message)
    }

    /// Read a character's memory in timestamp order.
    ///
    /// Returns the last `limit` messages, or all of them when `limit`
    /// is zero. An unknown character reads as empty rather than an
    /// error.
    pub fn read(&self, character: &str, limit: usize) -> &[Message] {
        let Some(partition) = self.partitions.get(character) else {
            return &[];
        };
        tail(partition, limit)
    }

    /// Read only the private messages in a character's memory.
    pub fn read_private_only(&self, character: &str) -> Vec<&Message> {
        self.read(character, 0)
            .iter()
            .filter(|m| m.scope.is_private())
            .collect()
    }

    /// The shared event log: every group message, in timestamp order.
    pub fn shared_log(&self) -> &[Message] {
        &self.shared_log
    }

    /// The last `k` entries of the shared event log.
    pub fn recent_shared(&self, k: usize) -> &[Message] {
        tail(&self.shared_log, k)
    }

    /// Total number of group messages recorded.
    pub fn shared_len(&self) -> usize {
        self.shared_log.len()
    }

    /// Number of messages in a character's partition.
    pub fn partition_len(&self, character: &str) -> usize {
        self.partitions.get(character).map_or(0, Vec::len)
    }

    /// Discard every message and restart the clock, keeping the current
    /// partition set as empty partitions.
    pub fn reset(&mut self) {
        self.shared_log.clear();
        for partition in self.partitions.values_mut() {
            partition.clear();
        }
        self.clock = Timestamp::ZERO;
    }
}

fn tail(messages: &[Message], limit: usize) -> &[Message] {
    if limit == 0 || limit >= messages.len() {
        messages
    } else {
        &messages[messages.len() - limit..]
    }
}
