//! Message types for scene conversations.
//!
//! Every user line, character utterance, and engine note in a session is
//! a [`Message`]. Visibility is carried by [`Scope`]: a group message is
//! seen by every character, a private message by exactly one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a message.
///
/// Retrieval de-duplicates by this identity, so two distinct messages
/// that happen to carry the same text remain distinct.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Create a new random ID.
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[inline]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", &self.0.to_string()[..8])
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Logical position of a message within a session.
///
/// Assigned from the memory store's monotonic counter, so ordering is
/// strict and total even when two writes land on the same wall-clock
/// instant.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The position before any message.
    pub const ZERO: Timestamp = Timestamp(0);

    /// The position immediately after this one.
    #[inline]
    pub fn next(self) -> Self {
        Timestamp(self.0 + 1)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The human driving the session.
    User,
    /// One of the scene's characters.
    Character,
    /// An engine-generated note.
    System,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Character => write!(f, "character"),
            Sender::System => write!(f, "system"),
        }
    }
}

/// Visibility of a message.
///
/// Scope and visibility are one tagged value: a group message is by
/// definition visible to all, a private one to a single named character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Scope {
    /// Part of the shared event log, visible to every character.
    Group,
    /// Visible to exactly one character.
    Private {
        /// The only character that may see this message.
        to: String,
    },
}

impl Scope {
    /// Check whether this is a private scope.
    pub fn is_private(&self) -> bool {
        matches!(self, Scope::Private { .. })
    }

    /// Check whether the named character may see a message of this scope.
    pub fn is_visible_to(&self, character: &str) -> bool {
        match self {
            Scope::Group => true,
            Scope::Private { to } => to == character,
        }
    }
}

/// A single immutable entry in a session's conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID.
    pub id: MessageId,
    /// Strictly increasing position within the session.
    pub timestamp: Timestamp,
    /// Wall-clock time the message was created.
    pub created_at: DateTime<Utc>,
    /// Display name of whoever spoke.
    pub speaker: String,
    /// The message text.
    pub content: String,
    /// What kind of participant produced it.
    pub sender: Sender,
    /// Who may see it.
    pub scope: Scope,
}

impl Message {
    /// Create a message at the given logical position.
    pub(crate) fn new(
        timestamp: Timestamp,
        speaker: impl Into<String>,
        content: impl Into<String>,
        sender: Sender,
        scope: Scope,
    ) -> Self {
        Self {
            id: MessageId::new(),
            timestamp,
            created_at: Utc::now(),
            speaker: speaker.into(),
            content: content.into(),
            sender,
            scope,
        }
    }

    /// Render as a transcript line for prompt context.
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.speaker, self.content)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.speaker, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ordering() {
        let first = Timestamp::ZERO.next();
        let second = first.next();
        assert!(first < second);
        assert_eq!(second, Timestamp(2));
    }

    #[test]
    fn test_scope_visibility() {
        let group = Scope::Group;
        assert!(group.is_visible_to("Mage"));
        assert!(group.is_visible_to("Warrior"));

        let private = Scope::Private {
            to: "Mage".to_string(),
        };
        assert!(private.is_visible_to("Mage"));
        assert!(!private.is_visible_to("Warrior"));
        assert!(private.is_private());
    }

    #[test]
    fn test_message_identity_distinct_for_equal_text() {
        let a = Message::new(Timestamp(1), "Mage", "hello", Sender::Character, Scope::Group);
        let b = Message::new(Timestamp(2), "Mage", "hello", Sender::Character, Scope::Group);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_message_serde() {
        let msg = Message::new(
            Timestamp(7),
            "Warrior",
            "Hold the line!",
            Sender::Character,
            Scope::Private {
                to: "Warrior".to_string(),
            },
        );
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, msg.id);
        assert_eq!(parsed.timestamp, msg.timestamp);
        assert_eq!(parsed.scope, msg.scope);
    }

    #[test]
    fn test_transcript_line() {
        let msg = Message::new(Timestamp(1), "Mage", "I sense something.", Sender::Character, Scope::Group);
        assert_eq!(msg.transcript_line(), "Mage: I sense something.");
    }
}
