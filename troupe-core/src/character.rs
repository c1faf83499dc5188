//! Character roster types.

use serde::{Deserialize, Serialize};

/// A character participating in the scene.
///
/// The name doubles as the key for the character's memory partition, so
/// it must be unique within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    /// Display name.
    pub name: String,
    /// Free-text personality description used to build role context.
    pub personality: String,
}

impl Character {
    /// Create a new character.
    pub fn new(name: impl Into<String>, personality: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            personality: personality.into(),
        }
    }
}

/// Render a roster as prompt-ready lines, one character per line.
pub fn describe_roster(characters: &[Character]) -> String {
    characters
        .iter()
        .map(|c| format!("- {}: {}", c.name, c.personality))
        .collect::<Vec<_>>()
        .join("\n")
}
