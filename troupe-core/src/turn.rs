//! Turn coordination.
//!
//! Decides which characters are candidates for a round. Two modes:
//! every character at once, or a single designated speaker rotating
//! through the roster in order.

use crate::character::Character;
use serde::{Deserialize, Serialize};

/// Speaking mode for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnMode {
    /// Every character is a candidate each round and decides
    /// individually whether to speak or abstain.
    MultiSpeaker,
    /// Exactly one character is designated per round, rotating in
    /// roster order.
    SingleSpeaker,
}

/// Round-robin turn state.
///
/// The stored index is clamped against the current roster size at call
/// time, so characters joining mid-session change the modulus without
/// ever desynchronizing the rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnCoordinator {
    mode: TurnMode,
    next_speaker_index: usize,
}

impl TurnCoordinator {
    /// Create a coordinator starting at roster position zero.
    pub fn new(mode: TurnMode) -> Self {
        Self {
            mode,
            next_speaker_index: 0,
        }
    }

    /// The current mode.
    pub fn mode(&self) -> TurnMode {
        self.mode
    }

    /// Switch modes mid-session; the rotation index is kept.
    pub fn set_mode(&mut self, mode: TurnMode) {
        self.mode = mode;
    }

    /// Index of the currently designated speaker.
    ///
    /// Only meaningful in single-speaker mode; `None` for an empty
    /// roster.
    pub fn current_speaker(&self, roster_len: usize) -> Option<usize> {
        if roster_len == 0 {
            None
        } else {
            Some(self.next_speaker_index % roster_len)
        }
    }

    /// Candidates for the next round.
    pub fn select<'a>(&self, roster: &'a [Character]) -> Vec<&'a Character> {
        match self.mode {
            TurnMode::MultiSpeaker => roster.iter().collect(),
            TurnMode::SingleSpeaker => self
                .current_speaker(roster.len())
                .map(|index| vec![&roster[index]])
                .unwrap_or_default(),
        }
    }

    /// Rotate to the next speaker after a completed round.
    ///
    /// Called once per round whether it succeeded or fell back; a no-op
    /// in multi-speaker mode.
    pub fn advance(&mut self, roster_len: usize) {
        if self.mode != TurnMode::SingleSpeaker || roster_len == 0 {
            return;
        }
        self.next_speaker_index = (self.next_speaker_index % roster_len + 1) % roster_len;
    }

    /// Designate the current speaker and rotate past them.
    pub fn take_turn(&mut self, roster_len: usize) -> Option<usize> {
        let index = self.current_speaker(roster_len)?;
        self.advance(roster_len);
        Some(index)
    }

    /// Restart the rotation at roster position zero.
    pub fn reset(&mut self) {
        self.next_speaker_index = 0;
    }
}

impl Default for TurnCoordinator {
    fn default() -> Self {
        Self::new(TurnMode::MultiSpeaker)
    }
}
