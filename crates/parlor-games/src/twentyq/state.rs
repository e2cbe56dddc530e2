//! Persisted riddle state.

use serde::{Deserialize, Serialize};

use crate::session_manager::OwnedState;

/// The hidden target of a riddle game; one JSON value in the store.
///
/// Target and category are non-empty by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiddleSecret {
    /// The thing to be guessed.
    pub target: String,
    /// Category label.
    pub category: String,
    /// Announcement shown when the game starts.
    pub intro: String,
    /// Free-form details used for answering questions.
    pub description: String,
}

impl OwnedState for RiddleSecret {}

/// Player-visible snapshot of a riddle game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiddleStatus {
    /// Category label.
    pub category: String,
    /// Questions asked so far.
    pub question_count: u32,
    /// Hints issued so far.
    pub hints_used: u32,
    /// Registered players.
    pub players: Vec<String>,
    /// Wrong guesses so far, oldest first.
    pub wrong_guesses: Vec<String>,
}

/// Announcement returned by a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiddleStarted {
    /// Category of the selected topic.
    pub category: String,
    /// Announcement text.
    pub intro: String,
}
