//! Persisted soup game state.

use parlor_llm::PuzzleContent;
use parlor_store::now_unix_ms;
use serde::{Deserialize, Serialize};

use crate::model::QaPair;
use crate::session_manager::OwnedState;

/// The puzzle behind a soup game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoupPuzzle {
    /// Short title.
    pub title: String,
    /// The visible scenario.
    pub scenario: String,
    /// The hidden solution.
    pub solution: String,
    /// Category label.
    pub category: String,
    /// Difficulty on the configured scale.
    pub difficulty: u8,
    /// Pre-authored hints, easiest first.
    #[serde(default)]
    pub hints: Vec<String>,
}

impl From<PuzzleContent> for SoupPuzzle {
    fn from(content: PuzzleContent) -> Self {
        Self {
            title: content.title,
            scenario: content.scenario,
            solution: content.solution,
            category: content.category,
            difficulty: content.difficulty,
            hints: content.hints,
        }
    }
}

/// Full per-chat soup game state; one JSON value in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoupGameState {
    /// The user who started the game.
    pub user_id: String,
    /// Active puzzle; absent only in degenerate states.
    #[serde(default)]
    pub puzzle: Option<SoupPuzzle>,
    /// Questions answered so far; monotonically non-decreasing.
    #[serde(default)]
    pub question_count: u32,
    /// Ordered Q/A history.
    #[serde(default)]
    pub history: Vec<QaPair>,
    /// Hints issued; always equals `hint_contents.len()`.
    #[serde(default)]
    pub hints_used: u32,
    /// Issued hint texts, in order.
    #[serde(default)]
    pub hint_contents: Vec<String>,
    /// Registered players, unique and insertion-ordered.
    #[serde(default)]
    pub players: Vec<String>,
    /// Whether the puzzle has been solved.
    #[serde(default)]
    pub is_solved: bool,
    /// Creation time in unix milliseconds.
    pub started_at_unix_ms: u64,
    /// Last mutation time in unix milliseconds.
    pub last_activity_unix_ms: u64,
}

impl SoupGameState {
    /// Fresh state for a game started by `user_id`.
    pub fn new(user_id: impl Into<String>, puzzle: SoupPuzzle) -> Self {
        let user_id = user_id.into();
        let now = now_unix_ms();
        Self {
            players: vec![user_id.clone()],
            user_id,
            puzzle: Some(puzzle),
            question_count: 0,
            history: Vec::new(),
            hints_used: 0,
            hint_contents: Vec::new(),
            is_solved: false,
            started_at_unix_ms: now,
            last_activity_unix_ms: now,
        }
    }

    /// Record activity now.
    pub fn touch(&mut self) {
        self.last_activity_unix_ms = now_unix_ms();
    }

    /// Idempotently add a player, repairing an empty list with the owner.
    ///
    /// Returns true when the list changed.
    pub fn register_player(&mut self, user_id: &str) -> bool {
        let mut changed = false;
        if self.players.is_empty() && !self.user_id.is_empty() {
            self.players.push(self.user_id.clone());
            changed = true;
        }
        if !self.players.iter().any(|p| p == user_id) {
            self.players.push(user_id.to_string());
            changed = true;
        }
        changed
    }
}

impl OwnedState for SoupGameState {
    fn owner(&self) -> Option<&str> {
        Some(&self.user_id)
    }
}
