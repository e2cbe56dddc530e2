//! Shared persisted types.

use parlor_llm::SoupTurn;
use serde::{Deserialize, Serialize};

/// One question/answer exchange, as persisted in game state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    /// The player's question.
    pub question: String,
    /// The model's answer.
    pub answer: String,
}

impl From<SoupTurn> for QaPair {
    fn from(turn: SoupTurn) -> Self {
        Self {
            question: turn.question,
            answer: turn.answer,
        }
    }
}

impl From<&QaPair> for SoupTurn {
    fn from(pair: &QaPair) -> Self {
        Self {
            question: pair.question.clone(),
            answer: pair.answer.clone(),
        }
    }
}
