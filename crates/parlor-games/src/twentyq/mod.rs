//! Riddle ("twenty questions") game.

mod service;
mod state;

pub use service::{
    GuessOutcome, RiddleAskOutcome, RiddleConfig, RiddleGameService, RiddleHintOutcome,
};
pub use state::{RiddleSecret, RiddleStarted, RiddleStatus};
