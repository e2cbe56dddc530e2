//! Lateral-thinking soup game.

mod service;
mod state;

pub use service::{
    SoupAskOutcome, SoupConfig, SoupGameService, SoupHintOutcome, SoupSolutionOutcome,
    SoupSurrenderOutcome,
};
pub use state::{SoupGameState, SoupPuzzle};
