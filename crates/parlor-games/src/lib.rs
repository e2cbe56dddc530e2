//! Game session runtime for the Parlor bots.
//!
//! The injection guard, puzzle pipeline, the two game services, surrender
//! voting, and the per-chat turn worker. State lives in `parlor-store`;
//! model calls go through `parlor-llm`.

#![allow(missing_docs)]

mod error;
mod guard;
mod history;
mod model;
mod observability;
mod puzzle;
mod session_manager;
mod soup;
mod twentyq;
mod vote;
mod worker;

pub use error::{GameError, GameResult};
pub use guard::{GuardConfig, InjectionGuard, normalize_input};
pub use history::{merge_history, next_question_count};
pub use model::QaPair;
pub use observability::GameEvent;
pub use puzzle::{
    DEFAULT_DIFFICULTY, MAX_DIFFICULTY, MIN_DIFFICULTY, PuzzleCategory, PuzzleService,
    PuzzleServiceConfig, content_signature,
};
pub use session_manager::{OwnedState, SessionManager};
pub use soup::{
    SoupAskOutcome, SoupConfig, SoupGameService, SoupGameState, SoupHintOutcome, SoupPuzzle,
    SoupSolutionOutcome, SoupSurrenderOutcome,
};
pub use twentyq::{
    GuessOutcome, RiddleAskOutcome, RiddleConfig, RiddleGameService, RiddleHintOutcome,
    RiddleSecret, RiddleStarted, RiddleStatus,
};
pub use vote::{ApproveOutcome, StartVoteOutcome, SurrenderVote, SurrenderVoteService};
pub use worker::{PendingMessage, TurnHandler, TurnWorker, TurnWorkerConfig};
