//! Typed error surface of the game services.

use parlor_llm::LlmError;
use parlor_store::{LockError, StoreError};

/// Result alias for game operations.
pub type GameResult<T> = Result<T, GameError>;

/// Everything a game operation can fail with.
///
/// The outer layers translate these to user-facing messages and HTTP
/// status codes; the services themselves never format user text.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// No session exists for the chat.
    #[error("no active game session")]
    SessionNotFound,

    /// An unsolved game is already running in the chat.
    #[error("a game is already running in this chat")]
    GameAlreadyStarted,

    /// The game was already solved; mutating operations are rejected.
    #[error("the game is already solved")]
    GameAlreadySolved,

    /// A session exists but carries no playable content.
    #[error("no game has been started")]
    GameNotStarted,

    /// The question failed syntactic validation.
    #[error("invalid question: {reason}")]
    InvalidQuestion {
        /// What was wrong.
        reason: String,
    },

    /// The answer or guess failed syntactic validation.
    #[error("invalid answer: {reason}")]
    InvalidAnswer {
        /// What was wrong.
        reason: String,
    },

    /// The same question was already asked in this game.
    #[error("duplicate question")]
    DuplicateQuestion,

    /// More hints were requested than the game allows.
    #[error("hint limit exceeded")]
    HintLimitExceeded,

    /// The hint budget is spent.
    #[error("maximum hints reached")]
    MaxHintsReached,

    /// No hint is available at this point of the game.
    #[error("hint not available")]
    HintNotAvailable,

    /// The caller is not allowed to perform the operation.
    #[error("access denied")]
    AccessDenied,

    /// The user is blocked.
    #[error("user is blocked")]
    UserBlocked,

    /// The chat is blocked.
    #[error("chat is blocked")]
    ChatBlocked,

    /// Lock acquisition or release failed.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The per-user guess cooldown rejected the attempt.
    #[error("rate limited; retry in {remaining_secs}s")]
    RateLimited {
        /// Whole seconds until the cooldown expires.
        remaining_secs: u64,
    },

    /// Input was empty or otherwise malformed.
    #[error("malformed input: {reason}")]
    MalformedInput {
        /// What was wrong.
        reason: String,
    },

    /// The injection guard flagged the input.
    #[error("input rejected by injection guard")]
    InputInjection,

    /// Puzzle generation and its preset fallback both failed.
    #[error("puzzle generation failed: {reason}")]
    PuzzleGeneration {
        /// Last underlying failure.
        reason: String,
    },

    /// The store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The LLM backend rejected a call.
    #[error(transparent)]
    Llm(#[from] LlmError),
}
