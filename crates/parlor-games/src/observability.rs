//! Stable event identifiers for structured game logs.

/// Machine-readable event names attached to game log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// A game was started.
    GameStarted,
    /// A question was answered.
    QuestionAnswered,
    /// A solution or guess was judged.
    SolutionJudged,
    /// A game was won.
    GameWon,
    /// A hint was issued.
    HintIssued,
    /// A player registered.
    PlayerRegistered,
    /// A game was surrendered.
    GameSurrendered,
    /// A game was ended without resolution.
    GameEnded,
    /// The injection guard served a verdict from cache.
    GuardCacheHit,
    /// The injection guard called the backend.
    GuardChecked,
    /// A concurrent guard check joined an in-flight leader.
    GuardCoalesced,
    /// Puzzle generation produced a duplicate signature.
    PuzzleDuplicate,
    /// Puzzle generation fell back to a preset.
    PuzzlePresetFallback,
    /// A puzzle was generated.
    PuzzleGenerated,
    /// A surrender vote started.
    VoteStarted,
    /// A surrender vote recorded an approval.
    VoteApproved,
    /// A surrender vote reached quorum.
    VoteCompleted,
    /// A pending turn was processed by the worker.
    TurnProcessed,
    /// A pending turn failed; the worker continues.
    TurnFailed,
    /// Best-effort LLM session cleanup failed and was swallowed.
    SessionCleanupFailed,
}

impl GameEvent {
    /// Stable dotted identifier for log filtering.
    pub const fn as_str(self) -> &'static str {
        match self {
            GameEvent::GameStarted => "game.started",
            GameEvent::QuestionAnswered => "game.question_answered",
            GameEvent::SolutionJudged => "game.solution_judged",
            GameEvent::GameWon => "game.won",
            GameEvent::HintIssued => "game.hint_issued",
            GameEvent::PlayerRegistered => "game.player_registered",
            GameEvent::GameSurrendered => "game.surrendered",
            GameEvent::GameEnded => "game.ended",
            GameEvent::GuardCacheHit => "guard.cache_hit",
            GameEvent::GuardChecked => "guard.checked",
            GameEvent::GuardCoalesced => "guard.coalesced",
            GameEvent::PuzzleDuplicate => "puzzle.duplicate",
            GameEvent::PuzzlePresetFallback => "puzzle.preset_fallback",
            GameEvent::PuzzleGenerated => "puzzle.generated",
            GameEvent::VoteStarted => "vote.started",
            GameEvent::VoteApproved => "vote.approved",
            GameEvent::VoteCompleted => "vote.completed",
            GameEvent::TurnProcessed => "worker.turn_processed",
            GameEvent::TurnFailed => "worker.turn_failed",
            GameEvent::SessionCleanupFailed => "game.session_cleanup_failed",
        }
    }
}
