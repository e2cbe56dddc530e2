//! Soup game operations.
//!
//! Every mutating path holds the chat's exclusive lock; the guard screens
//! user text before any LLM turn. A won game is saved once more and then
//! deleted, keeping the final state observable in logs.

use std::sync::Arc;

use parlor_llm::{CallContext, LlmApi, PuzzleSpec, SolutionVerdict, SoupTurn};
use parlor_store::LockScope;

use crate::error::{GameError, GameResult};
use crate::guard::InjectionGuard;
use crate::history::{merge_history, next_question_count};
use crate::model::QaPair;
use crate::observability::GameEvent;
use crate::puzzle::{MAX_DIFFICULTY, MIN_DIFFICULTY, PuzzleService};
use crate::session_manager::SessionManager;
use crate::soup::state::{SoupGameState, SoupPuzzle};

/// Soup service knobs.
#[derive(Debug, Clone)]
pub struct SoupConfig {
    /// Hint budget per game.
    pub max_hints: u32,
    /// Upper bound on question length in characters.
    pub max_question_len: usize,
}

impl Default for SoupConfig {
    fn default() -> Self {
        Self {
            max_hints: 3,
            max_question_len: 300,
        }
    }
}

/// Result of asking a question.
#[derive(Debug, Clone)]
pub struct SoupAskOutcome {
    /// The model's answer.
    pub answer: String,
    /// Question count after the merge.
    pub question_count: u32,
    /// Updated state.
    pub state: SoupGameState,
}

/// Result of submitting a solution.
#[derive(Debug, Clone)]
pub struct SoupSolutionOutcome {
    /// The model's verdict.
    pub verdict: SolutionVerdict,
    /// The hidden solution, revealed on a win.
    pub solution: Option<String>,
}

/// Result of requesting a hint.
#[derive(Debug, Clone)]
pub struct SoupHintOutcome {
    /// The hint text.
    pub hint: String,
    /// Hints issued after this one.
    pub hints_used: u32,
    /// The budget.
    pub max_hints: u32,
}

/// Result of surrendering.
#[derive(Debug, Clone)]
pub struct SoupSurrenderOutcome {
    /// The revealed solution.
    pub solution: String,
    /// Hints that had been issued.
    pub hints_used: u32,
}

/// The lateral-thinking soup game.
pub struct SoupGameService {
    manager: SessionManager<SoupGameState>,
    puzzles: PuzzleService,
    guard: Arc<InjectionGuard>,
    llm: Arc<dyn LlmApi>,
    config: SoupConfig,
}

impl SoupGameService {
    /// Service with default knobs.
    pub fn new(
        manager: SessionManager<SoupGameState>,
        puzzles: PuzzleService,
        guard: Arc<InjectionGuard>,
        llm: Arc<dyn LlmApi>,
    ) -> Self {
        Self::with_config(manager, puzzles, guard, llm, SoupConfig::default())
    }

    /// Service with explicit knobs.
    pub fn with_config(
        manager: SessionManager<SoupGameState>,
        puzzles: PuzzleService,
        guard: Arc<InjectionGuard>,
        llm: Arc<dyn LlmApi>,
        config: SoupConfig,
    ) -> Self {
        Self {
            manager,
            puzzles,
            guard,
            llm,
            config,
        }
    }

    /// Configured knobs.
    pub fn config(&self) -> &SoupConfig {
        &self.config
    }

    fn auxiliary_keys(&self, chat: &str) -> Vec<String> {
        vec![self.manager.keys().surrender_vote(chat)]
    }

    async fn end_llm_session(&self, ctx: &CallContext, chat: &str) {
        if let Err(error) = self.llm.end_session(ctx, chat).await {
            tracing::warn!(
                event = GameEvent::SessionCleanupFailed.as_str(),
                chat = %chat,
                error = %error,
                "llm session cleanup failed; ignored"
            );
        }
    }

    /// Start a game; one unsolved game per chat.
    pub async fn start_game(
        &self,
        scope: &LockScope,
        ctx: &CallContext,
        chat: &str,
        user: &str,
        spec: PuzzleSpec,
    ) -> GameResult<SoupGameState> {
        if spec.difficulty < MIN_DIFFICULTY || spec.difficulty > MAX_DIFFICULTY {
            return Err(GameError::MalformedInput {
                reason: format!(
                    "difficulty must be between {MIN_DIFFICULTY} and {MAX_DIFFICULTY}"
                ),
            });
        }

        let _lock = self.manager.write_lock(scope, chat, Some(user)).await?;
        if let Some(existing) = self.manager.load(chat).await? {
            if !existing.is_solved {
                return Err(GameError::GameAlreadyStarted);
            }
            // A solved leftover is swept before the new game.
            self.manager.delete(chat, &self.auxiliary_keys(chat)).await?;
        }

        let puzzle = self.puzzles.generate(ctx, &spec, chat).await?;
        let state = SoupGameState::new(user, SoupPuzzle::from(puzzle));
        self.manager.save(chat, &state).await?;
        tracing::info!(
            event = GameEvent::GameStarted.as_str(),
            chat = %chat,
            user = %user,
            difficulty = spec.difficulty,
            "soup game started"
        );
        Ok(state)
    }

    /// Ask a question about the scenario.
    pub async fn ask_question(
        &self,
        scope: &LockScope,
        ctx: &CallContext,
        chat: &str,
        question: &str,
    ) -> GameResult<SoupAskOutcome> {
        let trimmed = question.trim();
        if trimmed.is_empty() {
            return Err(GameError::InvalidQuestion {
                reason: "question is empty".to_string(),
            });
        }
        if trimmed.chars().count() > self.config.max_question_len {
            return Err(GameError::InvalidQuestion {
                reason: format!(
                    "question exceeds {} characters",
                    self.config.max_question_len
                ),
            });
        }
        let sanitized = self.guard.validate_or_reject(ctx, trimmed).await?;

        let _lock = self.manager.owner_lock(scope, chat).await?;
        let mut state = self
            .manager
            .load(chat)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        if state.is_solved {
            return Err(GameError::GameAlreadySolved);
        }
        let puzzle = state.puzzle.clone().ok_or(GameError::GameNotStarted)?;

        let local_turns: Vec<SoupTurn> = state.history.iter().map(SoupTurn::from).collect();
        let reply = self
            .llm
            .soup_answer_question(
                ctx,
                &puzzle.scenario,
                &puzzle.solution,
                &sanitized,
                &local_turns,
            )
            .await?;

        let remote: Vec<QaPair> = reply.history.into_iter().map(QaPair::from).collect();
        let (merged, appended) = merge_history(&state.history, &remote);
        let question_count = next_question_count(
            reply.question_count,
            state.question_count,
            appended,
            merged.len(),
        );
        state.history = merged;
        state.question_count = question_count;
        state.touch();
        self.manager.save(chat, &state).await?;
        self.manager
            .refresh_ttl(chat, &self.auxiliary_keys(chat))
            .await?;

        tracing::debug!(
            event = GameEvent::QuestionAnswered.as_str(),
            chat = %chat,
            question_count,
            history_len = state.history.len(),
            "soup question answered"
        );
        Ok(SoupAskOutcome {
            answer: reply.answer,
            question_count,
            state,
        })
    }

    /// Submit a solution attempt.
    pub async fn submit_solution(
        &self,
        scope: &LockScope,
        ctx: &CallContext,
        chat: &str,
        attempt: &str,
    ) -> GameResult<SoupSolutionOutcome> {
        let trimmed = attempt.trim();
        if trimmed.is_empty() {
            return Err(GameError::InvalidAnswer {
                reason: "solution attempt is empty".to_string(),
            });
        }
        let sanitized = self.guard.validate_or_reject(ctx, trimmed).await?;

        let _lock = self.manager.owner_lock(scope, chat).await?;
        let mut state = self
            .manager
            .load(chat)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        if state.is_solved {
            return Err(GameError::GameAlreadySolved);
        }
        let puzzle = state.puzzle.clone().ok_or(GameError::GameNotStarted)?;

        let verdict = self
            .llm
            .soup_validate_solution(ctx, &puzzle.scenario, &puzzle.solution, &sanitized)
            .await?;
        tracing::debug!(
            event = GameEvent::SolutionJudged.as_str(),
            chat = %chat,
            verdict = verdict.as_str(),
            "soup solution judged"
        );

        if verdict == SolutionVerdict::Yes {
            state.is_solved = true;
            state.touch();
            // Save-then-delete keeps the final state observable.
            self.manager.save(chat, &state).await?;
            self.manager.delete(chat, &self.auxiliary_keys(chat)).await?;
            self.end_llm_session(ctx, chat).await;
            tracing::info!(
                event = GameEvent::GameWon.as_str(),
                chat = %chat,
                question_count = state.question_count,
                hints_used = state.hints_used,
                "soup game solved"
            );
            return Ok(SoupSolutionOutcome {
                verdict,
                solution: Some(puzzle.solution),
            });
        }

        state.touch();
        self.manager.save(chat, &state).await?;
        Ok(SoupSolutionOutcome {
            verdict,
            solution: None,
        })
    }

    /// Request the next hint.
    pub async fn request_hint(
        &self,
        scope: &LockScope,
        ctx: &CallContext,
        chat: &str,
    ) -> GameResult<SoupHintOutcome> {
        let _lock = self.manager.owner_lock(scope, chat).await?;
        let mut state = self
            .manager
            .load(chat)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        if state.is_solved {
            return Err(GameError::GameAlreadySolved);
        }
        if state.hints_used >= self.config.max_hints {
            return Err(GameError::MaxHintsReached);
        }
        let puzzle = state.puzzle.clone().ok_or(GameError::GameNotStarted)?;

        let level = state.hints_used + 1;
        let hint = self
            .llm
            .soup_generate_hint(ctx, &puzzle.scenario, &puzzle.solution, level)
            .await?;
        state.hints_used = level;
        state.hint_contents.push(hint.clone());
        debug_assert_eq!(state.hints_used as usize, state.hint_contents.len());
        state.touch();
        self.manager.save(chat, &state).await?;

        tracing::debug!(
            event = GameEvent::HintIssued.as_str(),
            chat = %chat,
            level,
            max_hints = self.config.max_hints,
            "soup hint issued"
        );
        Ok(SoupHintOutcome {
            hint,
            hints_used: level,
            max_hints: self.config.max_hints,
        })
    }

    /// Idempotently register a player.
    pub async fn register_player(
        &self,
        scope: &LockScope,
        chat: &str,
        user: &str,
    ) -> GameResult<Vec<String>> {
        let _lock = self.manager.owner_lock(scope, chat).await?;
        let mut state = self
            .manager
            .load(chat)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        if state.register_player(user) {
            state.touch();
            self.manager.save(chat, &state).await?;
            tracing::debug!(
                event = GameEvent::PlayerRegistered.as_str(),
                chat = %chat,
                user = %user,
                players = state.players.len(),
                "soup player registered"
            );
        }
        Ok(state.players)
    }

    /// Give up and reveal the solution.
    pub async fn surrender(
        &self,
        scope: &LockScope,
        ctx: &CallContext,
        chat: &str,
    ) -> GameResult<SoupSurrenderOutcome> {
        let _lock = self.manager.owner_lock(scope, chat).await?;
        let state = self
            .manager
            .load(chat)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        let puzzle = state.puzzle.clone().ok_or(GameError::GameNotStarted)?;

        self.manager.delete(chat, &self.auxiliary_keys(chat)).await?;
        self.end_llm_session(ctx, chat).await;
        tracing::info!(
            event = GameEvent::GameSurrendered.as_str(),
            chat = %chat,
            hints_used = state.hints_used,
            "soup game surrendered"
        );
        Ok(SoupSurrenderOutcome {
            solution: puzzle.solution,
            hints_used: state.hints_used,
        })
    }

    /// Read-only snapshot of the game state.
    pub async fn get_game_state(
        &self,
        scope: &LockScope,
        chat: &str,
    ) -> GameResult<SoupGameState> {
        let _lock = self.manager.read_lock(scope, chat).await?;
        self.manager
            .load(chat)
            .await?
            .ok_or(GameError::SessionNotFound)
    }

    /// End the game without revealing anything.
    pub async fn end_game(
        &self,
        scope: &LockScope,
        ctx: &CallContext,
        chat: &str,
    ) -> GameResult<()> {
        let _lock = self.manager.owner_lock(scope, chat).await?;
        if self.manager.load(chat).await?.is_none() {
            return Err(GameError::SessionNotFound);
        }
        self.manager.delete(chat, &self.auxiliary_keys(chat)).await?;
        self.end_llm_session(ctx, chat).await;
        tracing::info!(
            event = GameEvent::GameEnded.as_str(),
            chat = %chat,
            "soup game ended"
        );
        Ok(())
    }
}
