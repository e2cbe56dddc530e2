//! Riddle ("twenty questions") game operations.
//!
//! Unlike the soup game, state is spread over sibling keys: the secret,
//! the Q/A history list, the category label, the hint counter, the player
//! roster, and the wrong-guess list. All of them share the chat's slot tag
//! and are swept together when the game ends.

use std::sync::Arc;

use parlor_llm::{CallContext, LlmApi};
use parlor_store::{GuessRateLimiter, LockScope, TopicHistory};

use crate::error::{GameError, GameResult};
use crate::guard::InjectionGuard;
use crate::model::QaPair;
use crate::observability::GameEvent;
use crate::session_manager::SessionManager;
use crate::twentyq::state::{RiddleSecret, RiddleStarted, RiddleStatus};

const HISTORY_KEEP: usize = 200;
const WRONG_GUESS_KEEP: usize = 100;

/// Riddle service knobs.
#[derive(Debug, Clone)]
pub struct RiddleConfig {
    /// Hint budget per game.
    pub max_hints: u32,
    /// Upper bound on question length in characters.
    pub max_question_len: usize,
    /// Categories the topic selector must avoid.
    pub excluded_categories: Vec<String>,
}

impl Default for RiddleConfig {
    fn default() -> Self {
        Self {
            max_hints: 3,
            max_question_len: 300,
            excluded_categories: Vec::new(),
        }
    }
}

/// Result of asking a question.
#[derive(Debug, Clone)]
pub struct RiddleAskOutcome {
    /// The model's answer.
    pub answer: String,
    /// Questions asked after this one.
    pub question_count: u32,
}

/// Result of submitting a guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessOutcome {
    /// The guess names the target; the game is over.
    Correct {
        /// The revealed target.
        target: String,
    },
    /// Wrong guess.
    Incorrect {
        /// Wrong guesses recorded so far, this one included.
        wrong_guesses: u32,
    },
}

/// Result of requesting a hint.
#[derive(Debug, Clone)]
pub struct RiddleHintOutcome {
    /// The hint text.
    pub hint: String,
    /// Hints issued after this one.
    pub hints_used: u32,
    /// The budget.
    pub max_hints: u32,
}

/// The riddle game.
pub struct RiddleGameService {
    manager: SessionManager<RiddleSecret>,
    guard: Arc<InjectionGuard>,
    llm: Arc<dyn LlmApi>,
    limiter: GuessRateLimiter,
    topics: TopicHistory,
    config: RiddleConfig,
}

impl RiddleGameService {
    /// Service with default knobs.
    pub fn new(
        manager: SessionManager<RiddleSecret>,
        guard: Arc<InjectionGuard>,
        llm: Arc<dyn LlmApi>,
        limiter: GuessRateLimiter,
        topics: TopicHistory,
    ) -> Self {
        Self::with_config(manager, guard, llm, limiter, topics, RiddleConfig::default())
    }

    /// Service with explicit knobs.
    pub fn with_config(
        manager: SessionManager<RiddleSecret>,
        guard: Arc<InjectionGuard>,
        llm: Arc<dyn LlmApi>,
        limiter: GuessRateLimiter,
        topics: TopicHistory,
        config: RiddleConfig,
    ) -> Self {
        Self {
            manager,
            guard,
            llm,
            limiter,
            topics,
            config,
        }
    }

    fn auxiliary_keys(&self, chat: &str) -> Vec<String> {
        let keys = self.manager.keys();
        vec![
            keys.history(chat),
            keys.category(chat),
            keys.hints(chat),
            keys.players(chat),
            keys.wrong_guesses(chat),
            keys.surrender_vote(chat),
        ]
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

    async fn load_history(&self, chat: &str) -> GameResult<Vec<QaPair>> {
        let raw = self
            .manager
            .store()
            .kv()
            .list_all(&self.manager.keys().history(chat))
            .await?;
        // Undecodable entries are dropped rather than failing the turn.
        Ok(raw
            .iter()
            .filter_map(|entry| serde_json::from_str(entry).ok())
            .collect())
    }

    async fn load_players(&self, chat: &str) -> GameResult<Vec<String>> {
        Ok(self
            .manager
            .store()
            .load(&self.manager.keys().players(chat))
            .await?
            .unwrap_or_default())
    }

    async fn save_players(&self, chat: &str, players: &Vec<String>) -> GameResult<()> {
        Ok(self
            .manager
            .store()
            .save(
                &self.manager.keys().players(chat),
                players,
                self.manager.ttl_secs(),
            )
            .await?)
    }

    async fn wrong_guesses(&self, chat: &str) -> GameResult<Vec<String>> {
        Ok(self
            .manager
            .store()
            .kv()
            .list_all(&self.manager.keys().wrong_guesses(chat))
            .await?)
    }

    async fn hints_used(&self, chat: &str) -> GameResult<u32> {
        let raw = self
            .manager
            .store()
            .kv()
            .get(&self.manager.keys().hints(chat))
            .await?;
        Ok(raw.and_then(|v| v.parse::<u32>().ok()).unwrap_or(0))
    }

    /// Start a game; one active riddle per chat.
    pub async fn start_game(
        &self,
        scope: &LockScope,
        ctx: &CallContext,
        chat: &str,
        user: &str,
        category: Option<&str>,
    ) -> GameResult<RiddleStarted> {
        let _lock = self.manager.write_lock(scope, chat, Some(user)).await?;
        if self.manager.load(chat).await?.is_some() {
            return Err(GameError::GameAlreadyStarted);
        }

        let banned = self.topics.recent(chat, category).await?;
        let topic = self
            .llm
            .twentyq_select_topic(ctx, category, &banned, &self.config.excluded_categories)
            .await?;
        if topic.name.trim().is_empty() || topic.category.trim().is_empty() {
            return Err(GameError::PuzzleGeneration {
                reason: "topic selection returned empty target or category".to_string(),
            });
        }

        let secret = RiddleSecret {
            intro: format!("A new riddle has begun! Category: {}.", topic.category),
            target: topic.name,
            category: topic.category,
            description: topic.details,
        };

        // Sweep any stale sibling keys before the fresh game.
        self.manager.delete(chat, &self.auxiliary_keys(chat)).await?;
        self.manager.save(chat, &secret).await?;
        self.save_players(chat, &vec![user.to_string()]).await?;
        self.manager
            .store()
            .kv()
            .set_ex(
                &self.manager.keys().category(chat),
                &secret.category,
                self.manager.ttl_secs(),
            )
            .await?;

        tracing::info!(
            event = GameEvent::GameStarted.as_str(),
            chat = %chat,
            user = %user,
            category = %secret.category,
            "riddle game started"
        );
        Ok(RiddleStarted {
            category: secret.category,
            intro: secret.intro,
        })
    }

    /// Ask a yes/no question about the target.
    pub async fn ask_question(
        &self,
        scope: &LockScope,
        ctx: &CallContext,
        chat: &str,
        question: &str,
    ) -> GameResult<RiddleAskOutcome> {
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
        let secret = self
            .manager
            .load(chat)
            .await?
            .ok_or(GameError::SessionNotFound)?;

        let normalized = self.llm.twentyq_normalize_question(ctx, &sanitized).await?;
        let history = self.load_history(chat).await?;
        if history
            .iter()
            .any(|pair| pair.question.eq_ignore_ascii_case(&normalized))
        {
            return Err(GameError::DuplicateQuestion);
        }

        let answer = self
            .llm
            .twentyq_answer_question(ctx, &secret.target, &secret.category, &normalized)
            .await?;

        let pair = QaPair {
            question: normalized,
            answer: answer.clone(),
        };
        let encoded =
            serde_json::to_string(&pair).map_err(|source| parlor_store::StoreError::Payload {
                operation: "riddle_history_append",
                source,
            })?;
        self.manager
            .store()
            .kv()
            .list_append_bounded(
                &self.manager.keys().history(chat),
                &encoded,
                HISTORY_KEEP,
                self.manager.ttl_secs(),
            )
            .await?;
        self.manager
            .refresh_ttl(chat, &self.auxiliary_keys(chat))
            .await?;

        let question_count = (history.len() + 1) as u32;
        tracing::debug!(
            event = GameEvent::QuestionAnswered.as_str(),
            chat = %chat,
            question_count,
            "riddle question answered"
        );
        Ok(RiddleAskOutcome {
            answer,
            question_count,
        })
    }

    /// Submit a guess at the target; cooldown-limited per user.
    pub async fn submit_answer(
        &self,
        scope: &LockScope,
        ctx: &CallContext,
        chat: &str,
        user: &str,
        guess: &str,
    ) -> GameResult<GuessOutcome> {
        let trimmed = guess.trim();
        if trimmed.is_empty() {
            return Err(GameError::InvalidAnswer {
                reason: "guess is empty".to_string(),
            });
        }
        let sanitized = self.guard.validate_or_reject(ctx, trimmed).await?;

        let decision = self.limiter.check(chat, user).await?;
        if !decision.allowed {
            return Err(GameError::RateLimited {
                remaining_secs: decision.remaining_secs(),
            });
        }

        let _lock = self.manager.owner_lock(scope, chat).await?;
        let secret = self
            .manager
            .load(chat)
            .await?
            .ok_or(GameError::SessionNotFound)?;

        let mut correct = self
            .llm
            .twentyq_verify_guess(ctx, &secret.target, &sanitized)
            .await?;
        if !correct {
            correct = self.check_synonym(ctx, &secret.target, &sanitized).await?;
        }
        tracing::debug!(
            event = GameEvent::SolutionJudged.as_str(),
            chat = %chat,
            user = %user,
            correct,
            "riddle guess judged"
        );

        if correct {
            self.topics.append(chat, None, &secret.target).await?;
            self.topics
                .append(chat, Some(&secret.category), &secret.target)
                .await?;
            self.manager.delete(chat, &self.auxiliary_keys(chat)).await?;
            self.end_llm_session(ctx, chat).await;
            tracing::info!(
                event = GameEvent::GameWon.as_str(),
                chat = %chat,
                user = %user,
                "riddle solved"
            );
            return Ok(GuessOutcome::Correct {
                target: secret.target,
            });
        }

        let kv = self.manager.store().kv();
        kv.list_append_bounded(
            &self.manager.keys().wrong_guesses(chat),
            &sanitized,
            WRONG_GUESS_KEEP,
            self.manager.ttl_secs(),
        )
        .await?;
        // Per-user trail; ttl-bounded, never swept explicitly.
        kv.list_append_bounded(
            &self.manager.keys().wrong_guesses_for(chat, user),
            &sanitized,
            WRONG_GUESS_KEEP,
            self.manager.ttl_secs(),
        )
        .await?;
        let wrong_guesses = self.wrong_guesses(chat).await?.len() as u32;
        Ok(GuessOutcome::Incorrect { wrong_guesses })
    }

    /// Synonym verdict with the shared hash as a cross-chat cache.
    async fn check_synonym(
        &self,
        ctx: &CallContext,
        target: &str,
        candidate: &str,
    ) -> GameResult<bool> {
        let field = format!(
            "{}|{}",
            target.to_lowercase(),
            candidate.to_lowercase()
        );
        let synonyms_key = self.manager.keys().synonyms();
        let kv = self.manager.store().kv();
        if let Some(cached) = kv.hash_get(&synonyms_key, &field).await? {
            return Ok(cached == "1");
        }
        let verdict = self
            .llm
            .twentyq_check_synonym(ctx, target, candidate)
            .await?;
        kv.hash_set(&synonyms_key, &field, if verdict { "1" } else { "0" })
            .await?;
        Ok(verdict)
    }

    /// Request the next hint.
    pub async fn request_hint(
        &self,
        scope: &LockScope,
        ctx: &CallContext,
        chat: &str,
    ) -> GameResult<RiddleHintOutcome> {
        let _lock = self.manager.owner_lock(scope, chat).await?;
        let secret = self
            .manager
            .load(chat)
            .await?
            .ok_or(GameError::SessionNotFound)?;

        let used = self.hints_used(chat).await?;
        if used >= self.config.max_hints {
            return Err(GameError::MaxHintsReached);
        }
        let level = used + 1;
        let hint = self
            .llm
            .twentyq_generate_hints(ctx, &secret.target, &secret.category, level)
            .await?;
        let recorded = self
            .manager
            .store()
            .kv()
            .incr_ex(&self.manager.keys().hints(chat), self.manager.ttl_secs())
            .await?;

        tracing::debug!(
            event = GameEvent::HintIssued.as_str(),
            chat = %chat,
            level,
            max_hints = self.config.max_hints,
            "riddle hint issued"
        );
        Ok(RiddleHintOutcome {
            hint,
            hints_used: recorded.max(0) as u32,
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
        if self.manager.load(chat).await?.is_none() {
            return Err(GameError::SessionNotFound);
        }
        let mut players = self.load_players(chat).await?;
        if !players.iter().any(|p| p == user) {
            players.push(user.to_string());
            self.save_players(chat, &players).await?;
            tracing::debug!(
                event = GameEvent::PlayerRegistered.as_str(),
                chat = %chat,
                user = %user,
                players = players.len(),
                "riddle player registered"
            );
        }
        Ok(players)
    }

    /// Registered players, without taking the write lock.
    pub async fn players(&self, chat: &str) -> GameResult<Vec<String>> {
        self.load_players(chat).await
    }

    /// Category labels the topic selector can draw from, minus exclusions.
    pub async fn categories(&self, ctx: &CallContext) -> GameResult<Vec<String>> {
        let all = self.llm.twentyq_get_categories(ctx).await?;
        Ok(all
            .into_iter()
            .filter(|category| {
                !self
                    .config
                    .excluded_categories
                    .iter()
                    .any(|excluded| excluded.eq_ignore_ascii_case(category))
            })
            .collect())
    }

    /// Give up and reveal the target.
    pub async fn surrender(
        &self,
        scope: &LockScope,
        ctx: &CallContext,
        chat: &str,
    ) -> GameResult<String> {
        let _lock = self.manager.owner_lock(scope, chat).await?;
        let secret = self
            .manager
            .load(chat)
            .await?
            .ok_or(GameError::SessionNotFound)?;

        self.topics.append(chat, None, &secret.target).await?;
        self.topics
            .append(chat, Some(&secret.category), &secret.target)
            .await?;
        self.manager.delete(chat, &self.auxiliary_keys(chat)).await?;
        self.end_llm_session(ctx, chat).await;
        tracing::info!(
            event = GameEvent::GameSurrendered.as_str(),
            chat = %chat,
            "riddle surrendered"
        );
        Ok(secret.target)
    }

    /// Read-only snapshot of the game.
    pub async fn get_game_state(
        &self,
        scope: &LockScope,
        chat: &str,
    ) -> GameResult<RiddleStatus> {
        let _lock = self.manager.read_lock(scope, chat).await?;
        let secret = self
            .manager
            .load(chat)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        let history = self.load_history(chat).await?;
        Ok(RiddleStatus {
            category: secret.category,
            question_count: history.len() as u32,
            hints_used: self.hints_used(chat).await?,
            players: self.load_players(chat).await?,
            wrong_guesses: self.wrong_guesses(chat).await?,
        })
    }

    /// End the game without revealing the target.
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
            "riddle ended"
        );
        Ok(())
    }
}
