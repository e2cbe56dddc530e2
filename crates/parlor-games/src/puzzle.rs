//! Puzzle generation with signature dedup and preset fallback.

use std::sync::Arc;

use parlor_llm::{CallContext, LlmApi, LlmError, PuzzleContent, PuzzleSpec};
use parlor_store::SignatureStore;
use sha2::{Digest, Sha256};

use crate::error::{GameError, GameResult};
use crate::observability::GameEvent;

/// Lowest accepted difficulty.
pub const MIN_DIFFICULTY: u8 = 1;
/// Highest accepted difficulty.
pub const MAX_DIFFICULTY: u8 = 10;
/// Difficulty used when a request carries none.
pub const DEFAULT_DIFFICULTY: u8 = 5;

/// Canonical puzzle categories.
///
/// The enum is canonical; free-form labels from the server are
/// cross-referenced here at the boundary and fall back to [`Mystery`]
/// when unknown.
///
/// [`Mystery`]: PuzzleCategory::Mystery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PuzzleCategory {
    /// Default category.
    Mystery,
    /// Horror-flavored scenarios.
    Horror,
    /// Crime stories.
    Crime,
    /// Fantastic settings.
    Fantasy,
    /// Light-hearted scenarios.
    Comedy,
    /// Mundane situations with a twist.
    Everyday,
}

impl PuzzleCategory {
    /// Canonical label.
    pub const fn as_str(self) -> &'static str {
        match self {
            PuzzleCategory::Mystery => "Mystery",
            PuzzleCategory::Horror => "Horror",
            PuzzleCategory::Crime => "Crime",
            PuzzleCategory::Fantasy => "Fantasy",
            PuzzleCategory::Comedy => "Comedy",
            PuzzleCategory::Everyday => "Everyday",
        }
    }

    /// Parse a label case-insensitively.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "mystery" => Some(PuzzleCategory::Mystery),
            "horror" => Some(PuzzleCategory::Horror),
            "crime" => Some(PuzzleCategory::Crime),
            "fantasy" => Some(PuzzleCategory::Fantasy),
            "comedy" => Some(PuzzleCategory::Comedy),
            "everyday" => Some(PuzzleCategory::Everyday),
            _ => None,
        }
    }
}

/// SHA-256 fingerprint of puzzle content, for cross-chat dedup.
pub fn content_signature(puzzle: &PuzzleContent) -> String {
    let joined = format!(
        "{}|{}|{}|{}",
        puzzle.title, puzzle.scenario, puzzle.solution,
        puzzle.hints.join("|")
    );
    let mut hasher = Sha256::new();
    hasher.update(joined.to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

/// Generation knobs.
#[derive(Debug, Clone)]
pub struct PuzzleServiceConfig {
    /// Generation attempts before the preset fallback.
    pub max_generation_retries: u32,
    /// Whether presets are rewritten before use.
    pub rewrite_presets: bool,
}

impl Default for PuzzleServiceConfig {
    fn default() -> Self {
        Self {
            max_generation_retries: 3,
            rewrite_presets: true,
        }
    }
}

/// Puzzle author: generate, dedup, fall back.
pub struct PuzzleService {
    llm: Arc<dyn LlmApi>,
    signatures: SignatureStore,
    config: PuzzleServiceConfig,
}

impl PuzzleService {
    /// Service with default knobs.
    pub fn new(llm: Arc<dyn LlmApi>, signatures: SignatureStore) -> Self {
        Self::with_config(llm, signatures, PuzzleServiceConfig::default())
    }

    /// Service with explicit knobs.
    pub fn with_config(
        llm: Arc<dyn LlmApi>,
        signatures: SignatureStore,
        config: PuzzleServiceConfig,
    ) -> Self {
        Self {
            llm,
            signatures,
            config,
        }
    }

    /// Clamp a requested difficulty into the accepted range.
    pub fn clamp_difficulty(difficulty: u8) -> u8 {
        difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
    }

    /// Generate a puzzle for `chat`, deduplicating against all chats.
    pub async fn generate(
        &self,
        ctx: &CallContext,
        spec: &PuzzleSpec,
        chat: &str,
    ) -> GameResult<PuzzleContent> {
        let category = spec
            .category
            .as_deref()
            .and_then(PuzzleCategory::parse)
            .unwrap_or(PuzzleCategory::Mystery);
        let normalized = PuzzleSpec {
            category: Some(category.as_str().to_string()),
            difficulty: Self::clamp_difficulty(spec.difficulty),
            theme: spec
                .theme
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        };

        let mut last_error: Option<LlmError> = None;
        for attempt in 1..=self.config.max_generation_retries {
            let puzzle = match self.llm.soup_generate_puzzle(ctx, &normalized).await {
                Ok(puzzle) => puzzle,
                Err(error) => {
                    tracing::warn!(
                        chat = %chat,
                        attempt,
                        error = %error,
                        "puzzle generation attempt failed"
                    );
                    last_error = Some(error);
                    continue;
                }
            };
            if puzzle.title.trim().is_empty()
                || puzzle.scenario.trim().is_empty()
                || puzzle.solution.trim().is_empty()
            {
                tracing::warn!(chat = %chat, attempt, "generated puzzle has empty fields");
                continue;
            }
            let signature = content_signature(&puzzle);
            if self.signatures.contains(&signature).await? {
                tracing::debug!(
                    event = GameEvent::PuzzleDuplicate.as_str(),
                    chat = %chat,
                    attempt,
                    "generated puzzle duplicates a known signature"
                );
                continue;
            }
            self.signatures.mark_used(&signature).await?;
            tracing::debug!(
                event = GameEvent::PuzzleGenerated.as_str(),
                chat = %chat,
                attempt,
                category = puzzle.category.as_str(),
                difficulty = puzzle.difficulty,
                "puzzle generated"
            );
            return Ok(puzzle);
        }

        self.preset_fallback(ctx, chat, normalized.difficulty, last_error)
            .await
    }

    async fn preset_fallback(
        &self,
        ctx: &CallContext,
        chat: &str,
        difficulty: u8,
        last_error: Option<LlmError>,
    ) -> GameResult<PuzzleContent> {
        let mut preset = match self.llm.soup_get_random_puzzle(ctx, difficulty).await {
            Ok(preset) => preset,
            Err(error) => {
                let underlying = last_error.unwrap_or(error);
                return Err(GameError::PuzzleGeneration {
                    reason: underlying.to_string(),
                });
            }
        };
        if self.config.rewrite_presets {
            match self.llm.soup_rewrite_scenario(ctx, &preset).await {
                Ok((scenario, solution)) => {
                    preset.scenario = scenario;
                    preset.solution = solution;
                }
                Err(error) => {
                    tracing::warn!(
                        chat = %chat,
                        error = %error,
                        "preset rewrite failed; using the original"
                    );
                }
            }
        }
        let signature = content_signature(&preset);
        self.signatures.mark_used(&signature).await?;
        tracing::info!(
            event = GameEvent::PuzzlePresetFallback.as_str(),
            chat = %chat,
            difficulty,
            rewritten = self.config.rewrite_presets,
            "puzzle generation exhausted retries; preset used"
        );
        Ok(preset)
    }
}
