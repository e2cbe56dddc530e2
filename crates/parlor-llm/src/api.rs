//! Typed API surface fronting the LLM transport.

use async_trait::async_trait;

use crate::context::CallContext;
use crate::error::LlmError;

/// Model parameters reported by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Model identifier.
    pub model: String,
    /// Output token cap.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Topic chosen for a riddle game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSelection {
    /// The hidden target.
    pub name: String,
    /// Category label.
    pub category: String,
    /// Free-form description used for answering questions.
    pub details: String,
}

/// One question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoupTurn {
    /// The player's question.
    pub question: String,
    /// The model's answer.
    pub answer: String,
}

/// Answer to a soup question plus the server's view of the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoupAnswer {
    /// The model's answer.
    pub answer: String,
    /// History as the server sees it.
    pub history: Vec<SoupTurn>,
    /// Question count as the server reports it.
    pub question_count: u32,
}

/// Verdict on a submitted soup solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionVerdict {
    /// Correct; the game is won.
    Yes,
    /// Close but not accepted.
    Close,
    /// Wrong.
    No,
}

impl SolutionVerdict {
    /// Parse the server's verdict string; anything unrecognized is `No`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "YES" => SolutionVerdict::Yes,
            "CLOSE" => SolutionVerdict::Close,
            _ => SolutionVerdict::No,
        }
    }

    /// Canonical wire form.
    pub const fn as_str(self) -> &'static str {
        match self {
            SolutionVerdict::Yes => "YES",
            SolutionVerdict::Close => "CLOSE",
            SolutionVerdict::No => "NO",
        }
    }
}

/// LLM-authored puzzle content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuzzleContent {
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
    pub hints: Vec<String>,
}

/// Parameters for puzzle generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PuzzleSpec {
    /// Requested category; absent means the server default.
    pub category: Option<String>,
    /// Difficulty on the configured scale.
    pub difficulty: u8,
    /// Optional free-form theme.
    pub theme: Option<String>,
}

/// Aggregated usage numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageReport {
    /// Requests in the window.
    pub requests: u64,
    /// Tokens in the window.
    pub tokens: u64,
    /// Window label (for example `24h`).
    pub window: String,
}

/// Typed LLM operations used by the game services.
///
/// The production implementation is the gRPC client; tests use the scripted
/// mock from `test_support`.
#[async_trait]
pub trait LlmApi: Send + Sync {
    /// Model parameters.
    async fn get_model_config(&self, ctx: &CallContext) -> Result<ModelConfig, LlmError>;

    /// Discard server-side session state. Best-effort cleanup.
    async fn end_session(&self, ctx: &CallContext, session_id: &str) -> Result<(), LlmError>;

    /// Prompt-injection / abuse verdict for one user input.
    async fn guard_is_malicious(&self, ctx: &CallContext, text: &str) -> Result<bool, LlmError>;

    /// Pick a riddle topic avoiding `banned` and `excluded_categories`.
    async fn twentyq_select_topic(
        &self,
        ctx: &CallContext,
        category: Option<&str>,
        banned: &[String],
        excluded_categories: &[String],
    ) -> Result<TopicSelection, LlmError>;

    /// Category labels the server can select from.
    async fn twentyq_get_categories(&self, ctx: &CallContext) -> Result<Vec<String>, LlmError>;

    /// Hint for the riddle target at the given level (1-based).
    async fn twentyq_generate_hints(
        &self,
        ctx: &CallContext,
        target: &str,
        category: &str,
        level: u32,
    ) -> Result<String, LlmError>;

    /// Answer a yes/no question about the riddle target.
    async fn twentyq_answer_question(
        &self,
        ctx: &CallContext,
        target: &str,
        category: &str,
        question: &str,
    ) -> Result<String, LlmError>;

    /// Whether a guess names the riddle target.
    async fn twentyq_verify_guess(
        &self,
        ctx: &CallContext,
        target: &str,
        guess: &str,
    ) -> Result<bool, LlmError>;

    /// Canonical form of a player question.
    async fn twentyq_normalize_question(
        &self,
        ctx: &CallContext,
        question: &str,
    ) -> Result<String, LlmError>;

    /// Whether `candidate` is a synonym of the riddle target.
    async fn twentyq_check_synonym(
        &self,
        ctx: &CallContext,
        target: &str,
        candidate: &str,
    ) -> Result<bool, LlmError>;

    /// Author a fresh soup puzzle.
    async fn soup_generate_puzzle(
        &self,
        ctx: &CallContext,
        spec: &PuzzleSpec,
    ) -> Result<PuzzleContent, LlmError>;

    /// Fetch a preset puzzle at the given difficulty.
    async fn soup_get_random_puzzle(
        &self,
        ctx: &CallContext,
        difficulty: u8,
    ) -> Result<PuzzleContent, LlmError>;

    /// Rewrite a preset's scenario and solution; title is kept.
    async fn soup_rewrite_scenario(
        &self,
        ctx: &CallContext,
        puzzle: &PuzzleContent,
    ) -> Result<(String, String), LlmError>;

    /// Answer a soup question in context.
    async fn soup_answer_question(
        &self,
        ctx: &CallContext,
        scenario: &str,
        solution: &str,
        question: &str,
        history: &[SoupTurn],
    ) -> Result<SoupAnswer, LlmError>;

    /// Judge a submitted solution.
    async fn soup_validate_solution(
        &self,
        ctx: &CallContext,
        scenario: &str,
        solution: &str,
        attempt: &str,
    ) -> Result<SolutionVerdict, LlmError>;

    /// Generate a hint for the soup puzzle at the given level (1-based).
    async fn soup_generate_hint(
        &self,
        ctx: &CallContext,
        scenario: &str,
        solution: &str,
        level: u32,
    ) -> Result<String, LlmError>;

    /// Usage for the current day.
    async fn get_daily_usage(&self, ctx: &CallContext) -> Result<UsageReport, LlmError>;

    /// Usage over the recent window.
    async fn get_recent_usage(&self, ctx: &CallContext) -> Result<UsageReport, LlmError>;

    /// Usage since the beginning of records.
    async fn get_total_usage(&self, ctx: &CallContext) -> Result<UsageReport, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::SolutionVerdict;

    #[test]
    fn verdict_parsing_is_case_insensitive_and_lenient() {
        assert_eq!(SolutionVerdict::parse("YES"), SolutionVerdict::Yes);
        assert_eq!(SolutionVerdict::parse("yes "), SolutionVerdict::Yes);
        assert_eq!(SolutionVerdict::parse("Close"), SolutionVerdict::Close);
        assert_eq!(SolutionVerdict::parse("NO"), SolutionVerdict::No);
        assert_eq!(SolutionVerdict::parse("gibberish"), SolutionVerdict::No);
    }
}
