//! Scripted in-process [`LlmApi`] implementation for tests.
//!
//! Deterministic by default: guesses verify by case-insensitive equality,
//! soup answers echo the request history plus the new turn, and puzzle
//! generation invents distinct content per call. Every method records its
//! invocation count and the peak number of concurrent in-flight calls.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{
    LlmApi, ModelConfig, PuzzleContent, PuzzleSpec, SolutionVerdict, SoupAnswer, SoupTurn,
    TopicSelection, UsageReport,
};
use crate::context::CallContext;
use crate::error::LlmError;

fn locked<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Scripted LLM double.
#[derive(Default)]
pub struct MockLlm {
    delay: Mutex<Option<Duration>>,
    counts: Mutex<HashMap<&'static str, u32>>,
    in_flight: Mutex<HashMap<&'static str, u32>>,
    max_in_flight: Mutex<HashMap<&'static str, u32>>,
    total_in_flight: AtomicU32,
    max_total_in_flight: AtomicU32,

    guard_malicious: AtomicBool,
    fail_end_session: AtomicBool,
    ended_sessions: Mutex<Vec<String>>,

    riddle_answers: Mutex<VecDeque<String>>,
    topic: Mutex<Option<TopicSelection>>,
    synonyms: Mutex<HashSet<(String, String)>>,

    soup_answers: Mutex<VecDeque<String>>,
    soup_verdicts: Mutex<VecDeque<SolutionVerdict>>,
    soup_hints: Mutex<VecDeque<String>>,
    puzzles: Mutex<VecDeque<PuzzleContent>>,
    fixed_puzzle: Mutex<Option<PuzzleContent>>,
    preset: Mutex<Option<PuzzleContent>>,
    fail_generation: AtomicBool,
}

struct InFlightGuard<'a> {
    mock: &'a MockLlm,
    name: &'static str,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.mock.total_in_flight.fetch_sub(1, Ordering::SeqCst);
        let mut in_flight = locked(&self.mock.in_flight);
        if let Some(current) = in_flight.get_mut(self.name) {
            *current = current.saturating_sub(1);
        }
    }
}

impl MockLlm {
    /// Fresh mock with default behavior.
    pub fn new() -> Self {
        Self::default()
    }

    /// Artificial latency per call, to widen race windows in tests.
    pub fn set_delay(&self, delay: Duration) {
        *locked(&self.delay) = Some(delay);
    }

    /// Make the guard flag every input as malicious.
    pub fn set_guard_malicious(&self, malicious: bool) {
        self.guard_malicious.store(malicious, Ordering::SeqCst);
    }

    /// Make `end_session` fail, to exercise best-effort cleanup paths.
    pub fn set_fail_end_session(&self, fail: bool) {
        self.fail_end_session.store(fail, Ordering::SeqCst);
    }

    /// Make `soup_generate_puzzle` fail every call.
    pub fn set_fail_generation(&self, fail: bool) {
        self.fail_generation.store(fail, Ordering::SeqCst);
    }

    /// Queue a riddle answer; the default is `"No."`.
    pub fn push_riddle_answer(&self, answer: impl Into<String>) {
        locked(&self.riddle_answers).push_back(answer.into());
    }

    /// Fix the topic selection.
    pub fn set_topic(&self, topic: TopicSelection) {
        *locked(&self.topic) = Some(topic);
    }

    /// Teach the synonym checker one accepted pair.
    pub fn add_synonym(&self, target: impl Into<String>, candidate: impl Into<String>) {
        locked(&self.synonyms).insert((
            target.into().to_ascii_lowercase(),
            candidate.into().to_ascii_lowercase(),
        ));
    }

    /// Queue a soup answer; the default is `"No"`.
    pub fn push_soup_answer(&self, answer: impl Into<String>) {
        locked(&self.soup_answers).push_back(answer.into());
    }

    /// Queue a solution verdict; the default is `No`.
    pub fn push_solution_verdict(&self, verdict: SolutionVerdict) {
        locked(&self.soup_verdicts).push_back(verdict);
    }

    /// Queue a soup hint; the default is `"H{level}"`.
    pub fn push_soup_hint(&self, hint: impl Into<String>) {
        locked(&self.soup_hints).push_back(hint.into());
    }

    /// Queue one generated puzzle.
    pub fn push_puzzle(&self, puzzle: PuzzleContent) {
        locked(&self.puzzles).push_back(puzzle);
    }

    /// Make every generation call return the same content.
    pub fn set_fixed_puzzle(&self, puzzle: PuzzleContent) {
        *locked(&self.fixed_puzzle) = Some(puzzle);
    }

    /// Fix the preset returned by `soup_get_random_puzzle`.
    pub fn set_preset(&self, puzzle: PuzzleContent) {
        *locked(&self.preset) = Some(puzzle);
    }

    /// Invocations of one method so far.
    pub fn call_count(&self, name: &'static str) -> u32 {
        locked(&self.counts).get(name).copied().unwrap_or(0)
    }

    /// Peak number of concurrent in-flight calls of one method.
    pub fn max_concurrent_calls(&self, name: &'static str) -> u32 {
        locked(&self.max_in_flight).get(name).copied().unwrap_or(0)
    }

    /// Peak number of concurrent in-flight calls across all methods.
    pub fn max_concurrent_calls_total(&self) -> u32 {
        self.max_total_in_flight.load(Ordering::SeqCst)
    }

    /// Session ids passed to `end_session`.
    pub fn ended_sessions(&self) -> Vec<String> {
        locked(&self.ended_sessions).clone()
    }

    async fn enter(&self, name: &'static str) -> InFlightGuard<'_> {
        *locked(&self.counts).entry(name).or_insert(0) += 1;
        {
            let mut in_flight = locked(&self.in_flight);
            let current = in_flight.entry(name).or_insert(0);
            *current += 1;
            let mut max = locked(&self.max_in_flight);
            let peak = max.entry(name).or_insert(0);
            *peak = (*peak).max(*current);
        }
        let total = self.total_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_total_in_flight.fetch_max(total, Ordering::SeqCst);
        let delay = *locked(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        InFlightGuard { mock: self, name }
    }

    fn synth_puzzle(&self, n: u32, spec: &PuzzleSpec) -> PuzzleContent {
        PuzzleContent {
            title: format!("Generated puzzle #{n}"),
            scenario: format!("Scenario #{n}"),
            solution: format!("Solution #{n}"),
            category: spec.category.clone().unwrap_or_else(|| "Mystery".to_string()),
            difficulty: spec.difficulty,
            hints: vec![format!("Hint for #{n}")],
        }
    }
}

#[async_trait]
impl LlmApi for MockLlm {
    async fn get_model_config(&self, _ctx: &CallContext) -> Result<ModelConfig, LlmError> {
        let _guard = self.enter("GetModelConfig").await;
        Ok(ModelConfig {
            model: "mock-model".to_string(),
            max_tokens: 1024,
            temperature: 0.7,
        })
    }

    async fn end_session(&self, _ctx: &CallContext, session_id: &str) -> Result<(), LlmError> {
        let _guard = self.enter("EndSession").await;
        if self.fail_end_session.load(Ordering::SeqCst) {
            return Err(LlmError::Call {
                call: "EndSession",
                status: tonic::Status::unavailable("mock end_session failure"),
            });
        }
        locked(&self.ended_sessions).push(session_id.to_string());
        Ok(())
    }

    async fn guard_is_malicious(&self, _ctx: &CallContext, _text: &str) -> Result<bool, LlmError> {
        let _guard = self.enter("GuardIsMalicious").await;
        Ok(self.guard_malicious.load(Ordering::SeqCst))
    }

    async fn twentyq_select_topic(
        &self,
        _ctx: &CallContext,
        category: Option<&str>,
        banned: &[String],
        _excluded_categories: &[String],
    ) -> Result<TopicSelection, LlmError> {
        let _guard = self.enter("TwentyQSelectTopic").await;
        if let Some(topic) = locked(&self.topic).clone() {
            return Ok(topic);
        }
        // Invent a name the banned list does not contain.
        let mut n = 0usize;
        loop {
            let name = if n == 0 {
                "otter".to_string()
            } else {
                format!("otter-{n}")
            };
            if !banned.iter().any(|b| b.eq_ignore_ascii_case(&name)) {
                return Ok(TopicSelection {
                    name,
                    category: category.unwrap_or("animals").to_string(),
                    details: "a playful aquatic mammal".to_string(),
                });
            }
            n += 1;
        }
    }

    async fn twentyq_get_categories(&self, _ctx: &CallContext) -> Result<Vec<String>, LlmError> {
        let _guard = self.enter("TwentyQGetCategories").await;
        Ok(vec![
            "animals".to_string(),
            "objects".to_string(),
            "food".to_string(),
        ])
    }

    async fn twentyq_generate_hints(
        &self,
        _ctx: &CallContext,
        _target: &str,
        _category: &str,
        level: u32,
    ) -> Result<String, LlmError> {
        let _guard = self.enter("TwentyQGenerateHints").await;
        Ok(format!("Hint {level}"))
    }

    async fn twentyq_answer_question(
        &self,
        _ctx: &CallContext,
        _target: &str,
        _category: &str,
        _question: &str,
    ) -> Result<String, LlmError> {
        let _guard = self.enter("TwentyQAnswerQuestion").await;
        Ok(locked(&self.riddle_answers)
            .pop_front()
            .unwrap_or_else(|| "No.".to_string()))
    }

    async fn twentyq_verify_guess(
        &self,
        _ctx: &CallContext,
        target: &str,
        guess: &str,
    ) -> Result<bool, LlmError> {
        let _guard = self.enter("TwentyQVerifyGuess").await;
        Ok(target.eq_ignore_ascii_case(guess.trim()))
    }

    async fn twentyq_normalize_question(
        &self,
        _ctx: &CallContext,
        question: &str,
    ) -> Result<String, LlmError> {
        let _guard = self.enter("TwentyQNormalizeQuestion").await;
        Ok(question.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    async fn twentyq_check_synonym(
        &self,
        _ctx: &CallContext,
        target: &str,
        candidate: &str,
    ) -> Result<bool, LlmError> {
        let _guard = self.enter("TwentyQCheckSynonym").await;
        Ok(locked(&self.synonyms).contains(&(
            target.to_ascii_lowercase(),
            candidate.trim().to_ascii_lowercase(),
        )))
    }

    async fn soup_generate_puzzle(
        &self,
        _ctx: &CallContext,
        spec: &PuzzleSpec,
    ) -> Result<PuzzleContent, LlmError> {
        let _guard = self.enter("TurtleSoupGeneratePuzzle").await;
        if self.fail_generation.load(Ordering::SeqCst) {
            return Err(LlmError::Call {
                call: "TurtleSoupGeneratePuzzle",
                status: tonic::Status::unavailable("mock generation failure"),
            });
        }
        if let Some(fixed) = locked(&self.fixed_puzzle).clone() {
            return Ok(fixed);
        }
        if let Some(queued) = locked(&self.puzzles).pop_front() {
            return Ok(queued);
        }
        let n = self.call_count("TurtleSoupGeneratePuzzle");
        Ok(self.synth_puzzle(n, spec))
    }

    async fn soup_get_random_puzzle(
        &self,
        _ctx: &CallContext,
        difficulty: u8,
    ) -> Result<PuzzleContent, LlmError> {
        let _guard = self.enter("TurtleSoupGetRandomPuzzle").await;
        Ok(locked(&self.preset).clone().unwrap_or(PuzzleContent {
            title: "Preset puzzle".to_string(),
            scenario: "Preset scenario".to_string(),
            solution: "Preset solution".to_string(),
            category: "Mystery".to_string(),
            difficulty,
            hints: vec!["Preset hint".to_string()],
        }))
    }

    async fn soup_rewrite_scenario(
        &self,
        _ctx: &CallContext,
        puzzle: &PuzzleContent,
    ) -> Result<(String, String), LlmError> {
        let _guard = self.enter("TurtleSoupRewriteScenario").await;
        Ok((
            format!("{} (retold)", puzzle.scenario),
            puzzle.solution.clone(),
        ))
    }

    async fn soup_answer_question(
        &self,
        _ctx: &CallContext,
        _scenario: &str,
        _solution: &str,
        question: &str,
        history: &[SoupTurn],
    ) -> Result<SoupAnswer, LlmError> {
        let _guard = self.enter("TurtleSoupAnswerQuestion").await;
        let answer = locked(&self.soup_answers)
            .pop_front()
            .unwrap_or_else(|| "No".to_string());
        let mut merged = history.to_vec();
        merged.push(SoupTurn {
            question: question.to_string(),
            answer: answer.clone(),
        });
        let question_count = merged.len() as u32;
        Ok(SoupAnswer {
            answer,
            history: merged,
            question_count,
        })
    }

    async fn soup_validate_solution(
        &self,
        _ctx: &CallContext,
        _scenario: &str,
        solution: &str,
        attempt: &str,
    ) -> Result<SolutionVerdict, LlmError> {
        let _guard = self.enter("TurtleSoupValidateSolution").await;
        if let Some(verdict) = locked(&self.soup_verdicts).pop_front() {
            return Ok(verdict);
        }
        Ok(if solution.eq_ignore_ascii_case(attempt.trim()) {
            SolutionVerdict::Yes
        } else {
            SolutionVerdict::No
        })
    }

    async fn soup_generate_hint(
        &self,
        _ctx: &CallContext,
        _scenario: &str,
        _solution: &str,
        level: u32,
    ) -> Result<String, LlmError> {
        let _guard = self.enter("TurtleSoupGenerateHint").await;
        Ok(locked(&self.soup_hints)
            .pop_front()
            .unwrap_or_else(|| format!("H{level}")))
    }

    async fn get_daily_usage(&self, _ctx: &CallContext) -> Result<UsageReport, LlmError> {
        let _guard = self.enter("GetDailyUsage").await;
        Ok(UsageReport {
            requests: 0,
            tokens: 0,
            window: "24h".to_string(),
        })
    }

    async fn get_recent_usage(&self, _ctx: &CallContext) -> Result<UsageReport, LlmError> {
        let _guard = self.enter("GetRecentUsage").await;
        Ok(UsageReport {
            requests: 0,
            tokens: 0,
            window: "7d".to_string(),
        })
    }

    async fn get_total_usage(&self, _ctx: &CallContext) -> Result<UsageReport, LlmError> {
        let _guard = self.enter("GetTotalUsage").await;
        Ok(UsageReport {
            requests: 0,
            tokens: 0,
            window: "all".to_string(),
        })
    }
}
