//! gRPC implementation of [`LlmApi`].

use std::time::Duration;

use async_trait::async_trait;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::Channel;

use crate::api::{
    LlmApi, ModelConfig, PuzzleContent, PuzzleSpec, SolutionVerdict, SoupAnswer, SoupTurn,
    TopicSelection, UsageReport,
};
use crate::context::CallContext;
use crate::endpoint::channel_for_url;
use crate::error::LlmError;
use crate::wire;
use crate::wire::paths;

/// Hard cap on message size in either direction: 16 MiB.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Default per-call deadline when the context carries none.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// Endpoint URL (`grpc://` or `unix://`).
    pub url: String,
    /// Optional API key forwarded as `x-api-key`.
    pub api_key: Option<String>,
    /// Default per-call deadline.
    pub default_timeout: Duration,
}

impl LlmClientConfig {
    /// Config for a URL with no API key and the default deadline.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            default_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// gRPC client for the LLM inference server.
///
/// The channel connects lazily; clones share it.
#[derive(Clone)]
pub struct GrpcLlmClient {
    inner: Grpc<Channel>,
    api_key: Option<MetadataValue<Ascii>>,
    default_timeout: Duration,
}

impl GrpcLlmClient {
    /// Build a client; the connection is established on first call.
    pub fn connect_lazy(config: LlmClientConfig) -> Result<Self, LlmError> {
        let channel = channel_for_url(&config.url)?;
        let api_key = match &config.api_key {
            Some(key) => Some(MetadataValue::try_from(key.as_str()).map_err(|_| {
                LlmError::Config {
                    reason: "api key contains non-ascii characters".to_string(),
                }
            })?),
            None => None,
        };
        let inner = Grpc::new(channel)
            .max_decoding_message_size(MAX_MESSAGE_BYTES)
            .max_encoding_message_size(MAX_MESSAGE_BYTES);
        Ok(Self {
            inner,
            api_key,
            default_timeout: config.default_timeout,
        })
    }

    async fn unary<Req, Resp>(
        &self,
        ctx: &CallContext,
        call: &'static str,
        path: &'static str,
        message: Req,
    ) -> Result<Resp, LlmError>
    where
        Req: prost::Message + Send + 'static,
        Resp: prost::Message + Default + Send + 'static,
    {
        let mut grpc = self.inner.clone();
        grpc.ready().await.map_err(|e| LlmError::Call {
            call,
            status: tonic::Status::unknown(format!("service was not ready: {e}")),
        })?;

        let mut request = tonic::Request::new(message);
        request.set_timeout(ctx.deadline.unwrap_or(self.default_timeout));
        let metadata = request.metadata_mut();
        if let Some(key) = &self.api_key {
            metadata.insert("x-api-key", key.clone());
        }
        if let Some(request_id) = &ctx.request_id {
            if let Ok(value) = MetadataValue::try_from(request_id.as_str()) {
                metadata.insert("x-request-id", value);
            }
        }

        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(path);
        let response = grpc
            .unary(request, path, codec)
            .await
            .map_err(|status| LlmError::Call { call, status })?;
        tracing::debug!(call, "llm call completed");
        Ok(response.into_inner())
    }
}

#[async_trait]
impl LlmApi for GrpcLlmClient {
    async fn get_model_config(&self, ctx: &CallContext) -> Result<ModelConfig, LlmError> {
        let response: wire::ModelConfigResponse = self
            .unary(ctx, "GetModelConfig", paths::GET_MODEL_CONFIG, wire::Empty {})
            .await?;
        Ok(ModelConfig {
            model: response.model,
            max_tokens: response.max_tokens,
            temperature: response.temperature,
        })
    }

    async fn end_session(&self, ctx: &CallContext, session_id: &str) -> Result<(), LlmError> {
        let _: wire::Empty = self
            .unary(
                ctx,
                "EndSession",
                paths::END_SESSION,
                wire::EndSessionRequest {
                    session_id: session_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn guard_is_malicious(&self, ctx: &CallContext, text: &str) -> Result<bool, LlmError> {
        let response: wire::GuardCheckResponse = self
            .unary(
                ctx,
                "GuardIsMalicious",
                paths::GUARD_IS_MALICIOUS,
                wire::GuardCheckRequest {
                    text: text.to_string(),
                },
            )
            .await?;
        Ok(response.malicious)
    }

    async fn twentyq_select_topic(
        &self,
        ctx: &CallContext,
        category: Option<&str>,
        banned: &[String],
        excluded_categories: &[String],
    ) -> Result<TopicSelection, LlmError> {
        let response: wire::SelectTopicResponse = self
            .unary(
                ctx,
                "TwentyQSelectTopic",
                paths::TWENTYQ_SELECT_TOPIC,
                wire::SelectTopicRequest {
                    category: category.map(str::to_string),
                    banned: banned.to_vec(),
                    excluded_categories: excluded_categories.to_vec(),
                },
            )
            .await?;
        Ok(TopicSelection {
            name: response.name,
            category: response.category,
            details: response.details,
        })
    }

    async fn twentyq_get_categories(&self, ctx: &CallContext) -> Result<Vec<String>, LlmError> {
        let response: wire::GetCategoriesResponse = self
            .unary(
                ctx,
                "TwentyQGetCategories",
                paths::TWENTYQ_GET_CATEGORIES,
                wire::Empty {},
            )
            .await?;
        Ok(response.categories)
    }

    async fn twentyq_generate_hints(
        &self,
        ctx: &CallContext,
        target: &str,
        category: &str,
        level: u32,
    ) -> Result<String, LlmError> {
        let response: wire::GenerateHintsResponse = self
            .unary(
                ctx,
                "TwentyQGenerateHints",
                paths::TWENTYQ_GENERATE_HINTS,
                wire::GenerateHintsRequest {
                    target: target.to_string(),
                    category: category.to_string(),
                    level,
                },
            )
            .await?;
        Ok(response.hint)
    }

    async fn twentyq_answer_question(
        &self,
        ctx: &CallContext,
        target: &str,
        category: &str,
        question: &str,
    ) -> Result<String, LlmError> {
        let response: wire::RiddleAnswerResponse = self
            .unary(
                ctx,
                "TwentyQAnswerQuestion",
                paths::TWENTYQ_ANSWER_QUESTION,
                wire::RiddleAnswerRequest {
                    target: target.to_string(),
                    category: category.to_string(),
                    question: question.to_string(),
                },
            )
            .await?;
        Ok(response.answer)
    }

    async fn twentyq_verify_guess(
        &self,
        ctx: &CallContext,
        target: &str,
        guess: &str,
    ) -> Result<bool, LlmError> {
        let response: wire::VerifyGuessResponse = self
            .unary(
                ctx,
                "TwentyQVerifyGuess",
                paths::TWENTYQ_VERIFY_GUESS,
                wire::VerifyGuessRequest {
                    target: target.to_string(),
                    guess: guess.to_string(),
                },
            )
            .await?;
        Ok(response.correct)
    }

    async fn twentyq_normalize_question(
        &self,
        ctx: &CallContext,
        question: &str,
    ) -> Result<String, LlmError> {
        let response: wire::NormalizeQuestionResponse = self
            .unary(
                ctx,
                "TwentyQNormalizeQuestion",
                paths::TWENTYQ_NORMALIZE_QUESTION,
                wire::NormalizeQuestionRequest {
                    question: question.to_string(),
                },
            )
            .await?;
        Ok(response.normalized)
    }

    async fn twentyq_check_synonym(
        &self,
        ctx: &CallContext,
        target: &str,
        candidate: &str,
    ) -> Result<bool, LlmError> {
        let response: wire::CheckSynonymResponse = self
            .unary(
                ctx,
                "TwentyQCheckSynonym",
                paths::TWENTYQ_CHECK_SYNONYM,
                wire::CheckSynonymRequest {
                    target: target.to_string(),
                    candidate: candidate.to_string(),
                },
            )
            .await?;
        Ok(response.synonym)
    }

    async fn soup_generate_puzzle(
        &self,
        ctx: &CallContext,
        spec: &PuzzleSpec,
    ) -> Result<PuzzleContent, LlmError> {
        let response: wire::PuzzleResponse = self
            .unary(
                ctx,
                "TurtleSoupGeneratePuzzle",
                paths::SOUP_GENERATE_PUZZLE,
                wire::GeneratePuzzleRequest {
                    category: spec.category.clone(),
                    difficulty: u32::from(spec.difficulty),
                    theme: spec.theme.clone(),
                },
            )
            .await?;
        Ok(puzzle_from_wire(response))
    }

    async fn soup_get_random_puzzle(
        &self,
        ctx: &CallContext,
        difficulty: u8,
    ) -> Result<PuzzleContent, LlmError> {
        let response: wire::PuzzleResponse = self
            .unary(
                ctx,
                "TurtleSoupGetRandomPuzzle",
                paths::SOUP_GET_RANDOM_PUZZLE,
                wire::RandomPuzzleRequest {
                    difficulty: u32::from(difficulty),
                },
            )
            .await?;
        Ok(puzzle_from_wire(response))
    }

    async fn soup_rewrite_scenario(
        &self,
        ctx: &CallContext,
        puzzle: &PuzzleContent,
    ) -> Result<(String, String), LlmError> {
        let response: wire::RewriteScenarioResponse = self
            .unary(
                ctx,
                "TurtleSoupRewriteScenario",
                paths::SOUP_REWRITE_SCENARIO,
                wire::RewriteScenarioRequest {
                    title: puzzle.title.clone(),
                    scenario: puzzle.scenario.clone(),
                    solution: puzzle.solution.clone(),
                },
            )
            .await?;
        Ok((response.scenario, response.solution))
    }

    async fn soup_answer_question(
        &self,
        ctx: &CallContext,
        scenario: &str,
        solution: &str,
        question: &str,
        history: &[SoupTurn],
    ) -> Result<SoupAnswer, LlmError> {
        let response: wire::SoupAnswerResponse = self
            .unary(
                ctx,
                "TurtleSoupAnswerQuestion",
                paths::SOUP_ANSWER_QUESTION,
                wire::SoupAnswerRequest {
                    scenario: scenario.to_string(),
                    solution: solution.to_string(),
                    question: question.to_string(),
                    history: history
                        .iter()
                        .map(|turn| wire::QaPair {
                            question: turn.question.clone(),
                            answer: turn.answer.clone(),
                        })
                        .collect(),
                },
            )
            .await?;
        Ok(SoupAnswer {
            answer: response.answer,
            history: response
                .history
                .into_iter()
                .map(|pair| SoupTurn {
                    question: pair.question,
                    answer: pair.answer,
                })
                .collect(),
            question_count: response.question_count,
        })
    }

    async fn soup_validate_solution(
        &self,
        ctx: &CallContext,
        scenario: &str,
        solution: &str,
        attempt: &str,
    ) -> Result<SolutionVerdict, LlmError> {
        let response: wire::ValidateSolutionResponse = self
            .unary(
                ctx,
                "TurtleSoupValidateSolution",
                paths::SOUP_VALIDATE_SOLUTION,
                wire::ValidateSolutionRequest {
                    scenario: scenario.to_string(),
                    solution: solution.to_string(),
                    attempt: attempt.to_string(),
                },
            )
            .await?;
        Ok(SolutionVerdict::parse(&response.verdict))
    }

    async fn soup_generate_hint(
        &self,
        ctx: &CallContext,
        scenario: &str,
        solution: &str,
        level: u32,
    ) -> Result<String, LlmError> {
        let response: wire::SoupHintResponse = self
            .unary(
                ctx,
                "TurtleSoupGenerateHint",
                paths::SOUP_GENERATE_HINT,
                wire::SoupHintRequest {
                    scenario: scenario.to_string(),
                    solution: solution.to_string(),
                    level,
                },
            )
            .await?;
        Ok(response.hint)
    }

    async fn get_daily_usage(&self, ctx: &CallContext) -> Result<UsageReport, LlmError> {
        let response: wire::UsageResponse = self
            .unary(ctx, "GetDailyUsage", paths::GET_DAILY_USAGE, wire::Empty {})
            .await?;
        Ok(usage_from_wire(response))
    }

    async fn get_recent_usage(&self, ctx: &CallContext) -> Result<UsageReport, LlmError> {
        let response: wire::UsageResponse = self
            .unary(ctx, "GetRecentUsage", paths::GET_RECENT_USAGE, wire::Empty {})
            .await?;
        Ok(usage_from_wire(response))
    }

    async fn get_total_usage(&self, ctx: &CallContext) -> Result<UsageReport, LlmError> {
        let response: wire::UsageResponse = self
            .unary(ctx, "GetTotalUsage", paths::GET_TOTAL_USAGE, wire::Empty {})
            .await?;
        Ok(usage_from_wire(response))
    }
}

fn puzzle_from_wire(response: wire::PuzzleResponse) -> PuzzleContent {
    PuzzleContent {
        title: response.title,
        scenario: response.scenario,
        solution: response.solution,
        category: response.category,
        difficulty: response.difficulty.min(u32::from(u8::MAX)) as u8,
        hints: response.hints,
    }
}

fn usage_from_wire(response: wire::UsageResponse) -> UsageReport {
    UsageReport {
        requests: response.requests,
        tokens: response.tokens,
        window: response.window,
    }
}
