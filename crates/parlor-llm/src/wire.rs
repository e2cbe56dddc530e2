//! Hand-written protobuf messages for `parlor.llm.v1.LlmService`.
//!
//! Field numbers are the wire contract; keep them stable.

/// Empty request for parameterless calls.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModelConfigResponse {
    #[prost(string, tag = "1")]
    pub model: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub max_tokens: u32,
    #[prost(double, tag = "3")]
    pub temperature: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EndSessionRequest {
    #[prost(string, tag = "1")]
    pub session_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GuardCheckRequest {
    #[prost(string, tag = "1")]
    pub text: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GuardCheckResponse {
    #[prost(bool, tag = "1")]
    pub malicious: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SelectTopicRequest {
    #[prost(string, optional, tag = "1")]
    pub category: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(string, repeated, tag = "2")]
    pub banned: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, repeated, tag = "3")]
    pub excluded_categories: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SelectTopicResponse {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub category: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub details: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetCategoriesResponse {
    #[prost(string, repeated, tag = "1")]
    pub categories: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GenerateHintsRequest {
    #[prost(string, tag = "1")]
    pub target: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub category: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub level: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GenerateHintsResponse {
    #[prost(string, tag = "1")]
    pub hint: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RiddleAnswerRequest {
    #[prost(string, tag = "1")]
    pub target: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub category: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub question: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RiddleAnswerResponse {
    #[prost(string, tag = "1")]
    pub answer: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerifyGuessRequest {
    #[prost(string, tag = "1")]
    pub target: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub guess: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerifyGuessResponse {
    #[prost(bool, tag = "1")]
    pub correct: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NormalizeQuestionRequest {
    #[prost(string, tag = "1")]
    pub question: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NormalizeQuestionResponse {
    #[prost(string, tag = "1")]
    pub normalized: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckSynonymRequest {
    #[prost(string, tag = "1")]
    pub target: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub candidate: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckSynonymResponse {
    #[prost(bool, tag = "1")]
    pub synonym: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GeneratePuzzleRequest {
    #[prost(string, optional, tag = "1")]
    pub category: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(uint32, tag = "2")]
    pub difficulty: u32,
    #[prost(string, optional, tag = "3")]
    pub theme: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RandomPuzzleRequest {
    #[prost(uint32, tag = "1")]
    pub difficulty: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PuzzleResponse {
    #[prost(string, tag = "1")]
    pub title: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub scenario: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub solution: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub category: ::prost::alloc::string::String,
    #[prost(uint32, tag = "5")]
    pub difficulty: u32,
    #[prost(string, repeated, tag = "6")]
    pub hints: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RewriteScenarioRequest {
    #[prost(string, tag = "1")]
    pub title: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub scenario: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub solution: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RewriteScenarioResponse {
    #[prost(string, tag = "1")]
    pub scenario: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub solution: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QaPair {
    #[prost(string, tag = "1")]
    pub question: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub answer: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SoupAnswerRequest {
    #[prost(string, tag = "1")]
    pub scenario: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub solution: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub question: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "4")]
    pub history: ::prost::alloc::vec::Vec<QaPair>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SoupAnswerResponse {
    #[prost(string, tag = "1")]
    pub answer: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub history: ::prost::alloc::vec::Vec<QaPair>,
    #[prost(uint32, tag = "3")]
    pub question_count: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateSolutionRequest {
    #[prost(string, tag = "1")]
    pub scenario: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub solution: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub attempt: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateSolutionResponse {
    /// One of `YES`, `CLOSE`, `NO`.
    #[prost(string, tag = "1")]
    pub verdict: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SoupHintRequest {
    #[prost(string, tag = "1")]
    pub scenario: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub solution: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub level: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SoupHintResponse {
    #[prost(string, tag = "1")]
    pub hint: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UsageResponse {
    #[prost(uint64, tag = "1")]
    pub requests: u64,
    #[prost(uint64, tag = "2")]
    pub tokens: u64,
    #[prost(string, tag = "3")]
    pub window: ::prost::alloc::string::String,
}

/// Fully-qualified method paths.
pub mod paths {
    pub const GET_MODEL_CONFIG: &str = "/parlor.llm.v1.LlmService/GetModelConfig";
    pub const END_SESSION: &str = "/parlor.llm.v1.LlmService/EndSession";
    pub const GUARD_IS_MALICIOUS: &str = "/parlor.llm.v1.LlmService/GuardIsMalicious";
    pub const TWENTYQ_SELECT_TOPIC: &str = "/parlor.llm.v1.LlmService/TwentyQSelectTopic";
    pub const TWENTYQ_GET_CATEGORIES: &str = "/parlor.llm.v1.LlmService/TwentyQGetCategories";
    pub const TWENTYQ_GENERATE_HINTS: &str = "/parlor.llm.v1.LlmService/TwentyQGenerateHints";
    pub const TWENTYQ_ANSWER_QUESTION: &str = "/parlor.llm.v1.LlmService/TwentyQAnswerQuestion";
    pub const TWENTYQ_VERIFY_GUESS: &str = "/parlor.llm.v1.LlmService/TwentyQVerifyGuess";
    pub const TWENTYQ_NORMALIZE_QUESTION: &str =
        "/parlor.llm.v1.LlmService/TwentyQNormalizeQuestion";
    pub const TWENTYQ_CHECK_SYNONYM: &str = "/parlor.llm.v1.LlmService/TwentyQCheckSynonym";
    pub const SOUP_GENERATE_PUZZLE: &str = "/parlor.llm.v1.LlmService/TurtleSoupGeneratePuzzle";
    pub const SOUP_GET_RANDOM_PUZZLE: &str = "/parlor.llm.v1.LlmService/TurtleSoupGetRandomPuzzle";
    pub const SOUP_REWRITE_SCENARIO: &str = "/parlor.llm.v1.LlmService/TurtleSoupRewriteScenario";
    pub const SOUP_ANSWER_QUESTION: &str = "/parlor.llm.v1.LlmService/TurtleSoupAnswerQuestion";
    pub const SOUP_VALIDATE_SOLUTION: &str = "/parlor.llm.v1.LlmService/TurtleSoupValidateSolution";
    pub const SOUP_GENERATE_HINT: &str = "/parlor.llm.v1.LlmService/TurtleSoupGenerateHint";
    pub const GET_DAILY_USAGE: &str = "/parlor.llm.v1.LlmService/GetDailyUsage";
    pub const GET_RECENT_USAGE: &str = "/parlor.llm.v1.LlmService/GetRecentUsage";
    pub const GET_TOTAL_USAGE: &str = "/parlor.llm.v1.LlmService/GetTotalUsage";
}
