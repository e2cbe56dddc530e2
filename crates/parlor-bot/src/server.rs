//! Bot HTTP API.
//!
//! JSON in, JSON out; typed game errors map onto HTTP statuses here and
//! nowhere else. LLM-bound operations run under a per-request timeout so a
//! stalled backend cannot pin a connection.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use parlor_games::{
    ApproveOutcome, GameError, PendingMessage, RiddleStatus, StartVoteOutcome, SurrenderVote,
    SurrenderVoteService,
};
use parlor_llm::CallContext;
use parlor_llm::PuzzleSpec;
use parlor_store::{EnqueueOutcome, LockScope, now_unix_ms};
use serde::{Deserialize, Serialize};

use crate::state::Services;

/// Deadline for one LLM-bound request.
pub const TURN_TIMEOUT_SECS: u64 = 60;

/// API error: a typed game error or a local timeout.
#[derive(Debug)]
pub enum ApiError {
    /// Typed error from the services.
    Game(GameError),
    /// The per-request deadline elapsed.
    Timeout,
    /// A surrender-vote approval could not be persisted.
    VoteUnavailable,
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        ApiError::Game(err)
    }
}

fn status_for(err: &GameError) -> StatusCode {
    match err {
        GameError::InvalidQuestion { .. }
        | GameError::InvalidAnswer { .. }
        | GameError::MalformedInput { .. }
        | GameError::InputInjection => StatusCode::BAD_REQUEST,
        GameError::SessionNotFound => StatusCode::NOT_FOUND,
        GameError::GameAlreadyStarted
        | GameError::GameAlreadySolved
        | GameError::GameNotStarted
        | GameError::DuplicateQuestion
        | GameError::HintLimitExceeded
        | GameError::MaxHintsReached
        | GameError::HintNotAvailable => StatusCode::CONFLICT,
        GameError::AccessDenied | GameError::UserBlocked | GameError::ChatBlocked => {
            StatusCode::FORBIDDEN
        }
        GameError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        GameError::Lock(_)
        | GameError::Store(_)
        | GameError::Llm(_)
        | GameError::PuzzleGeneration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Game(err) => {
                let status = status_for(&err);
                let mut body = serde_json::json!({ "error": err.to_string() });
                if let GameError::RateLimited { remaining_secs } = &err {
                    body["retry_after_secs"] = serde_json::json!(remaining_secs);
                }
                if status.is_server_error() {
                    tracing::warn!(error = %err, "request failed");
                }
                (status, Json(body)).into_response()
            }
            ApiError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                Json(serde_json::json!({ "error": "request timed out" })),
            )
                .into_response(),
            ApiError::VoteUnavailable => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "vote could not be persisted" })),
            )
                .into_response(),
        }
    }
}

fn call_context(headers: &HeaderMap) -> CallContext {
    let request_id = headers
        .get("x-request-id")
        .or_else(|| headers.get("request_id"))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    match request_id {
        Some(id) => CallContext::with_request_id(id),
        None => CallContext::new(),
    }
}

async fn with_deadline<T, F>(fut: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, GameError>>,
{
    match tokio::time::timeout(Duration::from_secs(TURN_TIMEOUT_SECS), fut).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => Err(ApiError::Timeout),
    }
}

// ---- request/response bodies ----

#[derive(Debug, Deserialize)]
pub struct SoupStartRequest {
    pub chat: String,
    pub user: String,
    #[serde(default)]
    pub difficulty: Option<u8>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SoupStartResponse {
    pub chat: String,
    pub title: String,
    pub scenario: String,
    pub category: String,
    pub difficulty: u8,
    pub players: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub chat: String,
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub question_count: u32,
}

#[derive(Debug, Deserialize)]
pub struct SolutionRequest {
    pub chat: String,
    pub attempt: String,
}

#[derive(Debug, Serialize)]
pub struct SolutionResponse {
    pub verdict: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GuessRequest {
    pub chat: String,
    pub user: String,
    pub guess: String,
}

#[derive(Debug, Serialize)]
pub struct GuessResponse {
    pub correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrong_guesses: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub chat: String,
}

#[derive(Debug, Serialize)]
pub struct HintResponse {
    pub hint: String,
    pub hints_used: u32,
    pub max_hints: u32,
}

#[derive(Debug, Deserialize)]
pub struct PlayerRequest {
    pub chat: String,
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct PlayersResponse {
    pub players: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SurrenderRequest {
    pub chat: String,
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct SurrenderResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approvals: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<usize>,
}

impl SurrenderResponse {
    fn pending(vote: &SurrenderVote) -> Self {
        Self {
            status: "pending",
            solution: None,
            target: None,
            approvals: Some(vote.approvals.len()),
            required: Some(vote.required()),
        }
    }

    fn already_voted() -> Self {
        Self {
            status: "already_voted",
            solution: None,
            target: None,
            approvals: None,
            required: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InboundRequest {
    pub chat: String,
    pub user: String,
    pub content: String,
    #[serde(default)]
    pub timestamp_ms: Option<u64>,
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Serialize)]
pub struct InboundResponse {
    pub queued: &'static str,
}

/// Soup state without the hidden solution.
#[derive(Debug, Serialize)]
pub struct SoupStateResponse {
    pub title: String,
    pub scenario: String,
    pub category: String,
    pub difficulty: u8,
    pub question_count: u32,
    pub hints_used: u32,
    pub hint_contents: Vec<String>,
    pub players: Vec<String>,
    pub is_solved: bool,
}

// ---- soup handlers ----

async fn soup_start(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Json(req): Json<SoupStartRequest>,
) -> Result<Json<SoupStartResponse>, ApiError> {
    let ctx = call_context(&headers);
    let scope = LockScope::new();
    let spec = PuzzleSpec {
        category: req.category,
        difficulty: req.difficulty.unwrap_or(parlor_games::DEFAULT_DIFFICULTY),
        theme: req.theme,
    };
    let state = with_deadline(services.soup.start_game(&scope, &ctx, &req.chat, &req.user, spec))
        .await?;
    let puzzle = state.puzzle.ok_or(ApiError::Game(GameError::GameNotStarted))?;
    Ok(Json(SoupStartResponse {
        chat: req.chat,
        title: puzzle.title,
        scenario: puzzle.scenario,
        category: puzzle.category,
        difficulty: puzzle.difficulty,
        players: state.players,
    }))
}

async fn soup_question(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Json(req): Json<QuestionRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let ctx = call_context(&headers);
    let scope = LockScope::new();
    let outcome =
        with_deadline(services.soup.ask_question(&scope, &ctx, &req.chat, &req.question)).await?;
    Ok(Json(AnswerResponse {
        answer: outcome.answer,
        question_count: outcome.question_count,
    }))
}

async fn soup_solution(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Json(req): Json<SolutionRequest>,
) -> Result<Json<SolutionResponse>, ApiError> {
    let ctx = call_context(&headers);
    let scope = LockScope::new();
    let outcome =
        with_deadline(services.soup.submit_solution(&scope, &ctx, &req.chat, &req.attempt))
            .await?;
    Ok(Json(SolutionResponse {
        verdict: outcome.verdict.as_str().to_string(),
        solution: outcome.solution,
    }))
}

async fn soup_hint(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<HintResponse>, ApiError> {
    let ctx = call_context(&headers);
    let scope = LockScope::new();
    let outcome = with_deadline(services.soup.request_hint(&scope, &ctx, &req.chat)).await?;
    Ok(Json(HintResponse {
        hint: outcome.hint,
        hints_used: outcome.hints_used,
        max_hints: outcome.max_hints,
    }))
}

async fn soup_player(
    State(services): State<Arc<Services>>,
    Json(req): Json<PlayerRequest>,
) -> Result<Json<PlayersResponse>, ApiError> {
    let scope = LockScope::new();
    let players = services
        .soup
        .register_player(&scope, &req.chat, &req.user)
        .await?;
    Ok(Json(PlayersResponse { players }))
}

async fn soup_state(
    State(services): State<Arc<Services>>,
    Path(chat): Path<String>,
) -> Result<Json<SoupStateResponse>, ApiError> {
    let scope = LockScope::new();
    let state = services.soup.get_game_state(&scope, &chat).await?;
    let puzzle = state.puzzle.ok_or(ApiError::Game(GameError::GameNotStarted))?;
    Ok(Json(SoupStateResponse {
        title: puzzle.title,
        scenario: puzzle.scenario,
        category: puzzle.category,
        difficulty: puzzle.difficulty,
        question_count: state.question_count,
        hints_used: state.hints_used,
        hint_contents: state.hint_contents,
        players: state.players,
        is_solved: state.is_solved,
    }))
}

async fn soup_surrender(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Json(req): Json<SurrenderRequest>,
) -> Result<Json<SurrenderResponse>, ApiError> {
    let ctx = call_context(&headers);
    let scope = LockScope::new();
    let state = services.soup.get_game_state(&scope, &req.chat).await?;
    drop(scope);

    let outcome =
        vote_or_approve(&services.soup_votes, &req.chat, &req.user, state.players).await?;
    match outcome {
        ApproveOutcome::Completed(_) => {
            let scope = LockScope::new();
            let surrendered =
                with_deadline(services.soup.surrender(&scope, &ctx, &req.chat)).await?;
            Ok(Json(SurrenderResponse {
                status: "resolved",
                solution: Some(surrendered.solution),
                target: None,
                approvals: None,
                required: None,
            }))
        }
        ApproveOutcome::Progress(vote) => Ok(Json(SurrenderResponse::pending(&vote))),
        ApproveOutcome::AlreadyVoted => Ok(Json(SurrenderResponse::already_voted())),
        ApproveOutcome::NotEligible => Err(ApiError::Game(GameError::AccessDenied)),
        ApproveOutcome::NotFound => Err(ApiError::Game(GameError::SessionNotFound)),
        ApproveOutcome::PersistenceFailure => Err(ApiError::VoteUnavailable),
    }
}

async fn soup_inbound(
    State(services): State<Arc<Services>>,
    Json(req): Json<InboundRequest>,
) -> Result<(StatusCode, Json<InboundResponse>), ApiError> {
    inbound(&services.soup_worker, req).await
}

// ---- riddle handlers ----

#[derive(Debug, Deserialize)]
pub struct RiddleStartRequest {
    pub chat: String,
    pub user: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RiddleStartResponse {
    pub chat: String,
    pub category: String,
    pub intro: String,
}

async fn riddle_start(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Json(req): Json<RiddleStartRequest>,
) -> Result<Json<RiddleStartResponse>, ApiError> {
    let ctx = call_context(&headers);
    let scope = LockScope::new();
    let started = with_deadline(services.riddle.start_game(
        &scope,
        &ctx,
        &req.chat,
        &req.user,
        req.category.as_deref(),
    ))
    .await?;
    Ok(Json(RiddleStartResponse {
        chat: req.chat,
        category: started.category,
        intro: started.intro,
    }))
}

async fn riddle_question(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Json(req): Json<QuestionRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let ctx = call_context(&headers);
    let scope = LockScope::new();
    let outcome =
        with_deadline(services.riddle.ask_question(&scope, &ctx, &req.chat, &req.question))
            .await?;
    Ok(Json(AnswerResponse {
        answer: outcome.answer,
        question_count: outcome.question_count,
    }))
}

async fn riddle_guess(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Json(req): Json<GuessRequest>,
) -> Result<Json<GuessResponse>, ApiError> {
    let ctx = call_context(&headers);
    let scope = LockScope::new();
    let outcome = with_deadline(services.riddle.submit_answer(
        &scope,
        &ctx,
        &req.chat,
        &req.user,
        &req.guess,
    ))
    .await?;
    Ok(Json(match outcome {
        parlor_games::GuessOutcome::Correct { target } => GuessResponse {
            correct: true,
            target: Some(target),
            wrong_guesses: None,
        },
        parlor_games::GuessOutcome::Incorrect { wrong_guesses } => GuessResponse {
            correct: false,
            target: None,
            wrong_guesses: Some(wrong_guesses),
        },
    }))
}

async fn riddle_hint(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<HintResponse>, ApiError> {
    let ctx = call_context(&headers);
    let scope = LockScope::new();
    let outcome = with_deadline(services.riddle.request_hint(&scope, &ctx, &req.chat)).await?;
    Ok(Json(HintResponse {
        hint: outcome.hint,
        hints_used: outcome.hints_used,
        max_hints: outcome.max_hints,
    }))
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub categories: Vec<String>,
}

async fn riddle_categories(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
) -> Result<Json<CategoriesResponse>, ApiError> {
    let ctx = call_context(&headers);
    let categories = services.riddle.categories(&ctx).await?;
    Ok(Json(CategoriesResponse { categories }))
}

async fn riddle_player(
    State(services): State<Arc<Services>>,
    Json(req): Json<PlayerRequest>,
) -> Result<Json<PlayersResponse>, ApiError> {
    let scope = LockScope::new();
    let players = services
        .riddle
        .register_player(&scope, &req.chat, &req.user)
        .await?;
    Ok(Json(PlayersResponse { players }))
}

async fn riddle_state(
    State(services): State<Arc<Services>>,
    Path(chat): Path<String>,
) -> Result<Json<RiddleStatus>, ApiError> {
    let scope = LockScope::new();
    Ok(Json(services.riddle.get_game_state(&scope, &chat).await?))
}

async fn riddle_surrender(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Json(req): Json<SurrenderRequest>,
) -> Result<Json<SurrenderResponse>, ApiError> {
    let ctx = call_context(&headers);
    let scope = LockScope::new();
    let status = services.riddle.get_game_state(&scope, &req.chat).await?;
    drop(scope);
    let players = if status.players.is_empty() {
        vec![req.user.clone()]
    } else {
        status.players
    };

    let outcome = vote_or_approve(&services.riddle_votes, &req.chat, &req.user, players).await?;
    match outcome {
        ApproveOutcome::Completed(_) => {
            let scope = LockScope::new();
            let target = with_deadline(services.riddle.surrender(&scope, &ctx, &req.chat)).await?;
            Ok(Json(SurrenderResponse {
                status: "resolved",
                solution: None,
                target: Some(target),
                approvals: None,
                required: None,
            }))
        }
        ApproveOutcome::Progress(vote) => Ok(Json(SurrenderResponse::pending(&vote))),
        ApproveOutcome::AlreadyVoted => Ok(Json(SurrenderResponse::already_voted())),
        ApproveOutcome::NotEligible => Err(ApiError::Game(GameError::AccessDenied)),
        ApproveOutcome::NotFound => Err(ApiError::Game(GameError::SessionNotFound)),
        ApproveOutcome::PersistenceFailure => Err(ApiError::VoteUnavailable),
    }
}

async fn riddle_inbound(
    State(services): State<Arc<Services>>,
    Json(req): Json<InboundRequest>,
) -> Result<(StatusCode, Json<InboundResponse>), ApiError> {
    inbound(&services.riddle_worker, req).await
}

// ---- shared helpers ----

async fn vote_or_approve(
    votes: &SurrenderVoteService,
    chat: &str,
    user: &str,
    players: Vec<String>,
) -> Result<ApproveOutcome, ApiError> {
    if votes.current(chat).await?.is_some() {
        return Ok(votes.approve(chat, user).await?);
    }
    Ok(match votes.start_vote(chat, user, players).await? {
        StartVoteOutcome::Immediate(vote) => ApproveOutcome::Completed(vote),
        StartVoteOutcome::Started(vote) => ApproveOutcome::Progress(vote),
    })
}

async fn inbound(
    worker: &Arc<parlor_games::TurnWorker>,
    req: InboundRequest,
) -> Result<(StatusCode, Json<InboundResponse>), ApiError> {
    let message = PendingMessage::new(
        req.user,
        req.content,
        req.timestamp_ms.unwrap_or_else(now_unix_ms),
    );
    let outcome = worker.submit(&req.chat, &message, req.replace).await?;
    let queued = match outcome {
        EnqueueOutcome::Success => "accepted",
        EnqueueOutcome::ReplacedDuplicate => "replaced",
        EnqueueOutcome::Duplicate => "duplicate",
        EnqueueOutcome::QueueFull => "full",
    };
    let status = match outcome {
        EnqueueOutcome::Success | EnqueueOutcome::ReplacedDuplicate => StatusCode::ACCEPTED,
        EnqueueOutcome::Duplicate => StatusCode::CONFLICT,
        EnqueueOutcome::QueueFull => StatusCode::TOO_MANY_REQUESTS,
    };
    Ok((status, Json(InboundResponse { queued })))
}

// ---- usage + health ----

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub requests: u64,
    pub tokens: u64,
    pub window: String,
}

async fn usage(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(window): Path<String>,
) -> Result<Json<UsageResponse>, ApiError> {
    let ctx = call_context(&headers);
    let report = match window.as_str() {
        "daily" => services.llm.get_daily_usage(&ctx).await,
        "recent" => services.llm.get_recent_usage(&ctx).await,
        "total" => services.llm.get_total_usage(&ctx).await,
        _ => {
            return Err(ApiError::Game(GameError::MalformedInput {
                reason: format!("unknown usage window {window:?}"),
            }));
        }
    }
    .map_err(GameError::from)?;
    Ok(Json(UsageResponse {
        requests: report.requests,
        tokens: report.tokens,
        window: report.window,
    }))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Full bot API router.
pub fn router(services: Arc<Services>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/usage/{window}", get(usage))
        .route("/api/soup/start", post(soup_start))
        .route("/api/soup/question", post(soup_question))
        .route("/api/soup/solution", post(soup_solution))
        .route("/api/soup/hint", post(soup_hint))
        .route("/api/soup/player", post(soup_player))
        .route("/api/soup/surrender", post(soup_surrender))
        .route("/api/soup/inbound", post(soup_inbound))
        .route("/api/soup/state/{chat}", get(soup_state))
        .route("/api/twentyq/categories", get(riddle_categories))
        .route("/api/twentyq/start", post(riddle_start))
        .route("/api/twentyq/question", post(riddle_question))
        .route("/api/twentyq/guess", post(riddle_guess))
        .route("/api/twentyq/hint", post(riddle_hint))
        .route("/api/twentyq/player", post(riddle_player))
        .route("/api/twentyq/surrender", post(riddle_surrender))
        .route("/api/twentyq/inbound", post(riddle_inbound))
        .route("/api/twentyq/state/{chat}", get(riddle_state))
        .with_state(services)
}
