//! Service graph assembly.
//!
//! One [`FamilyBackends`] bundle per game family, either Valkey-backed for
//! production or in-memory for tests; [`build_services`] wires the game
//! services, vote services, and turn workers on top.

use std::sync::Arc;

use anyhow::{Context, Result};
use parlor_games::{
    GameResult, InjectionGuard, PendingMessage, PuzzleService, RiddleGameService, SessionManager,
    SoupGameService, SurrenderVoteService, TurnHandler, TurnWorker,
};
use parlor_llm::{CallContext, GrpcLlmClient, LlmApi, LlmClientConfig};
use parlor_store::{
    GuessRateLimiter, JsonSessionStore, KeySpace, KvClient, LockBackend, LockManager, LockScope,
    LuaRegistry, MemoryLockBackend, MemoryProcessingBackend, MemoryQueueBackend,
    MemoryRateLimitBackend, MemorySessionKv, PendingQueue, ProcessingBackend, ProcessingLock,
    QueueBackend, RateLimitBackend, SessionKv, SignatureStore, TopicHistory, ValkeyLockBackend,
    ValkeyProcessingBackend, ValkeyQueueBackend, ValkeyRateLimitBackend, ValkeySessionKv,
};

use crate::config::BotConfig;

/// Most-recent topics banned from re-selection.
const TOPIC_HISTORY_LIMIT: usize = 10;

/// Store backends for one game family.
pub struct FamilyBackends {
    /// Key space of the family.
    pub keys: KeySpace,
    /// Non-scripted session surface.
    pub session_kv: Arc<dyn SessionKv>,
    /// Lock protocol.
    pub lock: Arc<dyn LockBackend>,
    /// Pending-queue protocol.
    pub queue: Arc<dyn QueueBackend>,
    /// Processing-token protocol.
    pub processing: Arc<dyn ProcessingBackend>,
    /// Guess-cooldown protocol.
    pub ratelimit: Arc<dyn RateLimitBackend>,
}

impl FamilyBackends {
    /// Valkey-backed bundle sharing one client and script registry.
    pub fn valkey(client: &KvClient, registry: &Arc<LuaRegistry>, keys: KeySpace) -> Self {
        Self {
            session_kv: Arc::new(ValkeySessionKv::new(client.clone())),
            lock: Arc::new(ValkeyLockBackend::new(
                client.clone(),
                Arc::clone(registry),
                keys.clone(),
            )),
            queue: Arc::new(ValkeyQueueBackend::new(
                client.clone(),
                Arc::clone(registry),
                keys.clone(),
            )),
            processing: Arc::new(ValkeyProcessingBackend::new(
                client.clone(),
                Arc::clone(registry),
                keys.clone(),
            )),
            ratelimit: Arc::new(ValkeyRateLimitBackend::new(
                client.clone(),
                Arc::clone(registry),
                keys.clone(),
            )),
            keys,
        }
    }

    /// In-process bundle for tests.
    pub fn memory(keys: KeySpace) -> Self {
        Self {
            session_kv: Arc::new(MemorySessionKv::new()),
            lock: Arc::new(MemoryLockBackend::new(keys.prefix().to_string())),
            queue: Arc::new(MemoryQueueBackend::new()),
            processing: Arc::new(MemoryProcessingBackend::new()),
            ratelimit: Arc::new(MemoryRateLimitBackend::new()),
            keys,
        }
    }
}

/// Everything the HTTP surface needs.
pub struct Services {
    /// Soup game operations.
    pub soup: Arc<SoupGameService>,
    /// Riddle game operations.
    pub riddle: Arc<RiddleGameService>,
    /// Soup surrender votes.
    pub soup_votes: Arc<SurrenderVoteService>,
    /// Riddle surrender votes.
    pub riddle_votes: Arc<SurrenderVoteService>,
    /// Soup inbound-turn worker.
    pub soup_worker: Arc<TurnWorker>,
    /// Riddle inbound-turn worker.
    pub riddle_worker: Arc<TurnWorker>,
    /// Shared LLM surface (usage passthrough).
    pub llm: Arc<dyn LlmApi>,
}

struct SoupTurnHandler {
    service: Arc<SoupGameService>,
    queue: Arc<PendingQueue>,
}

#[async_trait::async_trait]
impl TurnHandler for SoupTurnHandler {
    async fn handle_turn(
        &self,
        chat: &str,
        message: PendingMessage,
    ) -> GameResult<Option<String>> {
        let ctx = CallContext::new();
        let scope = LockScope::new();
        if message.is_chain_batch {
            let mut replies = Vec::new();
            for question in &message.batch_questions {
                if self.queue.check_and_clear_chain_skip_flag(chat).await? {
                    break;
                }
                let outcome = self
                    .service
                    .ask_question(&scope, &ctx, chat, question)
                    .await?;
                replies.push(outcome.answer);
            }
            return Ok(Some(replies.join("\n")));
        }
        let outcome = self
            .service
            .ask_question(&scope, &ctx, chat, &message.content)
            .await?;
        Ok(Some(outcome.answer))
    }
}

struct RiddleTurnHandler {
    service: Arc<RiddleGameService>,
    queue: Arc<PendingQueue>,
}

#[async_trait::async_trait]
impl TurnHandler for RiddleTurnHandler {
    async fn handle_turn(
        &self,
        chat: &str,
        message: PendingMessage,
    ) -> GameResult<Option<String>> {
        let ctx = CallContext::new();
        let scope = LockScope::new();
        if message.is_chain_batch {
            let mut replies = Vec::new();
            for question in &message.batch_questions {
                if self.queue.check_and_clear_chain_skip_flag(chat).await? {
                    break;
                }
                let outcome = self
                    .service
                    .ask_question(&scope, &ctx, chat, question)
                    .await?;
                replies.push(outcome.answer);
            }
            return Ok(Some(replies.join("\n")));
        }
        let outcome = self
            .service
            .ask_question(&scope, &ctx, chat, &message.content)
            .await?;
        Ok(Some(outcome.answer))
    }
}

/// Wire the full service graph over the given backends.
pub fn build_services(
    llm: Arc<dyn LlmApi>,
    soup_backends: FamilyBackends,
    riddle_backends: FamilyBackends,
) -> Services {
    // Soup family.
    let soup_lock = Arc::new(LockManager::new(Arc::clone(&soup_backends.lock)));
    let soup_manager = SessionManager::new(
        JsonSessionStore::new(Arc::clone(&soup_backends.session_kv)),
        soup_lock,
        soup_backends.keys.clone(),
    );
    let soup_guard = Arc::new(InjectionGuard::new(Arc::clone(&llm)));
    let soup_signatures = SignatureStore::new(
        Arc::clone(&soup_backends.session_kv),
        &soup_backends.keys,
    );
    let soup_puzzles = PuzzleService::new(Arc::clone(&llm), soup_signatures);
    let soup = Arc::new(SoupGameService::new(
        soup_manager,
        soup_puzzles,
        soup_guard,
        Arc::clone(&llm),
    ));
    let soup_votes = Arc::new(SurrenderVoteService::new(
        JsonSessionStore::new(Arc::clone(&soup_backends.session_kv)),
        soup_backends.keys.clone(),
    ));
    let soup_queue = Arc::new(PendingQueue::new(Arc::clone(&soup_backends.queue)));
    let soup_worker = Arc::new(TurnWorker::new(
        Arc::clone(&soup_queue),
        Arc::new(ProcessingLock::new(Arc::clone(&soup_backends.processing))),
        Arc::new(SoupTurnHandler {
            service: Arc::clone(&soup),
            queue: soup_queue,
        }),
    ));

    // Riddle family.
    let riddle_lock = Arc::new(LockManager::new(Arc::clone(&riddle_backends.lock)));
    let riddle_manager = SessionManager::new(
        JsonSessionStore::new(Arc::clone(&riddle_backends.session_kv)),
        riddle_lock,
        riddle_backends.keys.clone(),
    );
    let riddle_guard = Arc::new(InjectionGuard::new(Arc::clone(&llm)));
    let riddle_limiter = GuessRateLimiter::new(Arc::clone(&riddle_backends.ratelimit));
    let riddle_topics = TopicHistory::new(
        Arc::clone(&riddle_backends.session_kv),
        riddle_backends.keys.clone(),
        TOPIC_HISTORY_LIMIT,
    );
    let riddle = Arc::new(RiddleGameService::new(
        riddle_manager,
        riddle_guard,
        Arc::clone(&llm),
        riddle_limiter,
        riddle_topics,
    ));
    let riddle_votes = Arc::new(SurrenderVoteService::new(
        JsonSessionStore::new(Arc::clone(&riddle_backends.session_kv)),
        riddle_backends.keys.clone(),
    ));
    let riddle_queue = Arc::new(PendingQueue::new(Arc::clone(&riddle_backends.queue)));
    let riddle_worker = Arc::new(TurnWorker::new(
        Arc::clone(&riddle_queue),
        Arc::new(ProcessingLock::new(Arc::clone(
            &riddle_backends.processing,
        ))),
        Arc::new(RiddleTurnHandler {
            service: Arc::clone(&riddle),
            queue: riddle_queue,
        }),
    ));

    Services {
        soup,
        riddle,
        soup_votes,
        riddle_votes,
        soup_worker,
        riddle_worker,
        llm,
    }
}

/// Production wiring: Valkey store, preloaded scripts, gRPC LLM client.
pub async fn build_valkey_services(config: &BotConfig) -> Result<Services> {
    let client = KvClient::open(&config.store_url)
        .with_context(|| format!("invalid store url {}", config.store_url))?;
    let registry = Arc::new(LuaRegistry::with_default_scripts());
    registry
        .preload(&client)
        .await
        .context("lua script preload failed")?;

    let mut llm_config = LlmClientConfig::new(config.llm_url.clone());
    llm_config.api_key = config.llm_api_key.clone();
    let llm: Arc<dyn LlmApi> = Arc::new(
        GrpcLlmClient::connect_lazy(llm_config).context("llm client construction failed")?,
    );

    let soup = FamilyBackends::valkey(&client, &registry, KeySpace::soup());
    let riddle = FamilyBackends::valkey(&client, &registry, KeySpace::twentyq());
    Ok(build_services(llm, soup, riddle))
}
