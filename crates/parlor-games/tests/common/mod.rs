#![allow(missing_docs, dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parlor_games::{
    InjectionGuard, PuzzleService, PuzzleServiceConfig, RiddleGameService, SessionManager,
    SoupGameService, SurrenderVoteService,
};
use parlor_llm::test_support::MockLlm;
use parlor_store::{
    GuessRateLimiter, JsonSessionStore, KeySpace, LockManager, MemoryLockBackend,
    MemoryRateLimitBackend, MemorySessionKv, SessionKv, SignatureStore, TopicHistory,
};

pub fn soup_service() -> (SoupGameService, Arc<MockLlm>) {
    soup_service_with_puzzle_config(PuzzleServiceConfig::default())
}

pub fn soup_service_with_puzzle_config(
    puzzle_config: PuzzleServiceConfig,
) -> (SoupGameService, Arc<MockLlm>) {
    let llm = Arc::new(MockLlm::new());
    let kv: Arc<dyn SessionKv> = Arc::new(MemorySessionKv::new());
    let keys = KeySpace::soup();
    let lock = Arc::new(LockManager::new(Arc::new(MemoryLockBackend::new("soup"))));
    let manager = SessionManager::new(
        JsonSessionStore::new(Arc::clone(&kv)),
        lock,
        keys.clone(),
    );
    let signatures = SignatureStore::new(Arc::clone(&kv), &keys);
    let puzzles = PuzzleService::with_config(llm.clone(), signatures, puzzle_config);
    let guard = Arc::new(InjectionGuard::new(llm.clone()));
    let service = SoupGameService::new(manager, puzzles, guard, llm.clone());
    (service, llm)
}

pub fn riddle_service() -> (RiddleGameService, Arc<MockLlm>) {
    riddle_service_with_cooldown(Duration::from_millis(100))
}

pub fn riddle_service_with_cooldown(cooldown: Duration) -> (RiddleGameService, Arc<MockLlm>) {
    let llm = Arc::new(MockLlm::new());
    let kv: Arc<dyn SessionKv> = Arc::new(MemorySessionKv::new());
    let keys = KeySpace::twentyq();
    let lock = Arc::new(LockManager::new(Arc::new(MemoryLockBackend::new("20q"))));
    let manager = SessionManager::new(
        JsonSessionStore::new(Arc::clone(&kv)),
        lock,
        keys.clone(),
    );
    let guard = Arc::new(InjectionGuard::new(llm.clone()));
    let limiter =
        GuessRateLimiter::with_cooldown(Arc::new(MemoryRateLimitBackend::new()), cooldown);
    let topics = TopicHistory::new(Arc::clone(&kv), keys.clone(), 10);
    let service = RiddleGameService::new(manager, guard, llm.clone(), limiter, topics);
    (service, llm)
}

pub fn vote_service() -> SurrenderVoteService {
    let kv: Arc<dyn SessionKv> = Arc::new(MemorySessionKv::new());
    SurrenderVoteService::new(JsonSessionStore::new(kv), KeySpace::soup())
}

pub fn players(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| (*id).to_string()).collect()
}
