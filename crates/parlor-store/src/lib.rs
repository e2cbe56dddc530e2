//! Valkey-backed state layer for the Parlor game bots.
//!
//! Locks, pending queues, cooldowns, and typed session persistence, each as
//! a backend trait with a Valkey implementation (Lua-script atomicity) and
//! an in-process memory implementation with the same observable semantics.

#![allow(missing_docs)]

mod client;
mod error;
mod keys;
mod lock;
mod observability;
mod processing;
mod queue;
mod ratelimit;
mod scripts;
mod session;
mod util;

pub use client::KvClient;
pub use error::{StoreError, StoreResult};
pub use keys::{
    CHAIN_SKIP_TTL_SECS, GUESS_COOLDOWN_SECS, KeySpace, LOCK_TTL_SECS, PROCESSING_TTL_SECS,
    QUEUE_TTL_SECS, SESSION_TTL_SECS, SOUP_KEY_PREFIX, TWENTYQ_KEY_PREFIX, VOTE_TTL_SECS,
};
pub use lock::{
    LockBackend, LockError, LockHandle, LockManager, LockMode, LockScope, MemoryLockBackend,
    ValkeyLockBackend,
};
pub use observability::StoreEvent;
pub use processing::{
    MemoryProcessingBackend, ProcessingBackend, ProcessingGuard, ProcessingLock,
    ValkeyProcessingBackend,
};
pub use queue::{
    DequeueOutcome, EnqueueOutcome, MemoryQueueBackend, PendingQueue, QueueBackend, QueueConfig,
    ValkeyQueueBackend,
};
pub use ratelimit::{
    GuessRateLimiter, MemoryRateLimitBackend, RateLimitBackend, RateLimitDecision,
    ValkeyRateLimitBackend,
};
pub use scripts::{LuaRegistry, LuaScript};
pub use session::{
    JsonSessionStore, MemorySessionKv, SessionKv, SignatureStore, TopicHistory, ValkeySessionKv,
};
pub use util::now_unix_ms;

/// Every Lua script the store layer uses, for registry preload.
pub fn default_scripts() -> Vec<LuaScript> {
    vec![
        lock::WRITE_ACQUIRE_SCRIPT,
        lock::WRITE_RENEW_SCRIPT,
        lock::WRITE_RELEASE_SCRIPT,
        lock::READ_ACQUIRE_SCRIPT,
        lock::READ_RENEW_SCRIPT,
        lock::READ_RELEASE_SCRIPT,
        queue::QUEUE_ENQUEUE_SCRIPT,
        queue::QUEUE_DEQUEUE_SCRIPT,
        ratelimit::GUESS_RATE_LIMIT_SCRIPT,
        processing::PROCESSING_RELEASE_SCRIPT,
    ]
}
