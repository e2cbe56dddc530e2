//! Per-(chat, user) guess cooldown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::client::KvClient;
use crate::error::StoreResult;
use crate::keys::{GUESS_COOLDOWN_SECS, KeySpace};
use crate::observability::StoreEvent;
use crate::scripts::{LuaRegistry, LuaScript};

pub(crate) const GUESS_RATE_LIMIT_SCRIPT: LuaScript = LuaScript {
    name: "guess_rate_limit",
    source: r#"
local ok = redis.call("SET", KEYS[1], "1", "NX", "PX", tonumber(ARGV[1]))
if ok then
  return {1, 0}
end
local ttl = redis.call("PTTL", KEYS[1])
if ttl < 0 then
  ttl = 0
end
return {0, ttl}
"#,
    read_only: false,
};

/// Verdict of one cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// True when the attempt may proceed.
    pub allowed: bool,
    /// Remaining cooldown in milliseconds when rejected.
    pub remaining_ms: u64,
}

impl RateLimitDecision {
    /// Remaining cooldown rounded up to whole seconds.
    pub fn remaining_secs(&self) -> u64 {
        self.remaining_ms.div_ceil(1000)
    }
}

/// Store-side cooldown protocol.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Record an attempt; the first within the window is allowed.
    async fn check(
        &self,
        chat: &str,
        user: &str,
        cooldown_ms: u64,
    ) -> StoreResult<RateLimitDecision>;
}

/// Lua-backed cooldown against Valkey.
pub struct ValkeyRateLimitBackend {
    client: KvClient,
    registry: Arc<LuaRegistry>,
    keys: KeySpace,
}

impl ValkeyRateLimitBackend {
    /// Backend over the given client, registry, and key space.
    pub fn new(client: KvClient, registry: Arc<LuaRegistry>, keys: KeySpace) -> Self {
        Self {
            client,
            registry,
            keys,
        }
    }
}

#[async_trait]
impl RateLimitBackend for ValkeyRateLimitBackend {
    async fn check(
        &self,
        chat: &str,
        user: &str,
        cooldown_ms: u64,
    ) -> StoreResult<RateLimitDecision> {
        let key = self.keys.guess_cooldown(chat, user);
        let (allowed, remaining_ms): (i64, i64) = self
            .registry
            .exec(
                &self.client,
                GUESS_RATE_LIMIT_SCRIPT.name,
                &[&key],
                &[cooldown_ms.to_string()],
            )
            .await?;
        Ok(RateLimitDecision {
            allowed: allowed == 1,
            remaining_ms: remaining_ms.max(0) as u64,
        })
    }
}

/// In-process cooldown with the same observable semantics.
#[derive(Default)]
pub struct MemoryRateLimitBackend {
    entries: Mutex<HashMap<(String, String), Instant>>,
}

impl MemoryRateLimitBackend {
    /// Empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitBackend for MemoryRateLimitBackend {
    async fn check(
        &self,
        chat: &str,
        user: &str,
        cooldown_ms: u64,
    ) -> StoreResult<RateLimitDecision> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let key = (chat.to_string(), user.to_string());
        if let Some(expires) = entries.get(&key) {
            if *expires > now {
                let remaining = expires.duration_since(now);
                return Ok(RateLimitDecision {
                    allowed: false,
                    remaining_ms: remaining.as_millis() as u64,
                });
            }
        }
        entries.insert(key, now + Duration::from_millis(cooldown_ms));
        Ok(RateLimitDecision {
            allowed: true,
            remaining_ms: 0,
        })
    }
}

/// Guess-attempt cooldown for one game family.
pub struct GuessRateLimiter {
    backend: Arc<dyn RateLimitBackend>,
    cooldown: Duration,
}

impl GuessRateLimiter {
    /// Limiter with the default cooldown.
    pub fn new(backend: Arc<dyn RateLimitBackend>) -> Self {
        Self::with_cooldown(backend, Duration::from_secs(GUESS_COOLDOWN_SECS))
    }

    /// Limiter with an explicit cooldown.
    pub fn with_cooldown(backend: Arc<dyn RateLimitBackend>, cooldown: Duration) -> Self {
        Self { backend, cooldown }
    }

    /// Check and record one guess attempt.
    pub async fn check(&self, chat: &str, user: &str) -> StoreResult<RateLimitDecision> {
        let decision = self
            .backend
            .check(chat, user, self.cooldown.as_millis() as u64)
            .await?;
        if decision.allowed {
            tracing::debug!(
                event = StoreEvent::RateLimitAllowed.as_str(),
                chat = %chat,
                user = %user,
                "guess attempt allowed"
            );
        } else {
            tracing::debug!(
                event = StoreEvent::RateLimitHit.as_str(),
                chat = %chat,
                user = %user,
                remaining_ms = decision.remaining_ms,
                "guess attempt rejected by cooldown"
            );
        }
        Ok(decision)
    }
}
