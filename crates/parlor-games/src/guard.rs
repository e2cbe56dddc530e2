//! Injection guard with a TTL-LRU verdict cache and single-flight checks.
//!
//! Verdicts are keyed by the SHA-256 of the whitespace-normalized input.
//! Concurrent checks for the same key coalesce onto one backend call; the
//! leader runs under a detached timeout so a stalled guard cannot hold a
//! user turn hostage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use parlor_llm::{CallContext, LlmApi, LlmError};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::error::{GameError, GameResult};
use crate::observability::GameEvent;

/// Cache and timeout knobs.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Maximum cached verdicts before LRU eviction.
    pub cache_capacity: usize,
    /// Verdict TTL.
    pub cache_ttl: Duration,
    /// Deadline for one backend check.
    pub check_timeout: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            cache_ttl: Duration::from_secs(300),
            check_timeout: Duration::from_secs(3),
        }
    }
}

struct CacheEntry {
    malicious: bool,
    created_at: Instant,
    last_accessed: Instant,
}

/// Cached, coalescing wrapper over the remote is-malicious check.
pub struct InjectionGuard {
    llm: Arc<dyn LlmApi>,
    config: GuardConfig,
    /// `std::sync::Mutex`: never held across an await point.
    cache: Mutex<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<bool>>>>,
}

/// Collapse runs of whitespace and trim the edges.
pub fn normalize_input(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn cache_key(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

impl InjectionGuard {
    /// Guard with default cache settings.
    pub fn new(llm: Arc<dyn LlmApi>) -> Self {
        Self::with_config(llm, GuardConfig::default())
    }

    /// Guard with explicit cache settings.
    pub fn with_config(llm: Arc<dyn LlmApi>, config: GuardConfig) -> Self {
        Self {
            llm,
            config,
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn cache_lookup(&self, key: &str) -> Option<bool> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let ttl = self.config.cache_ttl;
        cache.retain(|_, entry| now.duration_since(entry.created_at) < ttl);
        let entry = cache.get_mut(key)?;
        entry.last_accessed = now;
        Some(entry.malicious)
    }

    fn cache_store(&self, key: String, malicious: bool) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if cache.len() >= self.config.cache_capacity && !cache.contains_key(&key) {
            // Evict the least-recently-accessed entry.
            if let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest);
            }
        }
        cache.insert(
            key,
            CacheEntry {
                malicious,
                created_at: now,
                last_accessed: now,
            },
        );
    }

    async fn check_backend(&self, ctx: &CallContext, input: &str) -> GameResult<bool> {
        let detached = CallContext {
            request_id: ctx.request_id.clone(),
            deadline: Some(self.config.check_timeout),
        };
        let verdict = tokio::time::timeout(
            self.config.check_timeout,
            self.llm.guard_is_malicious(&detached, input),
        )
        .await
        .map_err(|_| {
            GameError::Llm(LlmError::Timeout {
                call: "GuardIsMalicious",
            })
        })??;
        Ok(verdict)
    }

    /// Whether the input is malicious; cached and coalesced.
    pub async fn is_malicious(&self, ctx: &CallContext, input: &str) -> GameResult<bool> {
        if input.trim().is_empty() {
            // Nothing worth caching; ask directly.
            return self.check_backend(ctx, input).await;
        }

        let normalized = normalize_input(input);
        let key = cache_key(&normalized);

        if let Some(verdict) = self.cache_lookup(&key) {
            tracing::debug!(
                event = GameEvent::GuardCacheHit.as_str(),
                malicious = verdict,
                "guard verdict served from cache"
            );
            return Ok(verdict);
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match in_flight.get(&key) {
                Some(existing) => {
                    tracing::debug!(
                        event = GameEvent::GuardCoalesced.as_str(),
                        "joining in-flight guard check"
                    );
                    Arc::clone(existing)
                }
                None => {
                    let cell = Arc::new(OnceCell::new());
                    in_flight.insert(key.clone(), Arc::clone(&cell));
                    cell
                }
            }
        };

        let result = cell
            .get_or_try_init(|| async {
                let verdict = self.check_backend(ctx, &normalized).await?;
                tracing::debug!(
                    event = GameEvent::GuardChecked.as_str(),
                    malicious = verdict,
                    "guard backend consulted"
                );
                Ok::<bool, GameError>(verdict)
            })
            .await
            .copied();

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            in_flight.remove(&key);
        }

        let verdict = result?;
        self.cache_store(key, verdict);
        Ok(verdict)
    }

    /// Reject empty or malicious input; return the sanitized form otherwise.
    pub async fn validate_or_reject(&self, ctx: &CallContext, input: &str) -> GameResult<String> {
        let normalized = normalize_input(input);
        if normalized.is_empty() {
            return Err(GameError::MalformedInput {
                reason: "input is empty".to_string(),
            });
        }
        if self.is_malicious(ctx, &normalized).await? {
            return Err(GameError::InputInjection);
        }
        Ok(normalized)
    }
}
