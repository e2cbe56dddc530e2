//! Short-TTL processing token: "this chat is currently being worked on".
//!
//! Distinct from the re-entrant game lock; a best-effort NX marker that
//! keeps two workers from draining the same chat's queue at once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::client::KvClient;
use crate::error::StoreResult;
use crate::keys::{KeySpace, PROCESSING_TTL_SECS};
use crate::observability::StoreEvent;
use crate::scripts::{LuaRegistry, LuaScript};

pub(crate) const PROCESSING_RELEASE_SCRIPT: LuaScript = LuaScript {
    name: "processing_release",
    source: r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
  return redis.call("DEL", KEYS[1])
end
return 0
"#,
    read_only: false,
};

/// Store-side processing-token protocol.
#[async_trait]
pub trait ProcessingBackend: Send + Sync {
    /// Try to take the token; true on success.
    async fn try_acquire(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool>;
    /// Drop the token if still owned.
    async fn release(&self, chat: &str, token: &str) -> StoreResult<bool>;
}

/// NX-marker backend against Valkey.
pub struct ValkeyProcessingBackend {
    client: KvClient,
    registry: Arc<LuaRegistry>,
    keys: KeySpace,
}

impl ValkeyProcessingBackend {
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
impl ProcessingBackend for ValkeyProcessingBackend {
    async fn try_acquire(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool> {
        self.client
            .set_nx_px(&self.keys.processing(chat), token, ttl_ms)
            .await
    }

    async fn release(&self, chat: &str, token: &str) -> StoreResult<bool> {
        let key = self.keys.processing(chat);
        let deleted: i64 = self
            .registry
            .exec(
                &self.client,
                PROCESSING_RELEASE_SCRIPT.name,
                &[&key],
                &[token.to_string()],
            )
            .await?;
        Ok(deleted == 1)
    }
}

/// In-process token backend with the same observable semantics.
#[derive(Default)]
pub struct MemoryProcessingBackend {
    tokens: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryProcessingBackend {
    /// Empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessingBackend for MemoryProcessingBackend {
    async fn try_acquire(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool> {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if let Some((_, expires)) = tokens.get(chat) {
            if *expires > now {
                return Ok(false);
            }
        }
        tokens.insert(
            chat.to_string(),
            (token.to_string(), now + Duration::from_millis(ttl_ms)),
        );
        Ok(true)
    }

    async fn release(&self, chat: &str, token: &str) -> StoreResult<bool> {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        match tokens.get(chat) {
            Some((owner, _)) if owner == token => {
                tokens.remove(chat);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Owned processing token; releases on [`ProcessingGuard::release`] or drop.
pub struct ProcessingGuard {
    backend: Arc<dyn ProcessingBackend>,
    chat: String,
    token: Option<String>,
}

impl ProcessingGuard {
    /// Release the token explicitly.
    pub async fn release(mut self) -> StoreResult<bool> {
        let Some(token) = self.token.take() else {
            return Ok(false);
        };
        let released = self.backend.release(&self.chat, &token).await?;
        tracing::debug!(
            event = StoreEvent::ProcessingReleased.as_str(),
            chat = %self.chat,
            released,
            "processing token released"
        );
        Ok(released)
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        let chat = self.chat.clone();
        handle.spawn(async move {
            match backend.release(&chat, &token).await {
                Ok(released) => {
                    tracing::debug!(
                        event = StoreEvent::ProcessingReleased.as_str(),
                        chat = %chat,
                        released,
                        "processing token release attempted"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        event = StoreEvent::ProcessingReleased.as_str(),
                        chat = %chat,
                        error = %error,
                        "processing token release failed"
                    );
                }
            }
        });
    }
}

/// Single-flight processing marker for queue workers.
pub struct ProcessingLock {
    backend: Arc<dyn ProcessingBackend>,
    ttl: Duration,
}

impl ProcessingLock {
    /// Lock with the default processing TTL.
    pub fn new(backend: Arc<dyn ProcessingBackend>) -> Self {
        Self::with_ttl(backend, Duration::from_secs(PROCESSING_TTL_SECS))
    }

    /// Lock with an explicit TTL.
    pub fn with_ttl(backend: Arc<dyn ProcessingBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// Try to take the chat's processing token.
    ///
    /// `None` means another worker already holds it.
    pub async fn try_acquire(&self, chat: &str) -> StoreResult<Option<ProcessingGuard>> {
        let token = format!("{:016x}{:016x}", rand::random::<u64>(), rand::random::<u64>());
        let acquired = self
            .backend
            .try_acquire(chat, &token, self.ttl.as_millis() as u64)
            .await?;
        if !acquired {
            return Ok(None);
        }
        tracing::debug!(
            event = StoreEvent::ProcessingAcquired.as_str(),
            chat = %chat,
            ttl_ms = self.ttl.as_millis() as u64,
            "processing token acquired"
        );
        Ok(Some(ProcessingGuard {
            backend: Arc::clone(&self.backend),
            chat: chat.to_string(),
            token: Some(token),
        }))
    }
}
