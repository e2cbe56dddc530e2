//! Re-entrant exclusive/shared chat locks over the store.
//!
//! One write excludes all reads and writes; reads may coexist. Re-entry is
//! tracked in an explicit [`LockScope`] carried with the request: nested
//! acquires of a held key bump a counter without touching the store, and the
//! store-level release happens when the last [`LockHandle`] drops. A
//! watchdog task renews the TTL at ttl/3 until the handle is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::client::KvClient;
use crate::error::{StoreError, StoreResult};
use crate::keys::{KeySpace, LOCK_TTL_SECS};
use crate::observability::StoreEvent;
use crate::scripts::{LuaRegistry, LuaScript};

const ACQUIRE_MAX_ATTEMPTS: u32 = 3;
const ACQUIRE_INITIAL_BACKOFF_MS: u64 = 50;
const ACQUIRE_BACKOFF_CAP_MS: u64 = 500;
const RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) const WRITE_ACQUIRE_SCRIPT: LuaScript = LuaScript {
    name: "lock_write_acquire",
    source: r#"
if redis.call("EXISTS", KEYS[1]) == 0 and redis.call("EXISTS", KEYS[2]) == 0 then
  redis.call("SET", KEYS[1], ARGV[1], "PX", ARGV[2])
  return 1
end
return 0
"#,
    read_only: false,
};

pub(crate) const WRITE_RENEW_SCRIPT: LuaScript = LuaScript {
    name: "lock_write_renew",
    source: r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
  return redis.call("PEXPIRE", KEYS[1], ARGV[2])
end
return 0
"#,
    read_only: false,
};

pub(crate) const WRITE_RELEASE_SCRIPT: LuaScript = LuaScript {
    name: "lock_write_release",
    source: r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
  return redis.call("DEL", KEYS[1])
end
return 0
"#,
    read_only: false,
};

pub(crate) const READ_ACQUIRE_SCRIPT: LuaScript = LuaScript {
    name: "lock_read_acquire",
    source: r#"
if redis.call("EXISTS", KEYS[1]) == 1 then
  return 0
end
redis.call("SADD", KEYS[2], ARGV[1])
redis.call("PEXPIRE", KEYS[2], ARGV[2])
return 1
"#,
    read_only: false,
};

pub(crate) const READ_RENEW_SCRIPT: LuaScript = LuaScript {
    name: "lock_read_renew",
    source: r#"
if redis.call("SISMEMBER", KEYS[2], ARGV[1]) == 1 then
  return redis.call("PEXPIRE", KEYS[2], ARGV[2])
end
return 0
"#,
    read_only: false,
};

pub(crate) const READ_RELEASE_SCRIPT: LuaScript = LuaScript {
    name: "lock_read_release",
    source: r#"
redis.call("SREM", KEYS[2], ARGV[1])
if redis.call("SCARD", KEYS[2]) == 0 then
  redis.call("DEL", KEYS[2])
  return 1
end
redis.call("PEXPIRE", KEYS[2], ARGV[2])
return 1
"#,
    read_only: false,
};

/// Lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Exclusive access; excludes readers and writers.
    Write,
    /// Shared access; excludes writers only.
    Read,
}

impl LockMode {
    /// Lowercase label for logs and errors.
    pub const fn as_str(self) -> &'static str {
        match self {
            LockMode::Write => "write",
            LockMode::Read => "read",
        }
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from lock acquisition and release.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The acquire retry budget ran out while the lock stayed contended.
    #[error("failed to acquire {mode} lock for chat {chat} after {attempts} attempts")]
    AcquireExhausted {
        /// Contended chat id.
        chat: String,
        /// Requested mode.
        mode: LockMode,
        /// Attempts made.
        attempts: u32,
    },

    /// A write acquire was requested inside a scope holding the read lock.
    #[error("write lock requested while read lock held")]
    WriteWhileReadHeld,

    /// The store rejected a lock operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Store-side lock protocol.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Namespace label; keeps scope entries of different key spaces apart.
    fn namespace(&self) -> &str;

    /// Try to take the write lock; true on success.
    async fn try_acquire_write(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool>;
    /// Extend the write lock if `token` still owns it.
    async fn renew_write(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool>;
    /// Drop the write lock if `token` still owns it.
    async fn release_write(&self, chat: &str, token: &str) -> StoreResult<bool>;

    /// Try to join the read-lock set; true on success.
    async fn try_acquire_read(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool>;
    /// Extend the read lock if `token` is still a member.
    async fn renew_read(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool>;
    /// Leave the read-lock set.
    async fn release_read(&self, chat: &str, token: &str) -> StoreResult<bool>;
}

/// Lua-script lock protocol against Valkey.
pub struct ValkeyLockBackend {
    client: KvClient,
    registry: Arc<LuaRegistry>,
    keys: KeySpace,
}

impl ValkeyLockBackend {
    /// Backend over the given client, registry, and key space.
    pub fn new(client: KvClient, registry: Arc<LuaRegistry>, keys: KeySpace) -> Self {
        Self {
            client,
            registry,
            keys,
        }
    }

    async fn exec_lock_script(
        &self,
        name: &'static str,
        chat: &str,
        args: &[String],
    ) -> StoreResult<bool> {
        let write_key = self.keys.lock(chat);
        let read_key = self.keys.lock_read(chat);
        let result: i64 = self
            .registry
            .exec(&self.client, name, &[&write_key, &read_key], args)
            .await?;
        Ok(result == 1)
    }
}

#[async_trait]
impl LockBackend for ValkeyLockBackend {
    fn namespace(&self) -> &str {
        self.keys.prefix()
    }

    async fn try_acquire_write(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool> {
        self.exec_lock_script(
            WRITE_ACQUIRE_SCRIPT.name,
            chat,
            &[token.to_string(), ttl_ms.to_string()],
        )
        .await
    }

    async fn renew_write(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool> {
        self.exec_lock_script(
            WRITE_RENEW_SCRIPT.name,
            chat,
            &[token.to_string(), ttl_ms.to_string()],
        )
        .await
    }

    async fn release_write(&self, chat: &str, token: &str) -> StoreResult<bool> {
        self.exec_lock_script(WRITE_RELEASE_SCRIPT.name, chat, &[token.to_string()])
            .await
    }

    async fn try_acquire_read(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool> {
        self.exec_lock_script(
            READ_ACQUIRE_SCRIPT.name,
            chat,
            &[token.to_string(), ttl_ms.to_string()],
        )
        .await
    }

    async fn renew_read(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool> {
        self.exec_lock_script(
            READ_RENEW_SCRIPT.name,
            chat,
            &[token.to_string(), ttl_ms.to_string()],
        )
        .await
    }

    async fn release_read(&self, chat: &str, token: &str) -> StoreResult<bool> {
        self.exec_lock_script(
            READ_RELEASE_SCRIPT.name,
            chat,
            &[token.to_string(), LOCK_TTL_SECS.saturating_mul(1000).to_string()],
        )
        .await
    }
}

#[derive(Default)]
struct MemoryLockCell {
    write: Option<(String, Instant)>,
    readers: HashMap<String, Instant>,
}

impl MemoryLockCell {
    fn purge(&mut self, now: Instant) {
        if let Some((_, expires)) = &self.write {
            if *expires <= now {
                self.write = None;
            }
        }
        self.readers.retain(|_, expires| *expires > now);
    }
}

/// In-process lock backend with the same observable semantics.
///
/// Single process only; the test vehicle for lock-dependent services.
#[derive(Default)]
pub struct MemoryLockBackend {
    namespace: String,
    cells: Mutex<HashMap<String, MemoryLockCell>>,
}

impl MemoryLockBackend {
    /// Backend under the given namespace label.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn with_cell<T>(&self, chat: &str, f: impl FnOnce(&mut MemoryLockCell, Instant) -> T) -> T {
        let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        let cell = cells.entry(chat.to_string()).or_default();
        let now = Instant::now();
        cell.purge(now);
        f(cell, now)
    }
}

#[async_trait]
impl LockBackend for MemoryLockBackend {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn try_acquire_write(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool> {
        Ok(self.with_cell(chat, |cell, now| {
            if cell.write.is_some() || !cell.readers.is_empty() {
                return false;
            }
            cell.write = Some((token.to_string(), now + Duration::from_millis(ttl_ms)));
            true
        }))
    }

    async fn renew_write(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool> {
        Ok(self.with_cell(chat, |cell, now| match &mut cell.write {
            Some((owner, expires)) if owner == token => {
                *expires = now + Duration::from_millis(ttl_ms);
                true
            }
            _ => false,
        }))
    }

    async fn release_write(&self, chat: &str, token: &str) -> StoreResult<bool> {
        Ok(self.with_cell(chat, |cell, _| match &cell.write {
            Some((owner, _)) if owner == token => {
                cell.write = None;
                true
            }
            _ => false,
        }))
    }

    async fn try_acquire_read(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool> {
        Ok(self.with_cell(chat, |cell, now| {
            if cell.write.is_some() {
                return false;
            }
            cell.readers
                .insert(token.to_string(), now + Duration::from_millis(ttl_ms));
            true
        }))
    }

    async fn renew_read(&self, chat: &str, token: &str, ttl_ms: u64) -> StoreResult<bool> {
        Ok(self.with_cell(chat, |cell, now| {
            match cell.readers.get_mut(token) {
                Some(expires) => {
                    *expires = now + Duration::from_millis(ttl_ms);
                    true
                }
                None => false,
            }
        }))
    }

    async fn release_read(&self, chat: &str, token: &str) -> StoreResult<bool> {
        Ok(self.with_cell(chat, |cell, _| cell.readers.remove(token).is_some()))
    }
}

struct ScopeEntry {
    mode: LockMode,
    count: u32,
    token: String,
    stop_tx: Option<oneshot::Sender<()>>,
}

/// Per-request lock map enabling re-entrant acquires.
///
/// Clone-cheap; every clone shares the same map. A fresh scope is created at
/// the edge of each inbound turn and threaded through the call chain.
#[derive(Clone, Default)]
pub struct LockScope {
    inner: Arc<Mutex<HashMap<String, ScopeEntry>>>,
}

impl LockScope {
    /// Empty scope for a new request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mode currently held for `key`, if any.
    fn held_mode(&self, key: &str) -> Option<LockMode> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(key).map(|entry| entry.mode)
    }
}

/// Scoped ownership of one chat lock.
///
/// Dropping the handle decrements the scope counter; the store-level release
/// runs when the count reaches zero, on a detached task with a bounded
/// timeout so caller cancellation cannot leak the lock.
pub struct LockHandle {
    scope: LockScope,
    scope_key: String,
    chat: String,
    backend: Arc<dyn LockBackend>,
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        let (token, mode, stop_tx) = {
            let mut map = self.scope.inner.lock().unwrap_or_else(|e| e.into_inner());
            let Some(entry) = map.get_mut(&self.scope_key) else {
                return;
            };
            entry.count = entry.count.saturating_sub(1);
            if entry.count > 0 {
                return;
            }
            let Some(mut entry) = map.remove(&self.scope_key) else {
                return;
            };
            (entry.token.clone(), entry.mode, entry.stop_tx.take())
        };
        if let Some(stop) = stop_tx {
            let _ = stop.send(());
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        let chat = self.chat.clone();
        handle.spawn(async move {
            let release = async {
                match mode {
                    LockMode::Write => backend.release_write(&chat, &token).await,
                    LockMode::Read => backend.release_read(&chat, &token).await,
                }
            };
            match tokio::time::timeout(RELEASE_TIMEOUT, release).await {
                Ok(Ok(released)) => {
                    tracing::debug!(
                        event = StoreEvent::LockReleased.as_str(),
                        chat = %chat,
                        mode = mode.as_str(),
                        released,
                        "chat lock release attempted"
                    );
                }
                Ok(Err(error)) => {
                    tracing::warn!(
                        event = StoreEvent::LockReleased.as_str(),
                        chat = %chat,
                        mode = mode.as_str(),
                        error = %error,
                        "chat lock release failed"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        event = StoreEvent::LockReleased.as_str(),
                        chat = %chat,
                        mode = mode.as_str(),
                        timeout_ms = RELEASE_TIMEOUT.as_millis() as u64,
                        "chat lock release timed out; ttl will reclaim it"
                    );
                }
            }
        });
    }
}

/// Re-entrant lock manager for one game family.
pub struct LockManager {
    backend: Arc<dyn LockBackend>,
    ttl_ms: u64,
}

impl LockManager {
    /// Manager with the default lock TTL.
    pub fn new(backend: Arc<dyn LockBackend>) -> Self {
        Self::with_ttl(backend, Duration::from_secs(LOCK_TTL_SECS))
    }

    /// Manager with an explicit lock TTL.
    pub fn with_ttl(backend: Arc<dyn LockBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl_ms: ttl.as_millis().max(1) as u64,
        }
    }

    /// Acquire the exclusive lock for `chat` within `scope`.
    ///
    /// `holder` is a diagnostic label (typically the game owner's user id).
    pub async fn acquire_write(
        &self,
        scope: &LockScope,
        chat: &str,
        holder: Option<&str>,
    ) -> Result<LockHandle, LockError> {
        self.acquire(scope, chat, LockMode::Write, holder).await
    }

    /// Acquire the shared lock for `chat` within `scope`.
    pub async fn acquire_read(
        &self,
        scope: &LockScope,
        chat: &str,
        holder: Option<&str>,
    ) -> Result<LockHandle, LockError> {
        self.acquire(scope, chat, LockMode::Read, holder).await
    }

    async fn acquire(
        &self,
        scope: &LockScope,
        chat: &str,
        mode: LockMode,
        holder: Option<&str>,
    ) -> Result<LockHandle, LockError> {
        let scope_key = format!("{}:{chat}", self.backend.namespace());

        if let Some(held) = scope.held_mode(&scope_key) {
            match (held, mode) {
                // Write dominates: nested write or read re-enters it.
                (LockMode::Write, _) | (LockMode::Read, LockMode::Read) => {
                    let mut map = scope.inner.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(entry) = map.get_mut(&scope_key) {
                        entry.count += 1;
                        tracing::debug!(
                            event = StoreEvent::LockReentered.as_str(),
                            chat = %chat,
                            held = held.as_str(),
                            requested = mode.as_str(),
                            depth = entry.count,
                            "lock re-entered without store acquire"
                        );
                        return Ok(LockHandle {
                            scope: scope.clone(),
                            scope_key,
                            chat: chat.to_string(),
                            backend: Arc::clone(&self.backend),
                        });
                    }
                }
                (LockMode::Read, LockMode::Write) => {
                    return Err(LockError::WriteWhileReadHeld);
                }
            }
        }

        let token = new_token();
        let mut backoff = Duration::from_millis(ACQUIRE_INITIAL_BACKOFF_MS);
        let mut acquired = false;
        for attempt in 0..ACQUIRE_MAX_ATTEMPTS {
            let ok = match mode {
                LockMode::Write => {
                    self.backend
                        .try_acquire_write(chat, &token, self.ttl_ms)
                        .await?
                }
                LockMode::Read => {
                    self.backend
                        .try_acquire_read(chat, &token, self.ttl_ms)
                        .await?
                }
            };
            if ok {
                acquired = true;
                break;
            }
            if attempt + 1 < ACQUIRE_MAX_ATTEMPTS {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_millis(ACQUIRE_BACKOFF_CAP_MS));
            }
        }
        if !acquired {
            tracing::warn!(
                event = StoreEvent::LockAcquireExhausted.as_str(),
                chat = %chat,
                mode = mode.as_str(),
                attempts = ACQUIRE_MAX_ATTEMPTS,
                "lock acquire exhausted its retry budget"
            );
            return Err(LockError::AcquireExhausted {
                chat: chat.to_string(),
                mode,
                attempts: ACQUIRE_MAX_ATTEMPTS,
            });
        }

        tracing::debug!(
            event = StoreEvent::LockAcquired.as_str(),
            chat = %chat,
            mode = mode.as_str(),
            holder = holder.unwrap_or(""),
            ttl_ms = self.ttl_ms,
            "chat lock acquired"
        );

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        spawn_watchdog(
            Arc::clone(&self.backend),
            chat.to_string(),
            token.clone(),
            mode,
            self.ttl_ms,
            stop_rx,
        );

        {
            let mut map = scope.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.insert(
                scope_key.clone(),
                ScopeEntry {
                    mode,
                    count: 1,
                    token,
                    stop_tx: Some(stop_tx),
                },
            );
        }

        Ok(LockHandle {
            scope: scope.clone(),
            scope_key,
            chat: chat.to_string(),
            backend: Arc::clone(&self.backend),
        })
    }
}

fn spawn_watchdog(
    backend: Arc<dyn LockBackend>,
    chat: String,
    token: String,
    mode: LockMode,
    ttl_ms: u64,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let renew_interval_ms = (ttl_ms / 3).max(1000);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(renew_interval_ms));
        // The first tick completes immediately; an early renew is harmless.
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    let renewed = match mode {
                        LockMode::Write => backend.renew_write(&chat, &token, ttl_ms).await,
                        LockMode::Read => backend.renew_read(&chat, &token, ttl_ms).await,
                    };
                    match renewed {
                        Ok(true) => {
                            tracing::debug!(
                                event = StoreEvent::LockRenewed.as_str(),
                                chat = %chat,
                                mode = mode.as_str(),
                                renew_interval_ms,
                                "chat lock renewed"
                            );
                        }
                        Ok(false) => {
                            tracing::warn!(
                                event = StoreEvent::LockRenewalFailed.as_str(),
                                chat = %chat,
                                mode = mode.as_str(),
                                "chat lock lost before renewal; watchdog stopping"
                            );
                            break;
                        }
                        Err(error) => {
                            tracing::warn!(
                                event = StoreEvent::LockRenewalFailed.as_str(),
                                chat = %chat,
                                mode = mode.as_str(),
                                error = %error,
                                "chat lock renewal failed; watchdog stopping"
                            );
                            break;
                        }
                    }
                }
            }
        }
    });
}

fn new_token() -> String {
    format!("{:016x}{:016x}", rand::random::<u64>(), rand::random::<u64>())
}
