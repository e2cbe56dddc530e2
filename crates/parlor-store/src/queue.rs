//! Bounded per-chat FIFO of pending user turns.
//!
//! Two keys per chat: a hash `data:{chat}` mapping user id to the JSON
//! message and a list `order:{chat}` of user ids. Each operation is one Lua
//! script so the hash and list move together. Payloads must carry a
//! `timestamp_ms` field; dequeue drops entries older than the stale
//! threshold.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::client::KvClient;
use crate::error::{StoreError, StoreResult};
use crate::keys::{CHAIN_SKIP_TTL_SECS, KeySpace, QUEUE_TTL_SECS};
use crate::observability::StoreEvent;
use crate::scripts::{LuaRegistry, LuaScript};
use crate::util::now_unix_ms;

pub(crate) const QUEUE_ENQUEUE_SCRIPT: LuaScript = LuaScript {
    name: "queue_enqueue",
    source: r#"
local data_key = KEYS[1]
local order_key = KEYS[2]
local user_id = ARGV[1]
local payload = ARGV[2]
local max_size = tonumber(ARGV[3])
local ttl_secs = tonumber(ARGV[4])
local replace = tonumber(ARGV[5])

if redis.call("LLEN", order_key) >= max_size then
  return "full"
end
if redis.call("HEXISTS", data_key, user_id) == 1 then
  if replace == 0 then
    return "duplicate"
  end
  redis.call("HSET", data_key, user_id, payload)
  redis.call("LREM", order_key, 0, user_id)
  redis.call("RPUSH", order_key, user_id)
  redis.call("EXPIRE", data_key, ttl_secs)
  redis.call("EXPIRE", order_key, ttl_secs)
  return "replaced"
end
redis.call("HSET", data_key, user_id, payload)
redis.call("RPUSH", order_key, user_id)
redis.call("EXPIRE", data_key, ttl_secs)
redis.call("EXPIRE", order_key, ttl_secs)
return "queued"
"#,
    read_only: false,
};

pub(crate) const QUEUE_DEQUEUE_SCRIPT: LuaScript = LuaScript {
    name: "queue_dequeue",
    source: r#"
local data_key = KEYS[1]
local order_key = KEYS[2]
local now_ms = tonumber(ARGV[1])
local stale_ms = tonumber(ARGV[2])
local max_iter = tonumber(ARGV[3])

for i = 1, max_iter do
  local user_id = redis.call("LPOP", order_key)
  if not user_id then
    return {"empty"}
  end
  local payload = redis.call("HGET", data_key, user_id)
  redis.call("HDEL", data_key, user_id)
  if payload then
    local ok, msg = pcall(cjson.decode, payload)
    local ts = 0
    if ok and type(msg) == "table" and msg.timestamp_ms then
      ts = tonumber(msg.timestamp_ms) or 0
    end
    if now_ms - ts <= stale_ms then
      return {"ok", user_id, tostring(ts), payload}
    end
  end
end
return {"exhausted"}
"#,
    read_only: false,
};

/// Result of an enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// New entry appended.
    Success,
    /// Existing entry from the same user replaced and moved to the tail.
    ReplacedDuplicate,
    /// Rejected: the user already has an in-flight entry.
    Duplicate,
    /// Rejected: the queue is at capacity.
    QueueFull,
}

/// Result of a dequeue attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DequeueOutcome {
    /// The queue is empty.
    Empty,
    /// Head-of-line entry.
    Success {
        /// Sender of the pending message.
        user_id: String,
        /// Payload timestamp in unix milliseconds.
        timestamp_ms: u64,
        /// Raw JSON payload.
        payload: String,
    },
    /// The stale-eviction iteration cap was reached without a fresh entry.
    Exhausted,
}

/// Store-side queue protocol.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append or replace one pending message atomically.
    #[allow(clippy::too_many_arguments)]
    async fn enqueue(
        &self,
        chat: &str,
        user_id: &str,
        timestamp_ms: u64,
        payload: &str,
        replace: bool,
        max_size: usize,
        ttl_secs: u64,
    ) -> StoreResult<EnqueueOutcome>;

    /// Pop the freshest head-of-line entry, discarding stale ones.
    async fn dequeue(
        &self,
        chat: &str,
        now_ms: u64,
        stale_threshold_ms: u64,
        max_iterations: u32,
    ) -> StoreResult<DequeueOutcome>;

    /// Current queue length.
    async fn len(&self, chat: &str) -> StoreResult<usize>;

    /// Raise the chain-skip flag.
    async fn set_chain_skip(&self, chat: &str, ttl_secs: u64) -> StoreResult<()>;

    /// Read and clear the chain-skip flag in one step.
    async fn check_and_clear_chain_skip(&self, chat: &str) -> StoreResult<bool>;
}

/// Lua-backed queue protocol against Valkey.
pub struct ValkeyQueueBackend {
    client: KvClient,
    registry: Arc<LuaRegistry>,
    keys: KeySpace,
}

impl ValkeyQueueBackend {
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
impl QueueBackend for ValkeyQueueBackend {
    async fn enqueue(
        &self,
        chat: &str,
        user_id: &str,
        _timestamp_ms: u64,
        payload: &str,
        replace: bool,
        max_size: usize,
        ttl_secs: u64,
    ) -> StoreResult<EnqueueOutcome> {
        let data_key = self.keys.pending_data(chat);
        let order_key = self.keys.pending_order(chat);
        let status: String = self
            .registry
            .exec(
                &self.client,
                QUEUE_ENQUEUE_SCRIPT.name,
                &[&data_key, &order_key],
                &[
                    user_id.to_string(),
                    payload.to_string(),
                    max_size.to_string(),
                    ttl_secs.to_string(),
                    u64::from(replace).to_string(),
                ],
            )
            .await?;
        match status.as_str() {
            "queued" => Ok(EnqueueOutcome::Success),
            "replaced" => Ok(EnqueueOutcome::ReplacedDuplicate),
            "duplicate" => Ok(EnqueueOutcome::Duplicate),
            "full" => Ok(EnqueueOutcome::QueueFull),
            other => Err(StoreError::Payload {
                operation: "queue_enqueue",
                source: serde_json::Error::io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unexpected enqueue status {other}"),
                )),
            }),
        }
    }

    async fn dequeue(
        &self,
        chat: &str,
        now_ms: u64,
        stale_threshold_ms: u64,
        max_iterations: u32,
    ) -> StoreResult<DequeueOutcome> {
        let data_key = self.keys.pending_data(chat);
        let order_key = self.keys.pending_order(chat);
        let reply: Vec<String> = self
            .registry
            .exec(
                &self.client,
                QUEUE_DEQUEUE_SCRIPT.name,
                &[&data_key, &order_key],
                &[
                    now_ms.to_string(),
                    stale_threshold_ms.to_string(),
                    max_iterations.to_string(),
                ],
            )
            .await?;
        match reply.first().map(String::as_str) {
            Some("empty") | None => Ok(DequeueOutcome::Empty),
            Some("exhausted") => Ok(DequeueOutcome::Exhausted),
            Some("ok") if reply.len() == 4 => Ok(DequeueOutcome::Success {
                user_id: reply[1].clone(),
                timestamp_ms: reply[2].parse().unwrap_or(0),
                payload: reply[3].clone(),
            }),
            Some(other) => Err(StoreError::Payload {
                operation: "queue_dequeue",
                source: serde_json::Error::io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unexpected dequeue status {other}"),
                )),
            }),
        }
    }

    async fn len(&self, chat: &str) -> StoreResult<usize> {
        self.client.llen(&self.keys.pending_order(chat)).await
    }

    async fn set_chain_skip(&self, chat: &str, ttl_secs: u64) -> StoreResult<()> {
        self.client
            .set_ex(&self.keys.chain_skip(chat), "1", ttl_secs)
            .await
    }

    async fn check_and_clear_chain_skip(&self, chat: &str) -> StoreResult<bool> {
        let value = self.client.getdel(&self.keys.chain_skip(chat)).await?;
        Ok(value.is_some())
    }
}

#[derive(Default)]
struct MemoryChatQueue {
    data: HashMap<String, (u64, String)>,
    order: VecDeque<String>,
    chain_skip: Option<Instant>,
}

/// In-process queue backend with the same observable semantics.
#[derive(Default)]
pub struct MemoryQueueBackend {
    chats: Mutex<HashMap<String, MemoryChatQueue>>,
}

impl MemoryQueueBackend {
    /// Empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_chat<T>(&self, chat: &str, f: impl FnOnce(&mut MemoryChatQueue) -> T) -> T {
        let mut chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
        f(chats.entry(chat.to_string()).or_default())
    }
}

#[async_trait]
impl QueueBackend for MemoryQueueBackend {
    async fn enqueue(
        &self,
        chat: &str,
        user_id: &str,
        timestamp_ms: u64,
        payload: &str,
        replace: bool,
        max_size: usize,
        _ttl_secs: u64,
    ) -> StoreResult<EnqueueOutcome> {
        Ok(self.with_chat(chat, |queue| {
            if queue.order.len() >= max_size {
                return EnqueueOutcome::QueueFull;
            }
            if queue.data.contains_key(user_id) {
                if !replace {
                    return EnqueueOutcome::Duplicate;
                }
                queue
                    .data
                    .insert(user_id.to_string(), (timestamp_ms, payload.to_string()));
                queue.order.retain(|entry| entry != user_id);
                queue.order.push_back(user_id.to_string());
                return EnqueueOutcome::ReplacedDuplicate;
            }
            queue
                .data
                .insert(user_id.to_string(), (timestamp_ms, payload.to_string()));
            queue.order.push_back(user_id.to_string());
            EnqueueOutcome::Success
        }))
    }

    async fn dequeue(
        &self,
        chat: &str,
        now_ms: u64,
        stale_threshold_ms: u64,
        max_iterations: u32,
    ) -> StoreResult<DequeueOutcome> {
        Ok(self.with_chat(chat, |queue| {
            for _ in 0..max_iterations {
                let Some(user_id) = queue.order.pop_front() else {
                    return DequeueOutcome::Empty;
                };
                if let Some((timestamp_ms, payload)) = queue.data.remove(&user_id) {
                    if now_ms.saturating_sub(timestamp_ms) <= stale_threshold_ms {
                        return DequeueOutcome::Success {
                            user_id,
                            timestamp_ms,
                            payload,
                        };
                    }
                }
            }
            DequeueOutcome::Exhausted
        }))
    }

    async fn len(&self, chat: &str) -> StoreResult<usize> {
        Ok(self.with_chat(chat, |queue| queue.order.len()))
    }

    async fn set_chain_skip(&self, chat: &str, ttl_secs: u64) -> StoreResult<()> {
        self.with_chat(chat, |queue| {
            queue.chain_skip = Some(Instant::now() + Duration::from_secs(ttl_secs));
        });
        Ok(())
    }

    async fn check_and_clear_chain_skip(&self, chat: &str) -> StoreResult<bool> {
        Ok(self.with_chat(chat, |queue| {
            let live = queue
                .chain_skip
                .map(|expires| expires > Instant::now())
                .unwrap_or(false);
            queue.chain_skip = None;
            live
        }))
    }
}

/// Queue limits and TTLs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum in-flight entries per chat.
    pub max_size: usize,
    /// TTL applied to the data hash and order list.
    pub ttl_secs: u64,
    /// Entries older than this are dropped at dequeue.
    pub stale_threshold_ms: u64,
    /// Upper bound on stale evictions per dequeue call.
    pub max_dequeue_iterations: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            ttl_secs: QUEUE_TTL_SECS,
            stale_threshold_ms: 60 * 60 * 1000,
            max_dequeue_iterations: 10,
        }
    }
}

/// Bounded FIFO of pending user turns for one game family.
pub struct PendingQueue {
    backend: Arc<dyn QueueBackend>,
    config: QueueConfig,
}

impl PendingQueue {
    /// Queue with default limits.
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self::with_config(backend, QueueConfig::default())
    }

    /// Queue with explicit limits.
    pub fn with_config(backend: Arc<dyn QueueBackend>, config: QueueConfig) -> Self {
        Self { backend, config }
    }

    /// Configured limits.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue, rejecting a second entry from the same user.
    pub async fn enqueue(
        &self,
        chat: &str,
        user_id: &str,
        timestamp_ms: u64,
        payload: &str,
    ) -> StoreResult<EnqueueOutcome> {
        self.enqueue_inner(chat, user_id, timestamp_ms, payload, false)
            .await
    }

    /// Enqueue, replacing an earlier entry from the same user and moving it
    /// to the tail.
    pub async fn enqueue_replacing(
        &self,
        chat: &str,
        user_id: &str,
        timestamp_ms: u64,
        payload: &str,
    ) -> StoreResult<EnqueueOutcome> {
        self.enqueue_inner(chat, user_id, timestamp_ms, payload, true)
            .await
    }

    async fn enqueue_inner(
        &self,
        chat: &str,
        user_id: &str,
        timestamp_ms: u64,
        payload: &str,
        replace: bool,
    ) -> StoreResult<EnqueueOutcome> {
        let outcome = self
            .backend
            .enqueue(
                chat,
                user_id,
                timestamp_ms,
                payload,
                replace,
                self.config.max_size,
                self.config.ttl_secs,
            )
            .await?;
        let event = match outcome {
            EnqueueOutcome::Success => StoreEvent::QueueEnqueued,
            EnqueueOutcome::ReplacedDuplicate => StoreEvent::QueueReplacedDuplicate,
            EnqueueOutcome::Duplicate => StoreEvent::QueueDuplicateRejected,
            EnqueueOutcome::QueueFull => StoreEvent::QueueFullRejected,
        };
        tracing::debug!(
            event = event.as_str(),
            chat = %chat,
            user_id = %user_id,
            timestamp_ms,
            "pending queue enqueue"
        );
        Ok(outcome)
    }

    /// Dequeue the next fresh entry using the wall clock.
    pub async fn dequeue(&self, chat: &str) -> StoreResult<DequeueOutcome> {
        self.dequeue_at(chat, now_unix_ms()).await
    }

    /// Dequeue the next fresh entry relative to an explicit `now`.
    pub async fn dequeue_at(&self, chat: &str, now_ms: u64) -> StoreResult<DequeueOutcome> {
        let outcome = self
            .backend
            .dequeue(
                chat,
                now_ms,
                self.config.stale_threshold_ms,
                self.config.max_dequeue_iterations,
            )
            .await?;
        match &outcome {
            DequeueOutcome::Success {
                user_id,
                timestamp_ms,
                ..
            } => {
                tracing::debug!(
                    event = StoreEvent::QueueDequeued.as_str(),
                    chat = %chat,
                    user_id = %user_id,
                    timestamp_ms,
                    "pending queue dequeue"
                );
            }
            DequeueOutcome::Exhausted => {
                tracing::warn!(
                    event = StoreEvent::QueueDequeueExhausted.as_str(),
                    chat = %chat,
                    max_iterations = self.config.max_dequeue_iterations,
                    "pending queue dequeue hit the stale-eviction cap"
                );
            }
            DequeueOutcome::Empty => {}
        }
        Ok(outcome)
    }

    /// Current queue length.
    pub async fn len(&self, chat: &str) -> StoreResult<usize> {
        self.backend.len(chat).await
    }

    /// Raise the chain-skip flag.
    pub async fn set_chain_skip_flag(&self, chat: &str) -> StoreResult<()> {
        self.backend.set_chain_skip(chat, CHAIN_SKIP_TTL_SECS).await
    }

    /// Read and clear the chain-skip flag.
    pub async fn check_and_clear_chain_skip_flag(&self, chat: &str) -> StoreResult<bool> {
        self.backend.check_and_clear_chain_skip(chat).await
    }
}
