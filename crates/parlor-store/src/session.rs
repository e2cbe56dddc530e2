//! Typed session persistence over a small KV surface.
//!
//! [`SessionKv`] is the non-scripted slice of the store the game state
//! needs: strings with TTL, counters, bounded lists, sets, and one hash.
//! [`JsonSessionStore`] layers the serde round-trip contract on top;
//! [`TopicHistory`] and [`SignatureStore`] are the two non-JSON helpers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::client::KvClient;
use crate::error::{StoreError, StoreResult};
use crate::keys::{KeySpace, SESSION_TTL_SECS};
use crate::observability::StoreEvent;

/// Non-scripted store surface for session state.
#[async_trait]
pub trait SessionKv: Send + Sync {
    /// GET; missing key is `None`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
    /// SET with TTL in seconds.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()>;
    /// DEL.
    async fn del(&self, keys: &[String]) -> StoreResult<()>;
    /// EXPIRE; false when the key does not exist.
    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool>;
    /// INCR plus EXPIRE; returns the new value.
    async fn incr_ex(&self, key: &str, ttl_secs: u64) -> StoreResult<i64>;
    /// RPUSH bounded by LTRIM to the most recent `keep`, plus EXPIRE.
    async fn list_append_bounded(
        &self,
        key: &str,
        value: &str,
        keep: usize,
        ttl_secs: u64,
    ) -> StoreResult<()>;
    /// Whole list contents.
    async fn list_all(&self, key: &str) -> StoreResult<Vec<String>>;
    /// SADD; true when newly added.
    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool>;
    /// SISMEMBER.
    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool>;
    /// HGET; missing field is `None`.
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;
    /// HSET one field.
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;
}

/// Valkey-backed session surface.
pub struct ValkeySessionKv {
    client: KvClient,
}

impl ValkeySessionKv {
    /// Surface over the given client.
    pub fn new(client: KvClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SessionKv for ValkeySessionKv {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.client.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        self.client.set_ex(key, value, ttl_secs).await
    }

    async fn del(&self, keys: &[String]) -> StoreResult<()> {
        self.client.del(keys).await.map(|_| ())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        self.client.expire(key, ttl_secs).await
    }

    async fn incr_ex(&self, key: &str, ttl_secs: u64) -> StoreResult<i64> {
        let values: Vec<i64> = self
            .client
            .run_pipeline("incr_ex", || {
                let mut pipe = redis::pipe();
                pipe.atomic();
                pipe.cmd("INCR").arg(key);
                pipe.cmd("EXPIRE").arg(key).arg(ttl_secs).ignore();
                pipe
            })
            .await?;
        Ok(values.first().copied().unwrap_or(0))
    }

    async fn list_append_bounded(
        &self,
        key: &str,
        value: &str,
        keep: usize,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        self.client
            .rpush_trim_expire(key, value, keep, ttl_secs)
            .await
    }

    async fn list_all(&self, key: &str) -> StoreResult<Vec<String>> {
        self.client.lrange_all(key).await
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool> {
        Ok(self.client.sadd(key, member).await? == 1)
    }

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.client.sismember(key, member).await
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.client.hget(key, field).await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.client.hset(key, field, value).await
    }
}

#[derive(Default)]
struct MemoryState {
    strings: HashMap<String, (String, Option<Instant>)>,
    lists: HashMap<String, Vec<String>>,
    sets: HashMap<String, HashSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl MemoryState {
    fn purge(&mut self, now: Instant) {
        self.strings
            .retain(|_, (_, expires)| expires.map(|at| at > now).unwrap_or(true));
    }
}

/// In-process session surface with the same observable semantics.
///
/// Lists, sets, and hashes ignore TTL; string expiry is honored because the
/// hint counter and cooldown-adjacent state depend on it.
#[derive(Default)]
pub struct MemorySessionKv {
    state: Mutex<MemoryState>,
}

impl MemorySessionKv {
    /// Empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.purge(Instant::now());
        f(&mut state)
    }
}

#[async_trait]
impl SessionKv for MemorySessionKv {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.with_state(|s| s.strings.get(key).map(|(v, _)| v.clone())))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        self.with_state(|s| {
            s.strings.insert(
                key.to_string(),
                (
                    value.to_string(),
                    Some(Instant::now() + Duration::from_secs(ttl_secs)),
                ),
            );
        });
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> StoreResult<()> {
        self.with_state(|s| {
            for key in keys {
                s.strings.remove(key);
                s.lists.remove(key);
                s.sets.remove(key);
                s.hashes.remove(key);
            }
        });
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        Ok(self.with_state(|s| {
            if let Some((_, expires)) = s.strings.get_mut(key) {
                *expires = Some(Instant::now() + Duration::from_secs(ttl_secs));
                return true;
            }
            s.lists.contains_key(key) || s.sets.contains_key(key) || s.hashes.contains_key(key)
        }))
    }

    async fn incr_ex(&self, key: &str, ttl_secs: u64) -> StoreResult<i64> {
        Ok(self.with_state(|s| {
            let next = s
                .strings
                .get(key)
                .and_then(|(v, _)| v.parse::<i64>().ok())
                .unwrap_or(0)
                + 1;
            s.strings.insert(
                key.to_string(),
                (
                    next.to_string(),
                    Some(Instant::now() + Duration::from_secs(ttl_secs)),
                ),
            );
            next
        }))
    }

    async fn list_append_bounded(
        &self,
        key: &str,
        value: &str,
        keep: usize,
        _ttl_secs: u64,
    ) -> StoreResult<()> {
        self.with_state(|s| {
            let list = s.lists.entry(key.to_string()).or_default();
            list.push(value.to_string());
            let keep = keep.max(1);
            if list.len() > keep {
                let drop = list.len() - keep;
                list.drain(0..drop);
            }
        });
        Ok(())
    }

    async fn list_all(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self.with_state(|s| s.lists.get(key).cloned().unwrap_or_default()))
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool> {
        Ok(self.with_state(|s| {
            s.sets
                .entry(key.to_string())
                .or_default()
                .insert(member.to_string())
        }))
    }

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        Ok(self.with_state(|s| {
            s.sets
                .get(key)
                .map(|set| set.contains(member))
                .unwrap_or(false)
        }))
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        Ok(self.with_state(|s| s.hashes.get(key).and_then(|h| h.get(field).cloned())))
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.with_state(|s| {
            s.hashes
                .entry(key.to_string())
                .or_default()
                .insert(field.to_string(), value.to_string());
        });
        Ok(())
    }
}

/// JSON round-trip persistence for typed session values.
///
/// Reads tolerate unknown fields; writes always carry a TTL.
pub struct JsonSessionStore {
    kv: Arc<dyn SessionKv>,
}

impl JsonSessionStore {
    /// Store over the given surface.
    pub fn new(kv: Arc<dyn SessionKv>) -> Self {
        Self { kv }
    }

    /// Shared access to the underlying surface.
    pub fn kv(&self) -> &Arc<dyn SessionKv> {
        &self.kv
    }

    /// Serialize and save one value under `key`.
    pub async fn save<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        let encoded = serde_json::to_string(value).map_err(|source| StoreError::Payload {
            operation: "session_save",
            source,
        })?;
        self.kv.set_ex(key, &encoded, ttl_secs).await?;
        tracing::debug!(
            event = StoreEvent::SessionSaved.as_str(),
            key = %key,
            ttl_secs,
            bytes = encoded.len(),
            "session value saved"
        );
        Ok(())
    }

    /// Load and decode one value from `key`.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&raw).map_err(|source| StoreError::Payload {
            operation: "session_load",
            source,
        })?;
        tracing::debug!(
            event = StoreEvent::SessionLoaded.as_str(),
            key = %key,
            bytes = raw.len(),
            "session value loaded"
        );
        Ok(Some(value))
    }

    /// Delete a batch of keys.
    pub async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        self.kv.del(keys).await?;
        tracing::debug!(
            event = StoreEvent::SessionDeleted.as_str(),
            keys = keys.len(),
            "session keys deleted"
        );
        Ok(())
    }

    /// Refresh TTLs on a batch of keys; missing keys are skipped.
    pub async fn refresh_ttl(&self, keys: &[String], ttl_secs: u64) -> StoreResult<()> {
        for key in keys {
            let _ = self.kv.expire(key, ttl_secs).await?;
        }
        tracing::debug!(
            event = StoreEvent::SessionTtlRefreshed.as_str(),
            keys = keys.len(),
            ttl_secs,
            "session ttls refreshed"
        );
        Ok(())
    }
}

/// Bounded most-recent topic list per chat (and optional category).
pub struct TopicHistory {
    kv: Arc<dyn SessionKv>,
    keys: KeySpace,
    limit: usize,
    ttl_secs: u64,
}

impl TopicHistory {
    /// History with the default session TTL.
    pub fn new(kv: Arc<dyn SessionKv>, keys: KeySpace, limit: usize) -> Self {
        Self {
            kv,
            keys,
            limit,
            ttl_secs: SESSION_TTL_SECS,
        }
    }

    /// Append a completed topic, keeping only the most recent `limit`.
    pub async fn append(&self, chat: &str, category: Option<&str>, topic: &str) -> StoreResult<()> {
        let key = self.keys.topics(chat, category);
        self.kv
            .list_append_bounded(&key, topic, self.limit, self.ttl_secs)
            .await?;
        tracing::debug!(
            event = StoreEvent::TopicAppended.as_str(),
            chat = %chat,
            category = category.unwrap_or(""),
            limit = self.limit,
            "topic appended to history"
        );
        Ok(())
    }

    /// Most recent topics, oldest first.
    pub async fn recent(&self, chat: &str, category: Option<&str>) -> StoreResult<Vec<String>> {
        self.kv.list_all(&self.keys.topics(chat, category)).await
    }
}

/// Cross-chat puzzle signature set.
pub struct SignatureStore {
    kv: Arc<dyn SessionKv>,
    key: String,
    ttl_secs: u64,
}

impl SignatureStore {
    /// Signature set under the family's dedup key.
    pub fn new(kv: Arc<dyn SessionKv>, keys: &KeySpace) -> Self {
        Self {
            kv,
            key: keys.signatures(),
            ttl_secs: SESSION_TTL_SECS,
        }
    }

    /// True when the signature was already used.
    pub async fn contains(&self, signature: &str) -> StoreResult<bool> {
        self.kv.set_contains(&self.key, signature).await
    }

    /// Mark a signature used; true when it was new.
    pub async fn mark_used(&self, signature: &str) -> StoreResult<bool> {
        let added = self.kv.set_add(&self.key, signature).await?;
        let _ = self.kv.expire(&self.key, self.ttl_secs).await?;
        tracing::debug!(
            event = StoreEvent::SignatureMarked.as_str(),
            added,
            "puzzle signature marked used"
        );
        Ok(added)
    }
}
