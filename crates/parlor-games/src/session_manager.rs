//! Typed game-session persistence under the owner-lock model.

use std::marker::PhantomData;
use std::sync::Arc;

use parlor_store::{
    JsonSessionStore, KeySpace, LockHandle, LockManager, LockScope, SESSION_TTL_SECS,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::GameResult;

/// State that may name a game owner.
///
/// The owner's user id becomes the lock holder label; states without one
/// fall back to an anonymous holder.
pub trait OwnedState {
    /// Owning user id, if the state records one.
    fn owner(&self) -> Option<&str> {
        None
    }
}

/// Load / save / delete / refresh for one game family's session value.
pub struct SessionManager<T> {
    store: JsonSessionStore,
    lock: Arc<LockManager>,
    keys: KeySpace,
    ttl_secs: u64,
    _state: PhantomData<fn() -> T>,
}

impl<T> SessionManager<T>
where
    T: Serialize + DeserializeOwned + OwnedState + Send + Sync,
{
    /// Manager with the default session TTL.
    pub fn new(store: JsonSessionStore, lock: Arc<LockManager>, keys: KeySpace) -> Self {
        Self {
            store,
            lock,
            keys,
            ttl_secs: SESSION_TTL_SECS,
            _state: PhantomData,
        }
    }

    /// Key space of this game family.
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Underlying typed store.
    pub fn store(&self) -> &JsonSessionStore {
        &self.store
    }

    /// Session TTL in seconds.
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Load the session value for `chat`.
    pub async fn load(&self, chat: &str) -> GameResult<Option<T>> {
        Ok(self.store.load(&self.keys.session(chat)).await?)
    }

    /// Save the session value for `chat` with a fresh TTL.
    pub async fn save(&self, chat: &str, state: &T) -> GameResult<()> {
        Ok(self
            .store
            .save(&self.keys.session(chat), state, self.ttl_secs)
            .await?)
    }

    /// Delete the session value and any sibling keys.
    pub async fn delete(&self, chat: &str, extra_keys: &[String]) -> GameResult<()> {
        let mut keys = vec![self.keys.session(chat)];
        keys.extend_from_slice(extra_keys);
        Ok(self.store.delete(&keys).await?)
    }

    /// Refresh TTLs on the session value and any sibling keys.
    pub async fn refresh_ttl(&self, chat: &str, extra_keys: &[String]) -> GameResult<()> {
        let mut keys = vec![self.keys.session(chat)];
        keys.extend_from_slice(extra_keys);
        Ok(self.store.refresh_ttl(&keys, self.ttl_secs).await?)
    }

    /// Exclusive lock labelled with the game owner, when one is recorded.
    pub async fn owner_lock(&self, scope: &LockScope, chat: &str) -> GameResult<LockHandle> {
        let holder = self
            .load(chat)
            .await?
            .and_then(|state| state.owner().map(str::to_string));
        Ok(self
            .lock
            .acquire_write(scope, chat, holder.as_deref())
            .await?)
    }

    /// Exclusive lock with an explicit holder label.
    pub async fn write_lock(
        &self,
        scope: &LockScope,
        chat: &str,
        holder: Option<&str>,
    ) -> GameResult<LockHandle> {
        Ok(self.lock.acquire_write(scope, chat, holder).await?)
    }

    /// Shared lock for read-only queries.
    pub async fn read_lock(&self, scope: &LockScope, chat: &str) -> GameResult<LockHandle> {
        Ok(self.lock.acquire_read(scope, chat, None).await?)
    }
}
