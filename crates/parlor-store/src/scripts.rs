//! Named Lua scripts: cluster preload, SHA caching, NOSCRIPT recovery.

use std::collections::HashMap;

use redis::FromRedisValue;
use tokio::sync::Mutex;

use crate::client::KvClient;
use crate::error::{StoreError, StoreResult};
use crate::observability::StoreEvent;

/// A named server-side script.
#[derive(Debug, Clone, Copy)]
pub struct LuaScript {
    /// Registry name used by `exec`.
    pub name: &'static str,
    /// Script source.
    pub source: &'static str,
    /// Read-only scripts may be routed to replicas.
    pub read_only: bool,
}

/// Registry of named scripts with a mutex-guarded SHA cache.
pub struct LuaRegistry {
    scripts: HashMap<&'static str, LuaScript>,
    shas: Mutex<HashMap<&'static str, String>>,
}

impl LuaRegistry {
    /// Build a registry from explicit scripts.
    pub fn new(scripts: Vec<LuaScript>) -> Self {
        Self {
            scripts: scripts.into_iter().map(|s| (s.name, s)).collect(),
            shas: Mutex::new(HashMap::new()),
        }
    }

    /// Registry preloaded with every script the store layer uses.
    pub fn with_default_scripts() -> Self {
        Self::new(crate::default_scripts())
    }

    /// Names of all registered scripts.
    pub fn names(&self) -> Vec<&'static str> {
        self.scripts.keys().copied().collect()
    }

    /// Load every script on every cluster node in parallel, failing fast.
    pub async fn preload(&self, client: &KvClient) -> StoreResult<()> {
        let nodes = client.nodes();
        let loads = nodes.iter().flat_map(|node| {
            self.scripts.values().map(move |script| async move {
                let sha = node.script_load(script.source).await?;
                tracing::debug!(
                    event = StoreEvent::ScriptPreloaded.as_str(),
                    script = script.name,
                    node = %node.url(),
                    read_only = script.read_only,
                    "lua script preloaded"
                );
                Ok::<_, StoreError>((script.name, sha))
            })
        });
        let loaded = futures::future::try_join_all(loads).await?;
        let mut shas = self.shas.lock().await;
        for (name, sha) in loaded {
            shas.insert(name, sha);
        }
        Ok(())
    }

    /// Execute a named script by SHA, recovering from NOSCRIPT with EVAL.
    ///
    /// A script that was never preloaded is SCRIPT LOADed on first use so
    /// later calls take the EVALSHA fast path.
    pub async fn exec<T>(
        &self,
        client: &KvClient,
        name: &'static str,
        keys: &[&str],
        args: &[String],
    ) -> StoreResult<T>
    where
        T: FromRedisValue + Send,
    {
        let script = self
            .scripts
            .get(name)
            .ok_or_else(|| StoreError::UnknownScript {
                name: name.to_string(),
            })?;

        let cached_sha = { self.shas.lock().await.get(name).cloned() };
        let sha = match cached_sha {
            Some(sha) => sha,
            None => {
                let sha = client.script_load(script.source).await?;
                self.shas.lock().await.insert(name, sha.clone());
                sha
            }
        };

        match client.evalsha::<T>(&sha, keys, args).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_noscript() => {
                self.shas.lock().await.remove(name);
                tracing::warn!(
                    event = StoreEvent::ScriptNoscriptRecovered.as_str(),
                    script = name,
                    "NOSCRIPT from store; retrying with EVAL on source"
                );
                client.eval::<T>(script.source, keys, args).await
            }
            Err(err) => Err(err),
        }
    }
}
