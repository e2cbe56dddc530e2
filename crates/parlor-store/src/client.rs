//! Thin command adapter over a Valkey/Redis-compatible server.
//!
//! One lazily-opened multiplexed connection per client, guarded by a mutex.
//! Every command runs through a try-once-then-reconnect-and-retry wrapper so
//! a dropped socket costs one retry instead of an error. A missing key on
//! GET/HGET/LPOP is a normal `None`, never an error.

use std::collections::HashMap;
use std::sync::Arc;

use redis::FromRedisValue;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::observability::StoreEvent;

/// Valkey client with a shared reconnecting connection.
#[derive(Clone)]
pub struct KvClient {
    client: redis::Client,
    url: String,
    connection: Arc<Mutex<Option<MultiplexedConnection>>>,
}

impl std::fmt::Debug for KvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvClient").field("url", &self.url).finish()
    }
}

impl KvClient {
    /// Open a client for the given `redis://` / `redis+unix://` URL.
    ///
    /// The connection itself is opened lazily on first use.
    pub fn open(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(|source| StoreError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        Ok(Self {
            client,
            url: url.to_string(),
            connection: Arc::new(Mutex::new(None)),
        })
    }

    /// Configured store URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Logical cluster nodes for script preloading.
    ///
    /// Non-clustered deployments collapse to a single node.
    pub fn nodes(&self) -> Vec<KvClient> {
        vec![self.clone()]
    }

    async fn ensure_connection(
        &self,
        operation: &'static str,
        connection: &mut Option<MultiplexedConnection>,
    ) -> StoreResult<()> {
        if connection.is_some() {
            return Ok(());
        }
        *connection = Some(
            self.client
                .get_multiplexed_async_connection()
                .await
                .map_err(|source| StoreError::Command { operation, source })?,
        );
        tracing::debug!(
            event = StoreEvent::StoreConnected.as_str(),
            url = %self.url,
            "valkey connection opened"
        );
        Ok(())
    }

    /// Run one command, reconnecting and retrying once on failure.
    pub(crate) async fn run_command<T, F>(&self, operation: &'static str, build: F) -> StoreResult<T>
    where
        T: FromRedisValue + Send,
        F: Fn() -> redis::Cmd,
    {
        let mut last_err: Option<StoreError> = None;
        for attempt in 0..2 {
            let mut conn_guard = self.connection.lock().await;
            self.ensure_connection(operation, &mut conn_guard).await?;
            let conn = conn_guard
                .as_mut()
                .ok_or(StoreError::ConnectionUnavailable { operation })?;
            let cmd = build();
            let result: redis::RedisResult<T> = cmd.query_async(conn).await;
            match result {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(
                            event = StoreEvent::StoreCommandRetrySucceeded.as_str(),
                            operation,
                            attempt = attempt + 1,
                            "valkey command succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    // Scripted rejections are deterministic; retrying on a
                    // fresh socket would only repeat them.
                    let retryable = err.code() != Some("NOSCRIPT");
                    tracing::warn!(
                        event = StoreEvent::StoreCommandRetryFailed.as_str(),
                        operation,
                        attempt = attempt + 1,
                        error = %err,
                        "valkey command attempt failed"
                    );
                    if retryable {
                        *conn_guard = None;
                    }
                    last_err = Some(StoreError::Command {
                        operation,
                        source: err,
                    });
                    if attempt == 0 && retryable {
                        continue;
                    }
                    break;
                }
            }
        }
        Err(last_err.unwrap_or(StoreError::ConnectionUnavailable { operation }))
    }

    /// Run one pipeline, reconnecting and retrying once on failure.
    pub(crate) async fn run_pipeline<T, F>(
        &self,
        operation: &'static str,
        build: F,
    ) -> StoreResult<T>
    where
        T: FromRedisValue + Send,
        F: Fn() -> redis::Pipeline,
    {
        let mut last_err: Option<StoreError> = None;
        for attempt in 0..2 {
            let mut conn_guard = self.connection.lock().await;
            self.ensure_connection(operation, &mut conn_guard).await?;
            let conn = conn_guard
                .as_mut()
                .ok_or(StoreError::ConnectionUnavailable { operation })?;
            let pipe = build();
            let result: redis::RedisResult<T> = pipe.query_async(conn).await;
            match result {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(
                            event = StoreEvent::StoreCommandRetrySucceeded.as_str(),
                            operation,
                            attempt = attempt + 1,
                            "valkey pipeline succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    tracing::warn!(
                        event = StoreEvent::StoreCommandRetryFailed.as_str(),
                        operation,
                        attempt = attempt + 1,
                        error = %err,
                        "valkey pipeline attempt failed; reconnecting"
                    );
                    *conn_guard = None;
                    last_err = Some(StoreError::Command {
                        operation,
                        source: err,
                    });
                    if attempt == 0 {
                        continue;
                    }
                }
            }
        }
        Err(last_err.unwrap_or(StoreError::ConnectionUnavailable { operation }))
    }

    /// GET; missing key is `None`.
    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.run_command("get", || {
            let mut cmd = redis::cmd("GET");
            cmd.arg(key);
            cmd
        })
        .await
    }

    /// Unconditional SET with a TTL in seconds.
    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        self.run_command("set_ex", || {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value).arg("EX").arg(ttl_secs);
            cmd
        })
        .await
    }

    /// SET NX PX; returns true when the key was written.
    pub async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> StoreResult<bool> {
        let written: Option<String> = self
            .run_command("set_nx_px", || {
                let mut cmd = redis::cmd("SET");
                cmd.arg(key).arg(value).arg("NX").arg("PX").arg(ttl_ms);
                cmd
            })
            .await?;
        Ok(written.is_some())
    }

    /// DEL; returns the number of keys removed.
    pub async fn del(&self, keys: &[String]) -> StoreResult<i64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.run_command("del", || {
            let mut cmd = redis::cmd("DEL");
            for key in keys {
                cmd.arg(key);
            }
            cmd
        })
        .await
    }

    /// EXPIRE in seconds; false when the key does not exist.
    pub async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        let set: i64 = self
            .run_command("expire", || {
                let mut cmd = redis::cmd("EXPIRE");
                cmd.arg(key).arg(ttl_secs);
                cmd
            })
            .await?;
        Ok(set == 1)
    }

    /// TTL in seconds (-1 no expiry, -2 missing key).
    pub async fn ttl(&self, key: &str) -> StoreResult<i64> {
        self.run_command("ttl", || {
            let mut cmd = redis::cmd("TTL");
            cmd.arg(key);
            cmd
        })
        .await
    }

    /// PTTL in milliseconds (-1 no expiry, -2 missing key).
    pub async fn pttl(&self, key: &str) -> StoreResult<i64> {
        self.run_command("pttl", || {
            let mut cmd = redis::cmd("PTTL");
            cmd.arg(key);
            cmd
        })
        .await
    }

    /// INCR; returns the new value.
    pub async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.run_command("incr", || {
            let mut cmd = redis::cmd("INCR");
            cmd.arg(key);
            cmd
        })
        .await
    }

    /// GETDEL; missing key is `None`.
    pub async fn getdel(&self, key: &str) -> StoreResult<Option<String>> {
        self.run_command("getdel", || {
            let mut cmd = redis::cmd("GETDEL");
            cmd.arg(key);
            cmd
        })
        .await
    }

    /// RPUSH one value; returns the list length.
    pub async fn rpush(&self, key: &str, value: &str) -> StoreResult<i64> {
        self.run_command("rpush", || {
            let mut cmd = redis::cmd("RPUSH");
            cmd.arg(key).arg(value);
            cmd
        })
        .await
    }

    /// RPUSH + LTRIM to the most recent `keep` + EXPIRE, in one atomic pipeline.
    pub async fn rpush_trim_expire(
        &self,
        key: &str,
        value: &str,
        keep: usize,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        let keep_i64 = keep.max(1) as i64;
        self.run_pipeline("rpush_trim_expire", || {
            let mut pipe = redis::pipe();
            pipe.atomic();
            pipe.cmd("RPUSH").arg(key).arg(value).ignore();
            pipe.cmd("LTRIM").arg(key).arg(-keep_i64).arg(-1).ignore();
            pipe.cmd("EXPIRE").arg(key).arg(ttl_secs).ignore();
            pipe
        })
        .await
    }

    /// LPOP; empty list is `None`.
    pub async fn lpop(&self, key: &str) -> StoreResult<Option<String>> {
        self.run_command("lpop", || {
            let mut cmd = redis::cmd("LPOP");
            cmd.arg(key);
            cmd
        })
        .await
    }

    /// LRANGE over the whole list.
    pub async fn lrange_all(&self, key: &str) -> StoreResult<Vec<String>> {
        self.run_command("lrange_all", || {
            let mut cmd = redis::cmd("LRANGE");
            cmd.arg(key).arg(0).arg(-1);
            cmd
        })
        .await
    }

    /// LLEN.
    pub async fn llen(&self, key: &str) -> StoreResult<usize> {
        self.run_command("llen", || {
            let mut cmd = redis::cmd("LLEN");
            cmd.arg(key);
            cmd
        })
        .await
    }

    /// SADD one member; returns 1 when newly added.
    pub async fn sadd(&self, key: &str, member: &str) -> StoreResult<i64> {
        self.run_command("sadd", || {
            let mut cmd = redis::cmd("SADD");
            cmd.arg(key).arg(member);
            cmd
        })
        .await
    }

    /// SISMEMBER.
    pub async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        let present: i64 = self
            .run_command("sismember", || {
                let mut cmd = redis::cmd("SISMEMBER");
                cmd.arg(key).arg(member);
                cmd
            })
            .await?;
        Ok(present == 1)
    }

    /// SMEMBERS.
    pub async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        self.run_command("smembers", || {
            let mut cmd = redis::cmd("SMEMBERS");
            cmd.arg(key);
            cmd
        })
        .await
    }

    /// SCARD.
    pub async fn scard(&self, key: &str) -> StoreResult<usize> {
        self.run_command("scard", || {
            let mut cmd = redis::cmd("SCARD");
            cmd.arg(key);
            cmd
        })
        .await
    }

    /// HSET one field.
    pub async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.run_command("hset", || {
            let mut cmd = redis::cmd("HSET");
            cmd.arg(key).arg(field).arg(value);
            cmd
        })
        .await
    }

    /// HGET; missing field is `None`.
    pub async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.run_command("hget", || {
            let mut cmd = redis::cmd("HGET");
            cmd.arg(key).arg(field);
            cmd
        })
        .await
    }

    /// HGETALL.
    pub async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.run_command("hgetall", || {
            let mut cmd = redis::cmd("HGETALL");
            cmd.arg(key);
            cmd
        })
        .await
    }

    /// HDEL one field.
    pub async fn hdel(&self, key: &str, field: &str) -> StoreResult<i64> {
        self.run_command("hdel", || {
            let mut cmd = redis::cmd("HDEL");
            cmd.arg(key).arg(field);
            cmd
        })
        .await
    }

    /// Cursor SCAN collecting every key matching `pattern`.
    pub async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut cursor: u64 = 0;
        let mut out = Vec::new();
        loop {
            let (next, mut batch): (u64, Vec<String>) = self
                .run_command("scan_match", || {
                    let mut cmd = redis::cmd("SCAN");
                    cmd.arg(cursor).arg("MATCH").arg(pattern).arg("COUNT").arg(100);
                    cmd
                })
                .await?;
            out.append(&mut batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(out)
    }

    /// SCRIPT LOAD; returns the script SHA.
    pub async fn script_load(&self, source: &str) -> StoreResult<String> {
        self.run_command("script_load", || {
            let mut cmd = redis::cmd("SCRIPT");
            cmd.arg("LOAD").arg(source);
            cmd
        })
        .await
    }

    /// EVALSHA with string keys and args.
    pub async fn evalsha<T>(&self, sha: &str, keys: &[&str], args: &[String]) -> StoreResult<T>
    where
        T: FromRedisValue + Send,
    {
        self.run_command("evalsha", || {
            let mut cmd = redis::cmd("EVALSHA");
            cmd.arg(sha).arg(keys.len());
            for key in keys {
                cmd.arg(*key);
            }
            for arg in args {
                cmd.arg(arg);
            }
            cmd
        })
        .await
    }

    /// EVAL on source with string keys and args.
    pub async fn eval<T>(&self, source: &str, keys: &[&str], args: &[String]) -> StoreResult<T>
    where
        T: FromRedisValue + Send,
    {
        self.run_command("eval", || {
            let mut cmd = redis::cmd("EVAL");
            cmd.arg(source).arg(keys.len());
            for key in keys {
                cmd.arg(*key);
            }
            for arg in args {
                cmd.arg(arg);
            }
            cmd
        })
        .await
    }
}
