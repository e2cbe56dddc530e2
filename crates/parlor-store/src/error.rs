//! Typed errors for the store layer.

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error surfaced by the Valkey-backed state layer.
///
/// Every variant carries the logical operation name so callers can log a
/// stable identifier instead of a raw command line.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The configured store URL could not be parsed.
    #[error("invalid store url {url}: {source}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Parse failure from the client.
        #[source]
        source: redis::RedisError,
    },

    /// A store command failed after the reconnect-and-retry pass.
    #[error("store {operation} failed: {source}")]
    Command {
        /// Logical operation name (for example `queue_enqueue`).
        operation: &'static str,
        /// Underlying protocol error.
        #[source]
        source: redis::RedisError,
    },

    /// No connection could be established for the operation.
    #[error("store {operation} failed: connection unavailable")]
    ConnectionUnavailable {
        /// Logical operation name.
        operation: &'static str,
    },

    /// A persisted payload failed to encode or decode.
    #[error("store {operation} payload error: {source}")]
    Payload {
        /// Logical operation name.
        operation: &'static str,
        /// JSON codec failure.
        #[source]
        source: serde_json::Error,
    },

    /// A Lua script name was not registered.
    #[error("lua script {name} is not registered")]
    UnknownScript {
        /// Requested script name.
        name: String,
    },
}

impl StoreError {
    /// True when the error is a server-side NOSCRIPT rejection.
    pub(crate) fn is_noscript(&self) -> bool {
        match self {
            StoreError::Command { source, .. } => source.code() == Some("NOSCRIPT"),
            _ => false,
        }
    }
}
