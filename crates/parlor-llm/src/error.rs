//! Typed errors for the LLM client.

/// Error surfaced by the LLM RPC client.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The configured endpoint URL was rejected.
    #[error("llm endpoint {url} rejected: {reason}")]
    Endpoint {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Client configuration was invalid (for example a bad API key value).
    #[error("invalid llm configuration: {reason}")]
    Config {
        /// What was wrong.
        reason: String,
    },

    /// Channel construction failed.
    #[error("llm transport setup failed: {source}")]
    Transport {
        /// Underlying transport error.
        #[source]
        source: tonic::transport::Error,
    },

    /// A call failed with a gRPC status.
    #[error("llm call {call} failed: {status}")]
    Call {
        /// Logical method name.
        call: &'static str,
        /// Status returned by the server or transport.
        status: tonic::Status,
    },

    /// A call exceeded its local deadline before the transport reported.
    #[error("llm call {call} timed out")]
    Timeout {
        /// Logical method name.
        call: &'static str,
    },
}
