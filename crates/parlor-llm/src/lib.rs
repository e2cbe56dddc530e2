//! gRPC client for the LLM inference server.
//!
//! Plaintext TCP (`grpc://`) or unix-domain sockets (`unix://`); per-call
//! deadlines, `x-api-key` / `x-request-id` metadata, and 16 MiB message
//! caps. [`LlmApi`] fronts the transport so services and tests share one
//! surface.

#![allow(missing_docs)]

mod api;
mod client;
mod context;
mod endpoint;
mod error;
#[doc(hidden)]
pub mod test_support;
mod wire;

pub use api::{
    LlmApi, ModelConfig, PuzzleContent, PuzzleSpec, SolutionVerdict, SoupAnswer, SoupTurn,
    TopicSelection, UsageReport,
};
pub use client::{DEFAULT_CALL_TIMEOUT, GrpcLlmClient, LlmClientConfig, MAX_MESSAGE_BYTES};
pub use context::{CallContext, REQUEST_ID_KEY};
pub use endpoint::{DEFAULT_GRPC_PORT, channel_for_url};
pub use error::LlmError;
