//! Explicit per-call context.
//!
//! The request id and deadline ride on this token instead of any ambient
//! task-local state; every call site passes it explicitly.

use std::time::Duration;

/// Bare request-id key accepted alongside the `x-request-id` header.
pub const REQUEST_ID_KEY: &str = "request_id";

/// Per-call metadata and deadline.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Correlation id forwarded as `x-request-id`.
    pub request_id: Option<String>,
    /// Per-call deadline; the client default applies when unset.
    pub deadline: Option<Duration>,
}

impl CallContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context carrying a correlation id.
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            deadline: None,
        }
    }

    /// Attach a deadline.
    #[must_use]
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}
