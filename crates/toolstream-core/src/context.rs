//! Per-request context threaded through every middleware.
//!
//! [`CompletionContext`] travels alongside [`CompletionParams`](crate::CompletionParams)
//! but is never sent to the model. It carries the caller's cancellation
//! signal, which must reach the terminal provider call, and free-form
//! metadata middlewares can read.

use std::collections::HashMap;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Request-scoped context passed to every link of a middleware chain.
///
/// Cloning is cheap; clones share the same cancellation token.
#[derive(Debug, Clone, Default)]
pub struct CompletionContext {
    /// Identifier used to correlate log lines for one request.
    pub request_id: Option<String>,
    /// Abort signal supplied by the caller.
    ///
    /// Providers should stop the network call when it fires, and stream
    /// adapters stop pulling further chunks.
    pub cancellation: CancellationToken,
    /// Arbitrary values middlewares may consult.
    pub metadata: HashMap<String, Value>,
}

impl CompletionContext {
    /// Creates a context with a fresh cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request identifier.
    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Uses an existing cancellation token, typically a child of a
    /// caller-wide token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns `true` once the caller has requested cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
