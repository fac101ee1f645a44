//! The error type shared by providers and middleware.
//!
//! Every link in a completion chain returns [`LlmError`], so a caller has a
//! single enum to match no matter which backend or interceptor gave up.
//!
//! Problems the tool-call stage can recover from are not errors. A
//! malformed `<tool_call>` payload, an unknown tool name, or a tag still
//! open when the stream ends are all dealt with locally and never show up
//! here.
//!
//! ```rust
//! use toolstream_core::LlmError;
//!
//! assert!(LlmError::Timeout { elapsed_ms: 5000 }.is_retryable());
//! assert!(!LlmError::Auth("bad key".into()).is_retryable());
//! ```

/// Why a completion failed.
///
/// Marked `#[non_exhaustive]`; match with a wildcard arm.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LlmError {
    /// Transport failure or an unexpected status code.
    #[error("http failure (status {status:?}): {message}")]
    Http {
        /// `None` when no response arrived at all.
        status: Option<http::StatusCode>,
        /// Details from the transport or response body.
        message: String,
        /// Set when repeating the request could help.
        retryable: bool,
    },

    /// Credentials were refused.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The request, or a configuration value, cannot be used as given.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A backend failure with no closer match among the other variants.
    #[error("provider failure [{code}]: {message}")]
    Provider {
        /// Backend-specific code such as `"overloaded"`.
        code: String,
        /// Details as reported by the backend.
        message: String,
        /// Set when repeating the request could help.
        retryable: bool,
    },

    /// A response or configuration document did not parse.
    #[error("malformed response: {message}")]
    ResponseFormat {
        /// Parser diagnostics.
        message: String,
        /// Offending input, possibly empty.
        raw: String,
    },

    /// A deadline passed before the call finished.
    #[error("timed out after {elapsed_ms}ms")]
    Timeout {
        /// Length of the deadline that fired.
        elapsed_ms: u64,
    },

    /// The request was cancelled before the provider answered.
    #[error("request cancelled")]
    Cancelled,

    /// Every allowed attempt failed.
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Attempts made, the first one included.
        attempts: u32,
        /// Failure of the last attempt.
        #[source]
        last_error: Box<LlmError>,
    },
}

impl LlmError {
    /// `true` for transient failures worth another attempt.
    ///
    /// `Http` and `Provider` report their own flag. Timeouts always count,
    /// cancellation never does.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { retryable, .. } | Self::Provider { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::ResponseFormat {
            message: err.to_string(),
            raw: String::new(),
        }
    }
}
