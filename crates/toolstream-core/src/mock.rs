//! A scripted [`Provider`] for tests.
//!
//! [`MockProvider`] answers each `complete` call with the next scripted
//! response: a chunk stream, a materialized chunk list, or an error. It
//! never touches the network and works behind `Arc<dyn DynProvider>` like
//! any other provider.
//!
//! Scripted failures are written as [`MockError`]. [`LlmError`] is not
//! `Clone`, while a script has to be inspectable and cheap to duplicate,
//! so the conversion happens only when a response is handed out.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::chunk::{Chunk, ChunkStream, CompletionResult};
use crate::context::CompletionContext;
use crate::error::LlmError;
use crate::provider::{CompletionParams, Provider, ProviderMetadata};

/// One queued answer.
#[derive(Debug, Clone)]
enum Queued {
    Stream(Vec<Result<Chunk, MockError>>),
    Materialized(Vec<Chunk>),
    Error(MockError),
}

/// Provider that replays scripted responses in order.
///
/// Params of every call are kept for [`recorded_calls`](Self::recorded_calls).
/// Running out of script is an [`LlmError::InvalidRequest`].
pub struct MockProvider {
    script: Mutex<VecDeque<Queued>>,
    meta: ProviderMetadata,
    calls: Arc<Mutex<Vec<CompletionParams>>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A scripted failure. Each variant becomes the [`LlmError`] of the same name.
#[derive(Debug, Clone)]
pub enum MockError {
    /// See [`LlmError::Http`].
    Http {
        /// Status, or `None` for a transport failure.
        status: Option<http::StatusCode>,
        /// Failure details.
        message: String,
        /// Copied to [`LlmError::Http`].
        retryable: bool,
    },
    /// See [`LlmError::Auth`].
    Auth(String),
    /// See [`LlmError::Provider`].
    Provider {
        /// Backend code.
        code: String,
        /// Failure details.
        message: String,
        /// Copied to [`LlmError::Provider`].
        retryable: bool,
    },
    /// See [`LlmError::Timeout`].
    Timeout {
        /// Deadline in milliseconds.
        elapsed_ms: u64,
    },
}

impl From<MockError> for LlmError {
    fn from(err: MockError) -> Self {
        match err {
            MockError::Http {
                status,
                message,
                retryable,
            } => LlmError::Http {
                status,
                message,
                retryable,
            },
            MockError::Auth(msg) => LlmError::Auth(msg),
            MockError::Provider {
                code,
                message,
                retryable,
            } => LlmError::Provider {
                code,
                message,
                retryable,
            },
            MockError::Timeout { elapsed_ms } => LlmError::Timeout { elapsed_ms },
        }
    }
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("provider", &self.meta.name)
            .field("queued", &locked(&self.script).len())
            .field("calls", &locked(&self.calls).len())
            .finish()
    }
}

impl MockProvider {
    /// An empty script reporting `meta`.
    pub fn new(meta: ProviderMetadata) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            meta,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Next answer: `chunks` as a lazy stream.
    pub fn queue_stream(&self, chunks: Vec<Chunk>) -> &Self {
        self.push(Queued::Stream(chunks.into_iter().map(Ok).collect()))
    }

    /// Next answer: a stream of `items`, errors included.
    pub fn queue_stream_results(&self, items: Vec<Result<Chunk, MockError>>) -> &Self {
        self.push(Queued::Stream(items))
    }

    /// Next answer: `chunks`, already materialized.
    pub fn queue_materialized(&self, chunks: Vec<Chunk>) -> &Self {
        self.push(Queued::Materialized(chunks))
    }

    /// Next answer: `complete` itself fails with `error`.
    pub fn queue_error(&self, error: MockError) -> &Self {
        self.push(Queued::Error(error))
    }

    /// Params of every `complete` call so far, oldest first.
    pub fn recorded_calls(&self) -> Vec<CompletionParams> {
        locked(&self.calls).clone()
    }

    fn push(&self, queued: Queued) -> &Self {
        locked(&self.script).push_back(queued);
        self
    }
}

impl Provider for MockProvider {
    async fn complete(
        &self,
        _ctx: &CompletionContext,
        params: &CompletionParams,
    ) -> Result<CompletionResult, LlmError> {
        locked(&self.calls).push(params.clone());
        let scripted = locked(&self.script).pop_front();
        match scripted {
            Some(Queued::Stream(items)) => {
                let items = items.into_iter().map(|item| item.map_err(LlmError::from));
                let stream: ChunkStream = Box::pin(futures::stream::iter(items));
                Ok(CompletionResult::Streamed(stream))
            }
            Some(Queued::Materialized(chunks)) => Ok(CompletionResult::Materialized(chunks)),
            Some(Queued::Error(error)) => Err(error.into()),
            None => Err(LlmError::InvalidRequest("mock script exhausted".into())),
        }
    }

    fn metadata(&self) -> ProviderMetadata {
        self.meta.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{collect_result, mock_provider, text_chunks};
    use futures::StreamExt;

    async fn call(mock: &MockProvider) -> Result<CompletionResult, LlmError> {
        mock.complete(&CompletionContext::new(), &CompletionParams::default())
            .await
    }

    #[tokio::test]
    async fn answers_follow_script_order() {
        let mock = mock_provider();
        mock.queue_materialized(text_chunks(&["one"]))
            .queue_stream(text_chunks(&["two", "three"]));

        let first = call(&mock).await.unwrap();
        let second = call(&mock).await.unwrap();

        assert!(!first.is_streamed());
        assert!(second.is_streamed());
        assert_eq!(collect_result(first).await, text_chunks(&["one"]));
        assert_eq!(collect_result(second).await, text_chunks(&["two", "three"]));
    }

    #[tokio::test]
    async fn scripted_error_fails_the_call() {
        let mock = mock_provider();
        mock.queue_error(MockError::Provider {
            code: "overloaded".into(),
            message: "busy".into(),
            retryable: true,
        });

        let err = call(&mock).await.unwrap_err();
        assert!(matches!(err, LlmError::Provider { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn stream_can_fail_midway() {
        let mock = mock_provider();
        mock.queue_stream_results(vec![
            Ok(Chunk::text("partial")),
            Err(MockError::Timeout { elapsed_ms: 30 }),
        ]);

        let items: Vec<_> = call(&mock).await.unwrap().into_stream().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().ok(), Some(&Chunk::text("partial")));
        assert!(matches!(items[1], Err(LlmError::Timeout { elapsed_ms: 30 })));
    }

    #[tokio::test]
    async fn exhausted_script_is_invalid_request() {
        let mock = mock_provider();
        assert!(matches!(call(&mock).await, Err(LlmError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn every_call_is_recorded() {
        let mock = mock_provider();
        let params = CompletionParams {
            system: Some("be brief".into()),
            ..Default::default()
        };
        let _ = mock.complete(&CompletionContext::new(), &params).await;
        let _ = call(&mock).await;

        assert_eq!(
            mock.recorded_calls(),
            vec![params, CompletionParams::default()]
        );
    }

    #[test]
    fn debug_shows_pending_answers() {
        let mock = mock_provider();
        mock.queue_stream(Vec::new()).queue_materialized(Vec::new());
        let shown = format!("{mock:?}");
        assert!(shown.contains("queued: 2"), "{shown}");
        assert!(shown.contains("calls: 0"), "{shown}");
    }
}
