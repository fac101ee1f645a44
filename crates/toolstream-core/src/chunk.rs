//! Streaming chunk types.
//!
//! A streamed completion yields a sequence of [`Chunk`]s through a
//! [`ChunkStream`]. Chunks arrive incrementally: text deltas,
//! reasoning deltas, usage reports, and finally a
//! [`Done`](Chunk::Done) chunk with the stop reason.
//!
//! # Tool calls
//!
//! Models driven by prompt (rather than by a native tool API) announce tool
//! invocations inline, wrapped in `<tool_call>` tags. The tool-use stage
//! strips those tags out of the text and re-emits them as a single
//! [`ToolCallsCreated`](Chunk::ToolCallsCreated) chunk at the point where
//! the closing tag resolved. Consumers treat that chunk as the only signal
//! to run tools and never re-parse text for tags themselves.
//!
//! # Collecting a stream
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use toolstream_core::{Chunk, ChunkStream};
//!
//! async fn print_stream(mut stream: ChunkStream) {
//!     while let Some(chunk) = stream.next().await {
//!         match chunk {
//!             Ok(Chunk::TextDelta { text }) => print!("{text}"),
//!             Ok(Chunk::ToolCallsCreated { calls }) => println!("\n[{} tool call(s)]", calls.len()),
//!             Ok(Chunk::Done { stop_reason }) => println!("\n[done: {stop_reason:?}]"),
//!             Err(e) => eprintln!("stream error: {e}"),
//!             _ => {}
//!         }
//!     }
//! }
//! ```

use std::fmt;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;
use crate::provider::ToolDefinition;

/// A pinned, boxed, `Send` stream of [`Chunk`] results.
///
/// Finite and not restartable; the consumer drives every pull.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Chunk, LlmError>> + Send>>;

/// One discrete event in a streamed completion.
///
/// Serialized with a `type` discriminator, e.g.
/// `{"type":"text_delta","text":"hi"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Chunk {
    /// A fragment of assistant prose.
    TextDelta {
        /// The text slice.
        text: String,
    },
    /// A fragment of the model's reasoning output. Never scanned for tags.
    ReasoningDelta {
        /// The reasoning slice.
        text: String,
    },
    /// Fully parsed tool invocations detected in the text stream.
    ToolCallsCreated {
        /// The validated calls, in order of appearance.
        calls: Vec<ToolCallDescriptor>,
    },
    /// Token usage reported by the provider.
    Usage {
        /// The token counts.
        usage: Usage,
    },
    /// An error the provider reported in-band without failing the stream.
    Error {
        /// Provider-supplied description.
        message: String,
    },
    /// The model finished generating.
    Done {
        /// Why generation stopped.
        stop_reason: StopReason,
    },
}

impl Chunk {
    /// Shorthand for a [`Chunk::TextDelta`].
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    /// Returns the text if this is a [`Chunk::TextDelta`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::TextDelta { text } => Some(text),
            _ => None,
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum StopReason {
    /// The model finished its turn.
    EndTurn,
    /// The token limit was reached.
    MaxTokens,
    /// The model stopped to let tools run.
    ToolUse,
    /// A stop sequence matched.
    StopSequence,
}

/// Token counts for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt.
    pub input_tokens: u64,
    /// Tokens generated.
    pub output_tokens: u64,
}

/// A validated request to invoke one of the tools offered with the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDescriptor {
    /// Identifier for this invocation, unique within one response
    /// (`call_0`, `call_1`, ...).
    pub call_id: String,
    /// The [`ToolDefinition::id`] of the matched tool.
    pub tool_id: String,
    /// Arguments for the tool, always a JSON object.
    pub arguments: Value,
    /// The definition the call was matched against.
    pub raw_matched_tool: ToolDefinition,
}

/// What a completion handler returns.
///
/// Streaming providers hand back a lazy [`ChunkStream`]; the stream has not
/// been consumed when the handler's future resolves, so middlewares may wrap
/// it. Non-streaming providers return the chunks already collected.
pub enum CompletionResult {
    /// A lazy, not yet consumed chunk stream.
    Streamed(ChunkStream),
    /// Chunks that were produced eagerly.
    Materialized(Vec<Chunk>),
}

impl CompletionResult {
    /// Returns `true` for [`CompletionResult::Streamed`].
    pub fn is_streamed(&self) -> bool {
        matches!(self, Self::Streamed(_))
    }

    /// Converts either form into a stream.
    pub fn into_stream(self) -> ChunkStream {
        match self {
            Self::Streamed(stream) => stream,
            Self::Materialized(chunks) => {
                Box::pin(futures::stream::iter(chunks.into_iter().map(Ok)))
            }
        }
    }

    /// Drains the result, stopping at the first stream error.
    pub async fn collect(self) -> Result<Vec<Chunk>, LlmError> {
        match self {
            Self::Materialized(chunks) => Ok(chunks),
            Self::Streamed(mut stream) => {
                let mut chunks = Vec::new();
                while let Some(chunk) = stream.next().await {
                    chunks.push(chunk?);
                }
                Ok(chunks)
            }
        }
    }
}

impl fmt::Debug for CompletionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Streamed(_) => f.write_str("CompletionResult::Streamed(..)"),
            Self::Materialized(chunks) => f
                .debug_tuple("CompletionResult::Materialized")
                .field(&chunks.len())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_serializes_with_type_tag() {
        let json = serde_json::to_value(Chunk::text("hi")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "text_delta", "text": "hi"})
        );

        let done = serde_json::to_value(Chunk::Done {
            stop_reason: StopReason::EndTurn,
        })
        .unwrap();
        assert_eq!(
            done,
            serde_json::json!({"type": "done", "stop_reason": "end_turn"})
        );
    }

    #[test]
    fn test_tool_calls_created_roundtrip() {
        let chunk = Chunk::ToolCallsCreated {
            calls: vec![ToolCallDescriptor {
                call_id: "call_0".into(),
                tool_id: "search".into(),
                arguments: serde_json::json!({"q": "rust"}),
                raw_matched_tool: ToolDefinition::new("search", "Search the web"),
            }],
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains(r#""type":"tool_calls_created""#));
        let back: Chunk = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chunk);
    }

    #[test]
    fn test_as_text() {
        assert_eq!(Chunk::text("a").as_text(), Some("a"));
        assert_eq!(Chunk::ReasoningDelta { text: "r".into() }.as_text(), None);
    }

    #[test]
    fn test_chunk_stream_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ChunkStream>();
        assert_send::<CompletionResult>();
    }

    #[tokio::test]
    async fn test_materialized_into_stream() {
        let result = CompletionResult::Materialized(vec![Chunk::text("a"), Chunk::text("b")]);
        assert!(!result.is_streamed());
        let collected = CompletionResult::Streamed(result.into_stream())
            .collect()
            .await
            .unwrap();
        assert_eq!(collected, vec![Chunk::text("a"), Chunk::text("b")]);
    }

    #[tokio::test]
    async fn test_collect_stops_at_error() {
        let items = vec![
            Ok(Chunk::text("partial")),
            Err(LlmError::Http {
                status: Some(http::StatusCode::BAD_GATEWAY),
                message: "upstream reset".into(),
                retryable: true,
            }),
            Ok(Chunk::text("never seen")),
        ];
        let stream: ChunkStream = Box::pin(futures::stream::iter(items));
        let err = CompletionResult::Streamed(stream)
            .collect()
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Http { .. }));
    }

    #[test]
    fn test_debug_does_not_consume_stream() {
        let result = CompletionResult::Streamed(Box::pin(futures::stream::empty()));
        assert_eq!(format!("{result:?}"), "CompletionResult::Streamed(..)");
    }
}
