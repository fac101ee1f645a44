//! Builders and collectors for tests that handle chunks and providers.
//!
//! Available with the `test-utils` feature so downstream crates can reuse
//! them; also compiled for this crate's own tests.

use std::borrow::Cow;

use futures::StreamExt;

use crate::chunk::{Chunk, ChunkStream, CompletionResult, StopReason};
use crate::error::LlmError;
use crate::mock::MockProvider;
use crate::provider::{ProviderMetadata, ToolDefinition};

/// Builds one [`Chunk::TextDelta`] per fragment.
pub fn text_chunks(fragments: &[&str]) -> Vec<Chunk> {
    fragments.iter().map(|text| Chunk::text(*text)).collect()
}

/// A [`Chunk::Done`] with [`StopReason::EndTurn`].
pub fn done_chunk() -> Chunk {
    Chunk::Done {
        stop_reason: StopReason::EndTurn,
    }
}

/// A tool definition accepting any object.
pub fn sample_tool(id: &str) -> ToolDefinition {
    ToolDefinition::new(id, format!("Test tool {id}"))
}

/// A stream over the given chunks.
pub fn chunk_stream(chunks: Vec<Chunk>) -> ChunkStream {
    Box::pin(futures::stream::iter(chunks.into_iter().map(Ok)))
}

/// Every item of `stream`, errors included.
pub async fn collect_stream_results(stream: ChunkStream) -> Vec<Result<Chunk, LlmError>> {
    stream.collect::<Vec<_>>().await
}

/// Every chunk of `stream`. Panics on an error item;
/// use [`collect_stream_results`] to inspect failures.
pub async fn collect_stream(stream: ChunkStream) -> Vec<Chunk> {
    stream
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .map(|r| r.expect("stream item should be Ok"))
        .collect()
}

/// Collect either form of [`CompletionResult`], panicking on any error.
pub async fn collect_result(result: CompletionResult) -> Vec<Chunk> {
    result.collect().await.expect("completion should succeed")
}

/// Concatenates the text of every [`Chunk::TextDelta`].
pub fn joined_text(chunks: &[Chunk]) -> String {
    chunks.iter().filter_map(Chunk::as_text).collect()
}

/// Creates a [`MockProvider`] named `mock`.
pub fn mock_provider() -> MockProvider {
    MockProvider::new(ProviderMetadata {
        name: Cow::Borrowed("mock"),
        model: "test-model".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_chunks_and_join() {
        let chunks = text_chunks(&["a", "b", "c"]);
        assert_eq!(chunks.len(), 3);
        assert_eq!(joined_text(&chunks), "abc");
    }

    #[test]
    fn test_joined_text_skips_other_chunks() {
        let chunks = vec![
            Chunk::text("x"),
            Chunk::ReasoningDelta {
                text: "hidden".into(),
            },
            done_chunk(),
            Chunk::text("y"),
        ];
        assert_eq!(joined_text(&chunks), "xy");
    }

    #[tokio::test]
    async fn test_collect_stream_empty() {
        assert!(collect_stream(chunk_stream(Vec::new())).await.is_empty());
    }

    #[test]
    fn test_sample_tool() {
        let tool = sample_tool("search");
        assert_eq!(tool.id, "search");
        assert!(tool.description.contains("search"));
    }
}
