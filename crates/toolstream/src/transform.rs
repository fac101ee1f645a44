//! Chunk-level tool-call extraction, independent of any async plumbing.
//!
//! [`ToolCallTransform`] maps an ordered sequence of [`Chunk`]s to another:
//! text deltas are run through a [`TagExtractor`], completed tags through a
//! [`ToolCallParser`], and everything else passes through where it stood.
//! The stream adapter and the materialized path both drive this same type.

use std::sync::Arc;

use toolstream_core::{Chunk, ToolDefinition};

use crate::parser::ToolCallParser;
use crate::tag::{ExtractionResult, TagConfig, TagExtractor};

/// Stateful chunk rewriter for one response.
#[derive(Debug, Clone)]
pub struct ToolCallTransform {
    extractor: TagExtractor,
    parser: ToolCallParser,
}

impl ToolCallTransform {
    /// Creates a transform recognizing `tags` and validating against `tools`.
    pub fn new(tags: TagConfig, tools: Arc<[ToolDefinition]>) -> Self {
        Self {
            extractor: TagExtractor::new(tags),
            parser: ToolCallParser::new(tools),
        }
    }

    /// Rewrites one upstream chunk into zero or more downstream chunks.
    ///
    /// Text is split into clean [`Chunk::TextDelta`]s and
    /// [`Chunk::ToolCallsCreated`] events; tag markers and tag bodies never
    /// appear in the output. Non-text chunks are returned unchanged.
    pub fn push(&mut self, chunk: Chunk) -> Vec<Chunk> {
        match chunk {
            Chunk::TextDelta { text } => {
                let results = self.extractor.feed(&text);
                self.resolve(results)
            }
            other => vec![other],
        }
    }

    /// Flushes withheld text and any unterminated tag at end of stream.
    ///
    /// Call once, after the last [`push`](Self::push).
    pub fn finish(&mut self) -> Vec<Chunk> {
        let results = self.extractor.finalize();
        self.resolve(results)
    }

    /// Runs the whole transform over an already collected response.
    pub fn apply(mut self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        let mut out: Vec<Chunk> = chunks
            .into_iter()
            .flat_map(|chunk| self.push(chunk))
            .collect();
        out.extend(self.finish());
        out
    }

    fn resolve(&mut self, results: Vec<ExtractionResult>) -> Vec<Chunk> {
        let mut out = Vec::with_capacity(results.len());
        for result in results {
            if result.complete {
                let Some(body) = result.tag_content_extracted else {
                    continue;
                };
                let calls = self.parser.parse(&body);
                if calls.is_empty() {
                    tracing::debug!("tool tag produced no valid calls");
                } else {
                    out.push(Chunk::ToolCallsCreated { calls });
                }
            } else if !result.is_tag_content && !result.content.is_empty() {
                out.push(Chunk::text(result.content));
            }
        }
        out
    }
}
