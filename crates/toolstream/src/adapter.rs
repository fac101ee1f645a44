//! Pull-based stream adapter around [`ToolCallTransform`].
//!
//! [`ToolCallStream`] consumes an upstream [`ChunkStream`] on demand and
//! yields the transformed chunks. Nothing is read ahead: one upstream chunk
//! is pulled only when every chunk derived from the previous one has been
//! handed to the consumer.
//!
//! Termination rules:
//!
//! - clean upstream end: [`ToolCallTransform::finish`] runs once and its
//!   output is yielded before the stream ends
//! - upstream `Err`: forwarded unchanged, then the stream ends without
//!   finishing (no tool calls are synthesized from a failed response)
//! - cancellation token fired: the stream ends at the next pull and the
//!   upstream is dropped without finishing

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use toolstream_core::{Chunk, ChunkStream, LlmError};

use crate::transform::ToolCallTransform;

/// A [`ChunkStream`] with tool-call extraction applied.
pub struct ToolCallStream {
    inner: ChunkStream,
}

impl std::fmt::Debug for ToolCallStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCallStream").finish_non_exhaustive()
    }
}

impl ToolCallStream {
    /// Wraps `upstream`, ending early if `cancellation` fires.
    pub fn new(
        upstream: ChunkStream,
        transform: ToolCallTransform,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        let state = AdapterState {
            phase: AdapterPhase::Streaming(upstream),
            transform,
            queue: VecDeque::new(),
            cancellation,
        };

        let inner = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(chunk) = state.queue.pop_front() {
                    return Some((Ok(chunk), state));
                }
                match std::mem::replace(&mut state.phase, AdapterPhase::Done) {
                    AdapterPhase::Done => return None,
                    AdapterPhase::Streaming(mut upstream) => {
                        match pull(&mut upstream, state.cancellation.as_ref()).await {
                            Pulled::Item(Ok(chunk)) => {
                                let out = state.transform.push(chunk);
                                state.queue.extend(out);
                                state.phase = AdapterPhase::Streaming(upstream);
                            }
                            Pulled::Item(Err(e)) => {
                                tracing::debug!(error = %e, "upstream failed mid-stream");
                                return Some((Err(e), state));
                            }
                            Pulled::End => {
                                let out = state.transform.finish();
                                state.queue.extend(out);
                            }
                            Pulled::Cancelled => {
                                tracing::debug!("tool call stream cancelled");
                                return None;
                            }
                        }
                    }
                }
            }
        });

        Self {
            inner: Box::pin(inner),
        }
    }

    /// Boxes the adapter as a plain [`ChunkStream`].
    pub fn into_chunk_stream(self) -> ChunkStream {
        Box::pin(self)
    }
}

impl Stream for ToolCallStream {
    type Item = Result<Chunk, LlmError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

struct AdapterState {
    phase: AdapterPhase,
    transform: ToolCallTransform,
    queue: VecDeque<Chunk>,
    cancellation: Option<CancellationToken>,
}

enum AdapterPhase {
    Streaming(ChunkStream),
    Done,
}

enum Pulled {
    Item(Result<Chunk, LlmError>),
    End,
    Cancelled,
}

async fn pull(upstream: &mut ChunkStream, cancellation: Option<&CancellationToken>) -> Pulled {
    let Some(token) = cancellation else {
        return upstream.next().await.map_or(Pulled::End, Pulled::Item);
    };
    tokio::select! {
        biased;
        () = token.cancelled() => Pulled::Cancelled,
        item = upstream.next() => item.map_or(Pulled::End, Pulled::Item),
    }
}
