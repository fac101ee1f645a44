//! # toolstream-core
//!
//! Provider-agnostic vocabulary for streaming model completions.
//!
//! This crate defines what flows through a completion pipeline and how
//! middleware composes around it. It contains no network code and no
//! tool-call parsing; those live in concrete provider crates and in
//! `toolstream` respectively.
//!
//! # Architecture
//!
//! ```text
//!  caller
//!    │  CompletionContext + CompletionParams
//!    ▼
//!  CompletionPipeline ── InterceptorStack<CompletionCall>
//!    │                     (Logging → Retry → ToolUse → ...)
//!    ▼
//!  ProviderOperation ── dyn DynProvider ── network
//!    │
//!    ▼
//!  CompletionResult::Streamed(ChunkStream)  ← wrapped on the way out
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`chat`] | Conversation messages |
//! | [`chunk`] | The [`Chunk`] union, [`ChunkStream`], [`CompletionResult`] |
//! | [`context`] | Per-request [`CompletionContext`] with cancellation |
//! | [`error`] | Unified [`LlmError`] |
//! | [`intercept`] | Middleware chain: [`Interceptor`](intercept::Interceptor), [`InterceptorStack`](intercept::InterceptorStack) |
//! | [`pipeline`] | [`CompletionPipeline`]: a provider behind a stack |
//! | [`provider`] | The [`Provider`] seam, request params, tool definitions |

#![warn(missing_docs)]

pub mod chat;
pub mod chunk;
pub mod context;
pub mod error;
pub mod intercept;
pub mod pipeline;
pub mod provider;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

pub use chat::{ChatMessage, ChatRole};
pub use chunk::{Chunk, ChunkStream, CompletionResult, StopReason, ToolCallDescriptor, Usage};
pub use context::CompletionContext;
pub use error::LlmError;
pub use pipeline::CompletionPipeline;
pub use provider::{CompletionParams, DynProvider, Provider, ProviderMetadata, ToolDefinition};
