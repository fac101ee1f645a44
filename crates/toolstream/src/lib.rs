//! # toolstream
//!
//! Tool calling for models that only speak text.
//!
//! Many models (and most prompt-driven setups) announce a tool call by
//! writing tagged JSON into their normal output:
//!
//! ```text
//! Let me look that up.<tool_call>
//! {"name": "search", "arguments": {"q": "rust streams"}}
//! </tool_call>
//! ```
//!
//! This crate turns such a text stream into clean prose plus structured
//! [`Chunk::ToolCallsCreated`](toolstream_core::Chunk::ToolCallsCreated)
//! events, incrementally, with no read-ahead and no assumptions about where
//! the network splits the text.
//!
//! # Layers
//!
//! | Layer | Type | Async? |
//! |-------|------|--------|
//! | Tag recognition | [`TagExtractor`] | no |
//! | Payload parsing | [`ToolCallParser`] | no |
//! | Chunk rewriting | [`ToolCallTransform`] | no |
//! | Stream adapter | [`ToolCallStream`] | yes |
//! | Middleware | [`ToolUseInterceptor`] | yes |
//!
//! Most callers only touch the middleware:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use toolstream::{ToolUseConfig, ToolUseInterceptor};
//! use toolstream_core::{
//!     Chunk, CompletionContext, CompletionParams, CompletionPipeline, DynProvider, LlmError,
//!     Provider, ToolDefinition,
//! };
//!
//! async fn run(provider: Arc<dyn DynProvider>) -> Result<(), LlmError> {
//!     let pipeline = CompletionPipeline::new(provider)
//!         .with(ToolUseInterceptor::new(ToolUseConfig::default())?);
//!
//!     let params = CompletionParams {
//!         tools: Some(vec![ToolDefinition::new("search", "Search the web")]),
//!         ..Default::default()
//!     };
//!     let mut stream = pipeline
//!         .complete(&CompletionContext::new(), &params)
//!         .await?
//!         .into_stream();
//!
//!     while let Some(chunk) = stream.next().await {
//!         match chunk? {
//!             Chunk::TextDelta { text } => print!("{text}"),
//!             Chunk::ToolCallsCreated { calls } => println!("\n-> {calls:?}"),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod adapter;
pub mod config;
pub mod middleware;
pub mod parser;
pub mod prompt;
pub mod tag;
pub mod transform;

pub use adapter::ToolCallStream;
pub use config::ToolUseConfig;
pub use middleware::ToolUseInterceptor;
pub use parser::{ToolCallParser, parse_tool_calls};
pub use tag::{ExtractedText, ExtractionResult, Phase, TagConfig, TagExtractor};
pub use transform::ToolCallTransform;
