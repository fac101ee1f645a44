//! Provider trait and request types.
//!
//! This module defines the seam between the pipeline and whatever
//! actually talks to a model:
//!
//! - **[`Provider`]**: the trait every backend implements, using native
//!   async-fn-in-traits.
//! - **[`DynProvider`]**: an object-safe mirror with boxed futures. A
//!   blanket `impl<T: Provider> DynProvider for T` bridges the two, so any
//!   provider can be stored as `Arc<dyn DynProvider>`.
//!
//! Concrete network clients are not part of this crate. They only need to
//! turn a [`CompletionParams`] into a [`CompletionResult`], honoring the
//! cancellation token in the [`CompletionContext`].

use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::ChatMessage;
use crate::chunk::CompletionResult;
use crate::context::CompletionContext;
use crate::error::LlmError;

/// The core trait every completion backend implements.
///
/// Cross-cutting concerns (retries, timeouts, logging, tool-call
/// extraction) belong in interceptors, keeping backends focused on
/// request mapping.
pub trait Provider: Send + Sync {
    /// Performs a completion. Streaming backends return
    /// [`CompletionResult::Streamed`] without consuming the stream.
    fn complete(
        &self,
        ctx: &CompletionContext,
        params: &CompletionParams,
    ) -> impl Future<Output = Result<CompletionResult, LlmError>> + Send;

    /// Returns static metadata describing this provider instance.
    fn metadata(&self) -> ProviderMetadata;
}

/// Object-safe counterpart of [`Provider`] for dynamic dispatch.
///
/// You rarely implement this directly: the blanket impl covers every
/// [`Provider`].
pub trait DynProvider: Send + Sync {
    /// Boxed-future version of [`Provider::complete`].
    fn complete_boxed<'a>(
        &'a self,
        ctx: &'a CompletionContext,
        params: &'a CompletionParams,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResult, LlmError>> + Send + 'a>>;

    /// Returns static metadata describing this provider instance.
    fn metadata(&self) -> ProviderMetadata;
}

impl<T: Provider> DynProvider for T {
    fn complete_boxed<'a>(
        &'a self,
        ctx: &'a CompletionContext,
        params: &'a CompletionParams,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResult, LlmError>> + Send + 'a>> {
        Box::pin(self.complete(ctx, params))
    }

    fn metadata(&self) -> ProviderMetadata {
        Provider::metadata(self)
    }
}

/// Describes a provider instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Human-readable provider name.
    pub name: Cow<'static, str>,
    /// The model identifier.
    pub model: String,
}

/// Parameters for a completion request.
///
/// Use struct-update syntax for concise construction:
///
/// ```rust
/// use toolstream_core::{ChatMessage, CompletionParams};
///
/// let params = CompletionParams {
///     messages: vec![ChatMessage::user("Hello")],
///     max_tokens: Some(256),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Conversation history, oldest first.
    pub messages: Vec<ChatMessage>,
    /// System prompt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Tools the model may call, in the order they are offered.
    ///
    /// `None` or an empty list disables the tool-call stage entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Upper bound on generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Arbitrary values forwarded to the provider.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl CompletionParams {
    /// Returns the offered tools, or `None` when there are none.
    pub fn active_tools(&self) -> Option<&[ToolDefinition]> {
        self.tools.as_deref().filter(|tools| !tools.is_empty())
    }
}

/// A tool the model may invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name the model uses to refer to it.
    pub id: String,
    /// What the tool does, shown to the model.
    pub description: String,
    /// JSON Schema for the tool's arguments.
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Creates a definition that accepts any object.
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            input_schema: empty_object_schema(),
        }
    }

    /// Replaces the input schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object"})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_default() {
        let p = CompletionParams::default();
        assert!(p.messages.is_empty());
        assert!(p.tools.is_none());
        assert!(p.active_tools().is_none());
    }

    #[test]
    fn test_active_tools_ignores_empty_list() {
        let p = CompletionParams {
            tools: Some(Vec::new()),
            ..Default::default()
        };
        assert!(p.active_tools().is_none());

        let p = CompletionParams {
            tools: Some(vec![ToolDefinition::new("search", "Search")]),
            ..Default::default()
        };
        assert_eq!(p.active_tools().map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_params_skip_empty_fields() {
        let p = CompletionParams {
            messages: vec![ChatMessage::user("hi")],
            ..Default::default()
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"messages": [{"role": "user", "content": "hi"}]})
        );
    }

    #[test]
    fn test_tool_definition_schema_defaults() {
        let tool: ToolDefinition =
            serde_json::from_str(r#"{"id": "now", "description": "Current time"}"#).unwrap();
        assert_eq!(tool.input_schema, serde_json::json!({"type": "object"}));

        let tool = ToolDefinition::new("add", "Add numbers").with_schema(serde_json::json!({
            "type": "object",
            "properties": {"a": {"type": "number"}}
        }));
        assert!(tool.input_schema["properties"]["a"].is_object());
    }
}
