//! The tool-use interceptor.
//!
//! [`ToolUseInterceptor`] attaches tool-call extraction to every completion
//! that offers tools. It never performs the completion itself: it may
//! rewrite the outgoing params, calls the rest of the chain, and wraps
//! whatever comes back.
//!
//! ```rust,ignore
//! let pipeline = CompletionPipeline::new(provider)
//!     .with(Logging::default())
//!     .with(ToolUseInterceptor::new(ToolUseConfig::default())?);
//!
//! let stream = pipeline.complete(&ctx, &params).await?.into_stream();
//! // TextDelta chunks are free of tags; tool calls arrive as ToolCallsCreated
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use toolstream_core::intercept::{CompletionCall, Interceptor, Next};
use toolstream_core::{
    CompletionContext, CompletionParams, CompletionResult, LlmError, ToolDefinition,
};

use crate::adapter::ToolCallStream;
use crate::config::ToolUseConfig;
use crate::prompt::render_tool_prompt;
use crate::transform::ToolCallTransform;

/// Extracts tagged tool calls from completions that offer tools.
///
/// Requests without tools pass through untouched, and so do their results.
#[derive(Debug, Clone, Default)]
pub struct ToolUseInterceptor {
    config: ToolUseConfig,
}

impl ToolUseInterceptor {
    /// Creates the interceptor.
    ///
    /// # Errors
    ///
    /// [`LlmError::InvalidRequest`] if the tag pair is unusable.
    pub fn new(config: ToolUseConfig) -> Result<Self, LlmError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The active configuration.
    pub fn config(&self) -> &ToolUseConfig {
        &self.config
    }

    /// Params actually sent downstream when the system prompt is injected.
    fn prompted_params(
        &self,
        params: &CompletionParams,
        tools: &[ToolDefinition],
    ) -> CompletionParams {
        let prompt = render_tool_prompt(
            self.config.prompt_template.as_deref(),
            tools,
            &self.config.tags,
        );
        let system = match params.system.as_deref() {
            Some(existing) if !existing.trim().is_empty() => format!("{prompt}\n\n{existing}"),
            _ => prompt,
        };
        CompletionParams {
            system: Some(system),
            tools: None,
            ..params.clone()
        }
    }

    fn wrap(
        &self,
        result: CompletionResult,
        tools: Arc<[ToolDefinition]>,
        ctx: &CompletionContext,
    ) -> CompletionResult {
        let transform = ToolCallTransform::new(self.config.tags.clone(), tools);
        match result {
            CompletionResult::Streamed(upstream) => CompletionResult::Streamed(
                ToolCallStream::new(upstream, transform, Some(ctx.cancellation.clone()))
                    .into_chunk_stream(),
            ),
            CompletionResult::Materialized(chunks) => {
                CompletionResult::Materialized(transform.apply(chunks))
            }
        }
    }
}

impl Interceptor<CompletionCall> for ToolUseInterceptor {
    fn intercept<'a>(
        &'a self,
        ctx: &'a CompletionContext,
        params: &'a CompletionParams,
        next: Next<'a, CompletionCall>,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResult, LlmError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(offered) = params.active_tools() else {
                tracing::trace!("no tools offered, skipping tool-call extraction");
                return next.run(ctx, params).await;
            };
            let tools: Arc<[ToolDefinition]> = offered.into();

            let result = if self.config.inject_system_prompt {
                let prompted = self.prompted_params(params, &tools);
                next.run(ctx, &prompted).await?
            } else {
                next.run(ctx, params).await?
            };

            tracing::debug!(
                tools = tools.len(),
                streamed = result.is_streamed(),
                "attaching tool-call extraction"
            );
            Ok(self.wrap(result, tools, ctx))
        })
    }
}
