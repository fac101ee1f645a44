//! Binding an interceptor stack to a provider.
//!
//! [`CompletionPipeline`] owns a provider and an
//! [`InterceptorStack<CompletionCall>`]. It is itself a [`Provider`], so
//! pipelines nest and can be passed anywhere a provider is expected. There
//! is no process-wide instance: construct one and share it by `Arc`.
//!
//! ```rust,ignore
//! let pipeline = CompletionPipeline::new(Arc::new(my_provider))
//!     .with(Logging::default())
//!     .with(ToolUseInterceptor::default());
//!
//! let result = pipeline.complete(&ctx, &params).await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::chunk::CompletionResult;
use crate::context::CompletionContext;
use crate::error::LlmError;
use crate::intercept::{CompletionCall, Interceptor, InterceptorStack, Operation};
use crate::provider::{CompletionParams, DynProvider, Provider, ProviderMetadata};

/// Adapts a provider into the terminal [`Operation`] of a completion chain.
pub struct ProviderOperation<'p> {
    provider: &'p dyn DynProvider,
}

impl<'p> ProviderOperation<'p> {
    /// Wraps a borrowed provider.
    pub fn new(provider: &'p dyn DynProvider) -> Self {
        Self { provider }
    }
}

impl Operation<CompletionCall> for ProviderOperation<'_> {
    fn execute<'a>(
        &'a self,
        ctx: &'a CompletionContext,
        params: &'a CompletionParams,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResult, LlmError>> + Send + 'a>> {
        Box::pin(async move {
            if ctx.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            self.provider.complete_boxed(ctx, params).await
        })
    }
}

/// A provider wrapped in a middleware chain.
#[derive(Clone)]
pub struct CompletionPipeline {
    provider: Arc<dyn DynProvider>,
    interceptors: InterceptorStack<CompletionCall>,
}

impl std::fmt::Debug for CompletionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionPipeline")
            .field("provider", &self.provider.metadata())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

impl CompletionPipeline {
    /// Creates a pipeline with no interceptors.
    pub fn new(provider: Arc<dyn DynProvider>) -> Self {
        Self {
            provider,
            interceptors: InterceptorStack::new(),
        }
    }

    /// Replaces the whole interceptor stack.
    #[must_use]
    pub fn with_interceptors(mut self, interceptors: InterceptorStack<CompletionCall>) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// Appends an interceptor (innermost so far).
    #[must_use]
    pub fn with<I: Interceptor<CompletionCall> + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors = self.interceptors.with(interceptor);
        self
    }

    /// Returns the configured interceptors.
    pub fn interceptors(&self) -> &InterceptorStack<CompletionCall> {
        &self.interceptors
    }
}

impl Provider for CompletionPipeline {
    async fn complete(
        &self,
        ctx: &CompletionContext,
        params: &CompletionParams,
    ) -> Result<CompletionResult, LlmError> {
        let operation = ProviderOperation::new(self.provider.as_ref());
        self.interceptors.execute(ctx, params, &operation).await
    }

    fn metadata(&self) -> ProviderMetadata {
        self.provider.metadata()
    }
}
