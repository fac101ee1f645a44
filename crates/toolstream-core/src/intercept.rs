//! Onion-style middleware around a terminal operation.
//!
//! A stack is an ordered list of [`Interceptor`]s in front of one
//! [`Operation`]. Each link gets the request context, the input, and a
//! [`Next`] handle for everything further in. From there it can forward
//! untouched, forward a modified input, answer on its own, or forward and
//! then rewrite what comes back (for completions that includes swapping a
//! lazy chunk stream for a derived one).
//!
//! ```text
//! InterceptorStack::new()
//!     .with(Logging::default())      // first added: sees params first, result last
//!     .with(Retry::default())
//!     .with(ToolUseInterceptor)      // last added: sits right on top of the provider
//!     .execute(&ctx, &params, &operation)
//! ```
//!
//! Links share nothing except what they pass along. An `Err` produced
//! anywhere travels outward through every remaining link unless one of them
//! handles it.
//!
//! The stack is generic over an [`Interceptable`] domain, so the same
//! machinery serves [`CompletionCall`] and whatever small domains tests
//! define. [`Retry`], [`Timeout`] and [`Logging`] work for any domain whose
//! types implement the matching trait from [`behavior`].

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

pub use behavior::{Loggable, Outcome, Retryable, Timeoutable};
pub use domain::CompletionCall;

/// Boxed future returned by interceptors and operations.
pub type InterceptFuture<'a, T> =
    Pin<Box<dyn Future<Output = <T as Interceptable>::Output> + Send + 'a>>;

/// Names the three types a chain works with.
///
/// Implemented by zero-sized marker types, one per domain.
pub trait Interceptable: Send + Sync + 'static {
    /// Per-request state every link can read.
    type Context: Send + Sync;
    /// What flows inward.
    type Input: Send + Sync;
    /// What flows back out.
    type Output: Send;
}

/// One link in a chain.
///
/// `next` is `Copy`, so a link may also run the rest of the chain more
/// than once.
///
/// ```rust,ignore
/// use toolstream_core::intercept::{CompletionCall, Interceptor, Next};
///
/// struct Tagger;
///
/// impl Interceptor<CompletionCall> for Tagger {
///     fn intercept<'a>(
///         &'a self,
///         ctx: &'a CompletionContext,
///         params: &'a CompletionParams,
///         next: Next<'a, CompletionCall>,
///     ) -> Pin<Box<dyn Future<Output = Result<CompletionResult, LlmError>> + Send + 'a>> {
///         Box::pin(async move {
///             let mut tagged = params.clone();
///             tagged.metadata.insert("tagged".into(), true.into());
///             next.run(ctx, &tagged).await
///         })
///     }
/// }
/// ```
pub trait Interceptor<T: Interceptable>: Send + Sync {
    /// Handles one call. Skip `next.run` to answer without going further in.
    fn intercept<'a>(
        &'a self,
        ctx: &'a T::Context,
        input: &'a T::Input,
        next: Next<'a, T>,
    ) -> Pin<Box<dyn Future<Output = T::Output> + Send + 'a>>;
}

/// The part of the chain inside the current link.
pub struct Next<'a, T: Interceptable> {
    rest: &'a [Arc<dyn Interceptor<T>>],
    terminal: &'a dyn Operation<T>,
}

impl<T: Interceptable> Clone for Next<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Interceptable> Copy for Next<'_, T> {}

impl<T: Interceptable> Next<'_, T> {
    /// Runs the remaining links, then the operation.
    pub async fn run(self, ctx: &T::Context, input: &T::Input) -> T::Output {
        match self.rest.split_first() {
            Some((link, rest)) => {
                let next = Next {
                    rest,
                    terminal: self.terminal,
                };
                link.intercept(ctx, input, next).await
            }
            None => self.terminal.execute(ctx, input).await,
        }
    }

    /// How many links are left before the operation.
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}

/// What the chain ultimately calls.
pub trait Operation<T: Interceptable>: Send + Sync {
    /// Performs the call.
    fn execute<'a>(
        &'a self,
        ctx: &'a T::Context,
        input: &'a T::Input,
    ) -> Pin<Box<dyn Future<Output = T::Output> + Send + 'a>>;
}

/// An [`Operation`] backed by a closure.
pub struct FnOperation<T, F>
where
    T: Interceptable,
    F: for<'a> Fn(&'a T::Context, &'a T::Input) -> InterceptFuture<'a, T> + Send + Sync,
{
    f: F,
    _domain: PhantomData<T>,
}

impl<T, F> FnOperation<T, F>
where
    T: Interceptable,
    F: for<'a> Fn(&'a T::Context, &'a T::Input) -> InterceptFuture<'a, T> + Send + Sync,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _domain: PhantomData,
        }
    }
}

impl<T, F> Operation<T> for FnOperation<T, F>
where
    T: Interceptable,
    F: for<'a> Fn(&'a T::Context, &'a T::Input) -> InterceptFuture<'a, T> + Send + Sync,
{
    fn execute<'a>(&'a self, ctx: &'a T::Context, input: &'a T::Input) -> InterceptFuture<'a, T> {
        (self.f)(ctx, input)
    }
}

/// An ordered, cheaply cloneable list of interceptors.
///
/// The first link added is the outermost one.
pub struct InterceptorStack<T: Interceptable> {
    links: Vec<Arc<dyn Interceptor<T>>>,
}

impl<T: Interceptable> Clone for InterceptorStack<T> {
    fn clone(&self) -> Self {
        Self {
            links: self.links.clone(),
        }
    }
}

impl<T: Interceptable> std::fmt::Debug for InterceptorStack<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorStack")
            .field("links", &self.links.len())
            .finish()
    }
}

impl<T: Interceptable> Default for InterceptorStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Interceptable> InterceptorStack<T> {
    /// An empty stack: `execute` calls the operation directly.
    pub fn new() -> Self {
        Self { links: Vec::new() }
    }

    /// Appends `interceptor` inside every link added so far.
    #[must_use]
    pub fn with<I: Interceptor<T> + 'static>(self, interceptor: I) -> Self {
        self.with_shared(Arc::new(interceptor))
    }

    /// Appends an interceptor that may also sit in other stacks.
    #[must_use]
    pub fn with_shared(mut self, interceptor: Arc<dyn Interceptor<T>>) -> Self {
        self.links.push(interceptor);
        self
    }

    /// `true` when no links were added.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Number of links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Runs `input` through every link and then `operation`.
    pub async fn execute<'a, O>(
        &'a self,
        ctx: &'a T::Context,
        input: &'a T::Input,
        operation: &'a O,
    ) -> T::Output
    where
        O: Operation<T>,
    {
        Next {
            rest: &self.links,
            terminal: operation,
        }
        .run(ctx, input)
        .await
    }

    /// Like [`execute`](Self::execute) with a closure as the operation.
    pub async fn execute_fn<'a, F>(
        &'a self,
        ctx: &'a T::Context,
        input: &'a T::Input,
        f: F,
    ) -> T::Output
    where
        F: for<'b> Fn(&'b T::Context, &'b T::Input) -> InterceptFuture<'b, T> + Send + Sync,
    {
        self.execute(ctx, input, &FnOperation::<T, F>::new(f)).await
    }
}

/// Marker types for the domains this crate defines.
pub mod domain {
    use super::Interceptable;
    use crate::chunk::CompletionResult;
    use crate::context::CompletionContext;
    use crate::error::LlmError;
    use crate::provider::CompletionParams;

    /// A model completion: [`CompletionContext`] and [`CompletionParams`]
    /// in, `Result<CompletionResult, LlmError>` out.
    ///
    /// See [`CompletionPipeline`](crate::pipeline::CompletionPipeline).
    pub struct CompletionCall;

    impl Interceptable for CompletionCall {
        type Context = CompletionContext;
        type Input = CompletionParams;
        type Output = Result<CompletionResult, LlmError>;
    }
}

/// Capabilities the generic interceptors need from a domain.
pub mod behavior {
    use std::time::Duration;

    use crate::chunk::CompletionResult;
    use crate::error::LlmError;
    use crate::provider::CompletionParams;

    /// Lets [`Retry`](super::Retry) decide whether to go again.
    pub trait Retryable: Sized {
        /// `true` if another attempt could succeed.
        fn should_retry(&self) -> bool;

        /// What to report when the last of `attempts` tries still asked for
        /// a retry. Unchanged by default.
        fn exhausted(self, attempts: u32) -> Self {
            let _ = attempts;
            self
        }
    }

    /// Lets [`Timeout`](super::Timeout) build its failure value.
    pub trait Timeoutable: Sized {
        /// The output reported when `limit` was exceeded.
        fn timeout_error(limit: Duration) -> Self;
    }

    /// Lets [`Logging`](super::Logging) describe an input.
    pub trait Loggable {
        /// Short human-readable summary.
        fn log_description(&self) -> String;
    }

    /// Lets [`Logging`](super::Logging) report how a call ended.
    ///
    /// A failure is not necessarily retryable, hence a separate trait.
    pub trait Outcome {
        /// `true` for a successful call.
        fn is_success(&self) -> bool;
    }

    impl Retryable for Result<CompletionResult, LlmError> {
        fn should_retry(&self) -> bool {
            self.as_ref().err().is_some_and(LlmError::is_retryable)
        }

        fn exhausted(self, attempts: u32) -> Self {
            self.map_err(|last_error| LlmError::RetryExhausted {
                attempts,
                last_error: Box::new(last_error),
            })
        }
    }

    impl Timeoutable for Result<CompletionResult, LlmError> {
        fn timeout_error(limit: Duration) -> Self {
            Err(LlmError::Timeout {
                elapsed_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }

    impl Outcome for Result<CompletionResult, LlmError> {
        fn is_success(&self) -> bool {
            self.is_ok()
        }
    }

    impl Loggable for CompletionParams {
        fn log_description(&self) -> String {
            format!(
                "{} messages, {} tools, system prompt: {}",
                self.messages.len(),
                self.tools.as_ref().map_or(0, Vec::len),
                self.system.is_some(),
            )
        }
    }
}

/// Interceptors that work for any domain.
pub mod interceptors {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    #[cfg(feature = "tracing")]
    use super::behavior::{Loggable, Outcome};
    use super::behavior::{Retryable, Timeoutable};
    use super::{Interceptable, Interceptor, Next};

    /// Re-runs the inner chain with exponential backoff while the output
    /// asks for it.
    ///
    /// A failure that is still retryable after the last attempt goes
    /// through [`Retryable::exhausted`]; completions report it as
    /// [`LlmError::RetryExhausted`](crate::error::LlmError::RetryExhausted).
    ///
    /// For completions this covers getting a result at all. A stream that
    /// has already been handed out is never replayed; errors inside it
    /// reach the consumer.
    #[derive(Debug, Clone)]
    pub struct Retry {
        /// Total attempts, the first one included.
        pub max_attempts: u32,
        /// Pause after the first failure.
        pub initial_delay: Duration,
        /// Upper bound for any single pause.
        pub max_delay: Duration,
        /// Growth factor between consecutive pauses.
        pub multiplier: f64,
    }

    impl Default for Retry {
        fn default() -> Self {
            Self {
                max_attempts: 3,
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(30),
                multiplier: 2.0,
            }
        }
    }

    impl Retry {
        /// `max_attempts` tries, starting at `initial_delay` between them.
        pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
            Self {
                max_attempts,
                initial_delay,
                ..Default::default()
            }
        }

        /// Pause after failed attempt number `attempt` (1-based).
        pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
            let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
            let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
            Duration::try_from_secs_f64(secs).map_or(self.max_delay, |d| d.min(self.max_delay))
        }
    }

    impl<T> Interceptor<T> for Retry
    where
        T: Interceptable,
        T::Output: Retryable,
    {
        fn intercept<'a>(
            &'a self,
            ctx: &'a T::Context,
            input: &'a T::Input,
            next: Next<'a, T>,
        ) -> Pin<Box<dyn Future<Output = T::Output> + Send + 'a>> {
            Box::pin(async move {
                let mut attempt = 1;
                loop {
                    let output = next.run(ctx, input).await;
                    if !output.should_retry() {
                        return output;
                    }
                    if attempt >= self.max_attempts {
                        return output.exhausted(attempt);
                    }
                    let pause = self.delay_for_attempt(attempt);
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        attempt,
                        pause_ms = pause.as_millis(),
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(pause).await;
                    attempt += 1;
                }
            })
        }
    }

    /// Fails the call if the inner chain takes longer than `duration`.
    ///
    /// For streamed completions only the time to obtain the stream counts.
    #[derive(Debug, Clone)]
    pub struct Timeout {
        /// The deadline, measured from entering this link.
        pub duration: Duration,
    }

    impl Timeout {
        /// A deadline of `duration`.
        pub fn new(duration: Duration) -> Self {
            Self { duration }
        }
    }

    impl<T> Interceptor<T> for Timeout
    where
        T: Interceptable,
        T::Output: Timeoutable,
    {
        fn intercept<'a>(
            &'a self,
            ctx: &'a T::Context,
            input: &'a T::Input,
            next: Next<'a, T>,
        ) -> Pin<Box<dyn Future<Output = T::Output> + Send + 'a>> {
            Box::pin(async move {
                tokio::time::timeout(self.duration, next.run(ctx, input))
                    .await
                    .unwrap_or_else(|_| T::Output::timeout_error(self.duration))
            })
        }
    }

    /// Forwards every call unchanged.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NoOp;

    impl<T: Interceptable> Interceptor<T> for NoOp {
        fn intercept<'a>(
            &'a self,
            ctx: &'a T::Context,
            input: &'a T::Input,
            next: Next<'a, T>,
        ) -> Pin<Box<dyn Future<Output = T::Output> + Send + 'a>> {
            Box::pin(next.run(ctx, input))
        }
    }

    /// How much [`Logging`] records.
    #[cfg(feature = "tracing")]
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub enum LogLevel {
        /// Elapsed time, at `info`.
        #[default]
        Info,
        /// Elapsed time and success, at `debug`.
        Debug,
        /// Also describes the input before the call.
        Trace,
    }

    /// Emits a `tracing` event for every call.
    #[cfg(feature = "tracing")]
    #[derive(Debug, Clone, Default)]
    pub struct Logging {
        /// Detail level.
        pub level: LogLevel,
    }

    #[cfg(feature = "tracing")]
    impl Logging {
        /// Logs at `level`.
        pub fn new(level: LogLevel) -> Self {
            Self { level }
        }
    }

    #[cfg(feature = "tracing")]
    impl<T> Interceptor<T> for Logging
    where
        T: Interceptable,
        T::Input: Loggable,
        T::Output: Outcome,
    {
        fn intercept<'a>(
            &'a self,
            ctx: &'a T::Context,
            input: &'a T::Input,
            next: Next<'a, T>,
        ) -> Pin<Box<dyn Future<Output = T::Output> + Send + 'a>> {
            Box::pin(async move {
                if self.level == LogLevel::Trace {
                    tracing::debug!(input = %input.log_description(), "call starting");
                }
                let started = std::time::Instant::now();
                let output = next.run(ctx, input).await;
                let elapsed_ms = started.elapsed().as_millis();

                if self.level == LogLevel::Info {
                    tracing::info!(elapsed_ms, "call finished");
                } else {
                    tracing::debug!(elapsed_ms, success = output.is_success(), "call finished");
                }
                output
            })
        }
    }
}

#[cfg(feature = "tracing")]
pub use interceptors::{LogLevel, Logging};
pub use interceptors::{NoOp, Retry, Timeout};
