//! Named, ordered hook chains.
//!
//! A [`HookChain`] is an immutable, ordered sequence of transform steps
//! built once at configuration time and executed per request. The builder
//! threads types: each added hook consumes the previous hook's output, so
//! `HookChainBuilder<I, O>` always composes to a single `I -> O` transform.
//! Every step is an async transform; a synchronous hook is simply a future
//! that is immediately ready, so a chain mixing synchronous and asynchronous
//! steps runs them uniformly, in registration order.
//!
//! A step returning `Err` aborts the chain; the error propagates to the
//! dispatcher, which routes it to the nearest error hook.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures_util::future::BoxFuture;

type BoxTransform<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O>> + Send + Sync>;

/// An executable chain of hooks transforming an `I` into an `O`.
pub struct HookChain<I, O> {
    transform: BoxTransform<I, O>,
    names: Arc<[String]>,
}

impl<I, O> Clone for HookChain<I, O> {
    fn clone(&self) -> Self {
        Self {
            transform: self.transform.clone(),
            names: self.names.clone(),
        }
    }
}

impl<T: Send + 'static> HookChain<T, T> {
    /// The empty chain: the identity transform.
    pub fn identity() -> Self {
        HookChainBuilder::new().build()
    }
}

impl<T: Send + 'static> Default for HookChain<T, T> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<I, O> HookChain<I, O> {
    /// Runs every hook in registration order, feeding each output into the
    /// next hook.
    pub async fn run(&self, input: I) -> Result<O> {
        (self.transform)(input).await
    }

    /// The registered hook names, in execution order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether the chain has no hooks.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// An incremental, type-threading builder for [`HookChain`].
///
/// # Example
///
/// ```
/// use trellis::HookChainBuilder;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let chain = HookChainBuilder::new()
///     .add("double", |n: i64| async move { Ok(n * 2) })
///     .add("stringify", |n: i64| async move { Ok(n.to_string()) })
///     .build();
/// assert_eq!(chain.run(21).await.unwrap(), "42");
/// # });
/// ```
pub struct HookChainBuilder<I, O> {
    transform: BoxTransform<I, O>,
    names: Vec<String>,
}

impl<T: Send + 'static> HookChainBuilder<T, T> {
    /// Creates a builder whose chain is, so far, the identity.
    pub fn new() -> Self {
        Self {
            transform: Arc::new(|input| Box::pin(async move { Ok(input) })),
            names: Vec::new(),
        }
    }
}

impl<T: Send + 'static> Default for HookChainBuilder<T, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O> HookChainBuilder<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Appends a named hook. The hook's input type is the previous hook's
    /// output type; the builder's output type advances to `P`.
    #[must_use]
    pub fn add<P, F, Fut>(mut self, name: impl Into<String>, hook: F) -> HookChainBuilder<I, P>
    where
        P: Send + 'static,
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P>> + Send + 'static,
    {
        let name = name.into();
        self.names.push(name.clone());

        let prev = self.transform;
        let hook = Arc::new(hook);
        let transform: BoxTransform<I, P> = Arc::new(move |input| {
            let prev = prev.clone();
            let hook = hook.clone();
            let name = name.clone();
            Box::pin(async move {
                let output = prev(input).await?;
                tracing::debug!(hook = %name, "running hook");
                hook(output).await
            })
        });

        HookChainBuilder {
            transform,
            names: self.names,
        }
    }

    /// Freezes the builder into an executable chain.
    pub fn build(self) -> HookChain<I, O> {
        HookChain {
            transform: self.transform,
            names: self.names.into(),
        }
    }
}
