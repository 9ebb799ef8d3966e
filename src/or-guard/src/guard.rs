//! Guard capability and result normalization
//!
//! A guard answers one question, "may this request proceed?", in one of three
//! shapes: right away, after a single asynchronous suspension, or as the first
//! item of an asynchronous stream. [`GuardResult`] carries the shape and
//! [`GuardResult::into_future`] turns any of them into a [`GuardFuture`].

use futures::future::{self, BoxFuture};
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Uniform asynchronous boolean unit produced by normalization
pub type GuardFuture = BoxFuture<'static, anyhow::Result<bool>>;

/// Raw value returned by [`Guard::decide`]
pub enum GuardResult {
    /// Decided synchronously (or failed synchronously)
    Ready(anyhow::Result<bool>),

    /// Decided once the future resolves
    Deferred(BoxFuture<'static, anyhow::Result<bool>>),

    /// Decided by the first item of the stream; later items are never polled.
    /// A stream that ends without an item casts no vote and counts as a denial.
    Stream(BoxStream<'static, anyhow::Result<bool>>),
}

impl GuardResult {
    /// Wrap a future yielding the decision
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        GuardResult::Deferred(future.boxed())
    }

    /// Wrap a stream whose first item is the decision
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = anyhow::Result<bool>> + Send + 'static,
    {
        GuardResult::Stream(stream.boxed())
    }

    /// Synchronous failure
    pub fn failed(error: impl Into<anyhow::Error>) -> Self {
        GuardResult::Ready(Err(error.into()))
    }

    /// Normalize into a single asynchronous boolean
    pub fn into_future(self) -> GuardFuture {
        match self {
            GuardResult::Ready(decision) => future::ready(decision).boxed(),
            GuardResult::Deferred(decision) => decision,
            GuardResult::Stream(mut decisions) => async move {
                match decisions.next().await {
                    Some(decision) => decision,
                    // No item, no vote
                    None => Ok(false),
                }
            }
            .boxed(),
        }
    }
}

impl From<bool> for GuardResult {
    fn from(allowed: bool) -> Self {
        GuardResult::Ready(Ok(allowed))
    }
}

impl From<anyhow::Result<bool>> for GuardResult {
    fn from(decision: anyhow::Result<bool>) -> Self {
        GuardResult::Ready(decision)
    }
}

impl fmt::Debug for GuardResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardResult::Ready(decision) => f.debug_tuple("Ready").field(decision).finish(),
            GuardResult::Deferred(_) => f.write_str("Deferred(..)"),
            GuardResult::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Authorization predicate evaluated against an opaque request context `C`
pub trait Guard<C>: Send + Sync {
    /// Decide whether the request described by `context` may proceed
    fn decide(&self, context: &C) -> GuardResult;
}

/// Guard backed by a closure, see [`guard_fn`]
pub struct FnGuard<F> {
    decide: F,
}

impl<C, F, R> Guard<C> for FnGuard<F>
where
    F: Fn(&C) -> R + Send + Sync,
    R: Into<GuardResult>,
{
    fn decide(&self, context: &C) -> GuardResult {
        (self.decide)(context).into()
    }
}

/// Build a guard from a closure returning a `bool`, an `anyhow::Result<bool>` or a [`GuardResult`]
pub fn guard_fn<C, F, R>(decide: F) -> FnGuard<F>
where
    F: Fn(&C) -> R + Send + Sync,
    R: Into<GuardResult>,
{
    FnGuard { decide }
}

/// Defer `decide` until the returned future is first polled
pub(crate) fn lazy_decision<C>(guard: Arc<dyn Guard<C>>, context: Arc<C>) -> GuardFuture
where
    C: Send + Sync + 'static,
{
    async move { guard.decide(&context).into_future().await }.boxed()
}
