//! Core traits for pluggable stage logic.
//!
//! Stages own the concurrency (one task per stage instance, cancellation at
//! every suspension point). These traits only describe what happens to a
//! single element, so the same logic can run in a plain stage or be
//! replicated across a fan-out.

use crate::core::error::Result;
use async_trait::async_trait;

/// A processor transforms one input element into zero or more outputs.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use pipeweld::core::{Processor, Result};
///
/// struct DoubleProcessor;
///
/// #[async_trait]
/// impl Processor for DoubleProcessor {
///     type Input = i32;
///     type Output = i32;
///
///     async fn process(&mut self, item: Self::Input) -> Result<Vec<Self::Output>> {
///         Ok(vec![item * 2])
///     }
/// }
/// ```
#[async_trait]
pub trait Processor: Send {
    /// The type of items this processor accepts
    type Input: Send + 'static;
    /// The type of items this processor produces
    type Output: Send + 'static;

    /// Process an input item and produce zero or more output items.
    ///
    /// Returning an empty Vec drops the item. An `Err` is about this element
    /// only; the stage running the processor decides whether to skip it or
    /// surface it downstream.
    async fn process(&mut self, item: Self::Input) -> Result<Vec<Self::Output>>;

    /// Called when upstream closes normally (not on cancellation).
    async fn finish(&mut self) -> Result<Vec<Self::Output>> {
        Ok(vec![])
    }
}

/// A sink is the final consumer loop of a pipeline.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use pipeweld::core::{Result, Sink};
///
/// struct LogSink;
///
/// #[async_trait]
/// impl Sink for LogSink {
///     type Item = String;
///
///     async fn write(&mut self, item: Self::Item) -> Result<()> {
///         println!("Logged: {}", item);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Sink: Send {
    /// The type of items this sink accepts
    type Item: Send + 'static;

    /// Consume a single item.
    async fn write(&mut self, item: Self::Item) -> Result<()>;

    /// Called once the stream has ended, whether it closed or was cancelled.
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
