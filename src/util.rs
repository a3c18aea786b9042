//! Utility functions and helper types shared by the stages.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::WaitForCancellationFutureOwned;
use tracing::Instrument;

use crate::core::{Done, Error, Result, Stream, StreamSender};

/// A future that resolves to `Err(Error::Cancelled)` as soon as its signal is
/// raised, dropping the inner future.
pub struct Cancellable<F> {
    future: Pin<Box<F>>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl<F> Cancellable<F> {
    /// Create a new cancellable future
    pub fn new(future: F, done: &Done) -> Self {
        Self {
            future: Box::pin(future),
            cancelled: Box::pin(done.cancelled_owned()),
        }
    }
}

impl<F: Future> Future for Cancellable<F> {
    type Output = Result<F::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Cancellation wins ties.
        if self.cancelled.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(Error::Cancelled));
        }
        self.future.as_mut().poll(cx).map(Ok)
    }
}

/// Extension trait for making futures cancellable
pub trait CancellableExt: Future + Sized {
    /// Race this future against `done`
    fn cancellable(self, done: &Done) -> Cancellable<Self> {
        Cancellable::new(self, done)
    }
}

impl<F: Future> CancellableExt for F {}

/// Spawn the task that backs one stage instance.
///
/// The task runs inside a `stage` span so every log line it emits carries the
/// stage name.
pub fn spawn_stage<F>(name: &'static str, task: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let span = tracing::debug_span!("stage", name);
    tokio::spawn(
        async move {
            tracing::debug!("stage started");
            task.await;
            tracing::debug!("stage finished");
        }
        .instrument(span),
    )
}

/// Send one value downstream; `false` means the stage should stop.
pub(crate) async fn emit<T: Send>(
    tx: &StreamSender<T>,
    value: T,
    done: &Done,
    stage: &'static str,
) -> bool {
    match tx.send(value, done).await {
        Ok(()) => {
            record_forwarded(stage);
            true
        }
        Err(e) => {
            tracing::trace!(reason = %e, "stopping output");
            false
        }
    }
}

#[cfg(feature = "metrics")]
pub(crate) fn record_forwarded(stage: &'static str) {
    metrics::counter!("pipeweld_items_forwarded_total", "stage" => stage).increment(1);
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_forwarded(_stage: &'static str) {}

/// Drain a stream into a Vec.
pub async fn stream_into_vec<T>(stream: Stream<T>) -> Vec<T> {
    stream.collect().await
}
