//! Single-producer streams with cancellation-aware handoff.
//!
//! A [`Stream`] is the reading half of a bounded Tokio mpsc channel. A capacity
//! of zero turns the channel into a rendezvous: [`StreamSender::send`] only
//! returns once the reader has taken the value, which is what lets stages such
//! as [`tee`](crate::dispatcher::tee) act as a barrier. The stream closes when
//! the last [`StreamSender`] is dropped, so a stage closes its output on every
//! exit path simply by returning.

use std::any::Any;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::core::cancel::Done;
use crate::core::error::{Error, Result};

/// A type-erased stream element, for stages that accept mixed input.
pub type AnyValue = Box<dyn Any + Send>;

struct Envelope<T> {
    value: T,
    ack: Option<oneshot::Sender<()>>,
}

impl<T> Envelope<T> {
    /// `None` if the sender gave up on a rendezvous before it was read.
    fn open(self) -> Option<T> {
        match self.ack {
            Some(ack) => ack.send(()).is_ok().then_some(self.value),
            None => Some(self.value),
        }
    }
}

/// Create a stream with the given buffer capacity. `0` means unbuffered.
pub fn channel<T>(capacity: usize) -> (StreamSender<T>, Stream<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        StreamSender {
            tx,
            rendezvous: capacity == 0,
        },
        Stream { rx },
    )
}

/// The writing half of a [`Stream`].
///
/// Clones share the stream; it closes once every clone is dropped.
pub struct StreamSender<T> {
    tx: mpsc::Sender<Envelope<T>>,
    rendezvous: bool,
}

impl<T> Clone for StreamSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rendezvous: self.rendezvous,
        }
    }
}

impl<T> fmt::Debug for StreamSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSender")
            .field("rendezvous", &self.rendezvous)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<T: Send> StreamSender<T> {
    /// Deliver `value` downstream.
    ///
    /// Fails with [`Error::Cancelled`] if `done` is raised first and with
    /// [`Error::ChannelClosed`] if the reader has gone away. Once `done` is
    /// raised no new value is accepted, even if the reader is ready. On an
    /// unbuffered stream a send that fails or is dropped before the reader
    /// takes the value never delivers it.
    pub async fn send(&self, value: T, done: &Done) -> Result<()> {
        if !self.rendezvous {
            return self.enqueue(value, None, done).await;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.enqueue(value, Some(ack_tx), done).await?;
        wait_for_reader(ack_rx, done).await
    }

    async fn enqueue(
        &self,
        value: T,
        ack: Option<oneshot::Sender<()>>,
        done: &Done,
    ) -> Result<()> {
        tokio::select! {
            biased;
            _ = done.cancelled() => Err(Error::Cancelled),
            res = self.tx.send(Envelope { value, ack }) => res.map_err(|_| Error::ChannelClosed),
        }
    }

    /// True once the reader has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Wait until the reader has taken a queued rendezvous value.
///
/// If `done` wins, the ack channel is closed so the reader discards the value;
/// an ack that already arrived still counts as delivered.
async fn wait_for_reader(mut ack: oneshot::Receiver<()>, done: &Done) -> Result<()> {
    tokio::select! {
        biased;
        _ = done.cancelled() => {
            ack.close();
            ack.try_recv().map_err(|_| Error::Cancelled)
        }
        res = &mut ack => res.map_err(|_| Error::ChannelClosed),
    }
}

/// The reading half: an ordered, lazily produced sequence of `T`.
///
/// Also implements [`futures_core::Stream`], so the usual `StreamExt`
/// adapters work on it.
pub struct Stream<T> {
    rx: mpsc::Receiver<Envelope<T>>,
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").finish_non_exhaustive()
    }
}

impl<T> Stream<T> {
    /// A stream that yields `values` and is already closed.
    pub fn from_values(values: Vec<T>) -> Self {
        let (tx, rx) = mpsc::channel(values.len().max(1));
        for value in values {
            // Capacity covers every value.
            let _ = tx.try_send(Envelope { value, ack: None });
        }
        Stream { rx }
    }

    /// Poll for the next value; `None` once the stream is closed and drained.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        loop {
            match ready!(self.rx.poll_recv(cx)) {
                Some(envelope) => {
                    if let Some(value) = envelope.open() {
                        return Poll::Ready(Some(value));
                    }
                }
                None => return Poll::Ready(None),
            }
        }
    }

    /// Wait for the next value, or `None` at end of stream.
    pub async fn recv(&mut self) -> Option<T> {
        std::future::poll_fn(|cx| self.poll_recv(cx)).await
    }

    /// Like [`recv`](Stream::recv) but also returns `None` once `done` is raised.
    ///
    /// This is the or-done idiom used at every forwarding point inside the
    /// combinators.
    pub async fn recv_or_done(&mut self, done: &Done) -> Option<T> {
        tokio::select! {
            biased;
            _ = done.cancelled() => None,
            item = self.recv() => item,
        }
    }

    /// Turn this stream into a handle several workers can pull from.
    pub fn shared(self) -> SharedStream<T> {
        SharedStream {
            inner: Arc::new(Mutex::new(self)),
        }
    }
}

impl<T> futures_core::Stream for Stream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().poll_recv(cx)
    }
}

/// A stream read by competing consumers: each value goes to exactly one of
/// the readers, whichever asks first.
pub struct SharedStream<T> {
    inner: Arc<Mutex<Stream<T>>>,
}

impl<T> Clone for SharedStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for SharedStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedStream")
            .field("readers", &Arc::strong_count(&self.inner))
            .finish()
    }
}

impl<T> SharedStream<T> {
    /// Next value for this reader, `None` at end of stream or on cancellation.
    pub async fn recv_or_done(&self, done: &Done) -> Option<T> {
        tokio::select! {
            biased;
            _ = done.cancelled() => None,
            item = async { self.inner.lock().await.recv().await } => item,
        }
    }
}
