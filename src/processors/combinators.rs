//! Flow-control stages: truncation, delay, buffering and or-done.

use std::time::Duration;

use crate::core::{channel, Done, Stream};
use crate::util::{emit, spawn_stage, CancellableExt};

/// Forward at most `n` values from `source`, then close.
///
/// Closes early if `source` ends first. Stopping does not cancel whatever
/// feeds `source`; that producer ends when the shared signal is raised or
/// when its next send finds this stage gone.
pub fn take<T>(done: &Done, mut source: Stream<T>, n: usize) -> Stream<T>
where
    T: Send + 'static,
{
    let (tx, rx) = channel(0);
    let done = done.clone();
    spawn_stage("take", async move {
        for _ in 0..n {
            let Some(value) = source.recv_or_done(&done).await else {
                return;
            };
            if !emit(&tx, value, &done, "take").await {
                return;
            }
        }
    });
    rx
}

/// Wait `delay` before forwarding each value. The wait is cancellable.
pub fn sleep<T>(done: &Done, delay: Duration, mut source: Stream<T>) -> Stream<T>
where
    T: Send + 'static,
{
    let (tx, rx) = channel(0);
    let done = done.clone();
    spawn_stage("sleep", async move {
        while let Some(value) = source.recv_or_done(&done).await {
            if tokio::time::sleep(delay).cancellable(&done).await.is_err() {
                return;
            }
            if !emit(&tx, value, &done, "sleep").await {
                return;
            }
        }
    });
    rx
}

fn relay<T>(stage: &'static str, done: &Done, capacity: usize, mut source: Stream<T>) -> Stream<T>
where
    T: Send + 'static,
{
    let (tx, rx) = channel(capacity);
    let done = done.clone();
    spawn_stage(stage, async move {
        while let Some(value) = source.recv_or_done(&done).await {
            if !emit(&tx, value, &done, stage).await {
                return;
            }
        }
    });
    rx
}

/// Put a queue of `capacity` values between `source` and its reader, so the
/// producer can run that far ahead of a slow consumer.
pub fn buffer<T>(done: &Done, capacity: usize, source: Stream<T>) -> Stream<T>
where
    T: Send + 'static,
{
    relay("buffer", done, capacity, source)
}

/// Wrap `source` so a plain `while let Some(v) = s.recv().await` loop also
/// ends when `done` is raised.
pub fn or_done<T>(done: &Done, source: Stream<T>) -> Stream<T>
where
    T: Send + 'static,
{
    relay("or_done", done, 0, source)
}
