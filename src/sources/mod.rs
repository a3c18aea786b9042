//! Source stages that start a stream from static values or a function.
//!
//! Each source spawns exactly one producer task and returns its (still empty)
//! output stream immediately. Output streams are unbuffered.

use crate::core::{channel, Done, Stream};
use crate::util::{emit, spawn_stage};

/// Cycle through `values` forever, in order, until `done` is raised.
///
/// An empty `values` yields a stream that closes immediately.
///
/// ```rust
/// use pipeweld::core::Done;
/// use pipeweld::processors::combinators::take;
/// use pipeweld::sources::repeat;
/// use pipeweld::util::stream_into_vec;
///
/// # tokio_test::block_on(async {
/// let done = Done::new();
/// let values = stream_into_vec(take(&done, repeat(&done, vec![1, 2, 3]), 5)).await;
/// assert_eq!(values, vec![1, 2, 3, 1, 2]);
/// done.cancel();
/// # });
/// ```
pub fn repeat<T>(done: &Done, values: Vec<T>) -> Stream<T>
where
    T: Clone + Send + 'static,
{
    let (tx, rx) = channel(0);
    let done = done.clone();
    spawn_stage("repeat", async move {
        if values.is_empty() {
            return;
        }
        // By index: a `&T` held across the send would need `T: Sync`.
        for i in (0..values.len()).cycle() {
            let value = values[i].clone();
            if !emit(&tx, value, &done, "repeat").await {
                return;
            }
        }
    });
    rx
}

/// Call `f` for every value pulled, until `done` is raised.
pub fn repeat_with<T, F>(done: &Done, mut f: F) -> Stream<T>
where
    T: Send + 'static,
    F: FnMut() -> T + Send + 'static,
{
    let (tx, rx) = channel(0);
    let done = done.clone();
    spawn_stage("repeat_with", async move {
        while emit(&tx, f(), &done, "repeat_with").await {}
    });
    rx
}

/// Emit each item once, in order, then close. Stops early on cancellation.
pub fn from_iter<I>(done: &Done, items: I) -> Stream<I::Item>
where
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    let (tx, rx) = channel(0);
    let done = done.clone();
    spawn_stage("from_iter", async move {
        for item in items {
            if !emit(&tx, item, &done, "from_iter").await {
                return;
            }
        }
    });
    rx
}
