//! Stages that route values between several streams.
//!
//! - [`fan_out`] replicates a processor across workers that compete for the
//!   values of one upstream.
//! - [`fan_in`] merges many streams into one, in arrival order.
//! - [`tee`] copies every value to two outputs in lock-step.
//! - [`bridge`] flattens a stream of streams, one inner stream at a time.

use tokio::task::JoinSet;
use tracing::Instrument;

use crate::core::{channel, Done, Error, Processor, Stream};
use crate::processors::{finish_processor, process_item};
use crate::util::{emit, record_forwarded, spawn_stage};

/// Run `workers` instances of the processor built by `make`, all pulling from
/// `source`.
///
/// Each upstream value is handled by exactly one worker, whichever is free
/// first. At least one worker is always started. Returns one output stream
/// per worker; merge them with [`fan_in`].
pub fn fan_out<P, F>(
    done: &Done,
    source: Stream<P::Input>,
    workers: usize,
    mut make: F,
) -> Vec<Stream<P::Output>>
where
    P: Processor + 'static,
    F: FnMut() -> P,
{
    let shared = source.shared();
    (0..workers.max(1))
        .map(|worker| {
            let (tx, rx) = channel(0);
            let shared = shared.clone();
            let done = done.clone();
            let mut processor = make();
            spawn_stage("fan_out", async move {
                tracing::debug!(worker, "worker started");
                while let Some(item) = shared.recv_or_done(&done).await {
                    if !process_item(&mut processor, item, &tx, &done, "fan_out").await {
                        return;
                    }
                }
                finish_processor(&mut processor, &tx, &done, "fan_out").await;
            });
            rx
        })
        .collect()
}

/// Merge `streams` into one stream.
///
/// Values are forwarded as soon as any input has one; there is no ordering
/// between inputs. The output closes after every input has closed and been
/// drained, or promptly once `done` is raised.
pub fn fan_in<T>(done: &Done, streams: Vec<Stream<T>>) -> Stream<T>
where
    T: Send + 'static,
{
    let (tx, rx) = channel(0);
    let mut helpers = JoinSet::new();

    for (input, mut stream) in streams.into_iter().enumerate() {
        let tx = tx.clone();
        let done = done.clone();
        helpers.spawn(
            async move {
                while let Some(value) = stream.recv_or_done(&done).await {
                    if !emit(&tx, value, &done, "fan_in").await {
                        return;
                    }
                }
            }
            .instrument(tracing::debug_span!("fan_in_input", input)),
        );
    }

    spawn_stage("fan_in", async move {
        while let Some(joined) = helpers.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "fan-in helper failed");
            }
        }
        // Last handle: the merged stream closes here.
        drop(tx);
    });
    rx
}

/// Split `source` into two streams that each receive every value.
///
/// Each value goes to the first output, then the second, before the next one
/// is pulled; a reader that stops reading stalls the other output and the
/// source. If one reader is dropped the other keeps receiving.
pub fn tee<T>(done: &Done, mut source: Stream<T>) -> (Stream<T>, Stream<T>)
where
    T: Clone + Send + 'static,
{
    let (first_tx, first) = channel(0);
    let (second_tx, second) = channel(0);
    let done = done.clone();

    spawn_stage("tee", async move {
        let mut outputs = [Some(first_tx), Some(second_tx)];
        while let Some(value) = source.recv_or_done(&done).await {
            for slot in outputs.iter_mut() {
                let Some(tx) = slot.as_ref() else {
                    continue;
                };
                match tx.send(value.clone(), &done).await {
                    Ok(()) => record_forwarded("tee"),
                    Err(Error::ChannelClosed) => *slot = None,
                    Err(_) => return,
                }
            }
            if outputs.iter().all(Option::is_none) {
                return;
            }
        }
    });
    (first, second)
}

/// Flatten a stream of streams.
///
/// Drains each inner stream completely before pulling the next one. Ends when
/// the outer stream closes or `done` is raised.
pub fn bridge<T>(done: &Done, mut streams: Stream<Stream<T>>) -> Stream<T>
where
    T: Send + 'static,
{
    let (tx, rx) = channel(0);
    let done = done.clone();
    spawn_stage("bridge", async move {
        while let Some(mut inner) = streams.recv_or_done(&done).await {
            while let Some(value) = inner.recv_or_done(&done).await {
                if !emit(&tx, value, &done, "bridge").await {
                    return;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::{MapProcessor, PrimeFinder};
    use crate::sources::{from_iter, repeat};
    use crate::util::stream_into_vec;
    use std::time::Duration;

    #[tokio::test]
    async fn fan_in_forwards_every_value() {
        let done = Done::new();
        let sources = (0..3)
            .map(|k| from_iter(&done, (0..4).map(move |m| k * 10 + m)))
            .collect();

        let mut merged = stream_into_vec(fan_in(&done, sources)).await;
        merged.sort();
        assert_eq!(merged, vec![0, 1, 2, 3, 10, 11, 12, 13, 20, 21, 22, 23]);
    }

    #[tokio::test]
    async fn fan_in_of_nothing_closes() {
        let done = Done::new();
        let mut merged = fan_in::<u8>(&done, vec![]);
        assert_eq!(merged.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn fan_in_waits_for_every_input() {
        let done = Done::new();
        let (first_tx, first) = channel::<u32>(0);
        let (second_tx, second) = channel::<u32>(0);
        let mut merged = fan_in(&done, vec![first, second]);

        drop(first_tx);
        let still_open = tokio::time::timeout(Duration::from_secs(1), merged.recv()).await;
        assert!(still_open.is_err());

        second_tx.send(5, &done).await.unwrap();
        assert_eq!(merged.recv().await, Some(5));
        drop(second_tx);
        assert_eq!(merged.recv().await, None);
    }

    #[tokio::test]
    async fn fan_in_stops_on_cancel_with_open_inputs() {
        let done = Done::new();
        let inputs = vec![repeat(&done, vec![1]), repeat(&done, vec![2])];
        let mut merged = fan_in(&done, inputs);
        assert!(merged.recv().await.is_some());

        done.cancel();
        let end = tokio::time::timeout(Duration::from_secs(1), async {
            while merged.recv().await.is_some() {}
        })
        .await;
        assert!(end.is_ok());
    }

    #[tokio::test]
    async fn fan_out_delivers_each_value_to_one_worker() {
        let done = Done::new();
        let workers = fan_out(&done, from_iter(&done, 0..100), 4, || {
            MapProcessor::new(|x: i32| x)
        });
        assert_eq!(workers.len(), 4);

        let mut seen = stream_into_vec(fan_in(&done, workers)).await;
        seen.sort();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn fan_out_with_zero_workers_still_runs_one() {
        let done = Done::new();
        let workers = fan_out(&done, from_iter(&done, 0..5), 0, || {
            MapProcessor::new(|x: i32| x + 1)
        });
        assert_eq!(workers.len(), 1);
        assert_eq!(stream_into_vec(fan_in(&done, workers)).await, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fanned_out_prime_finders() {
        let done = Done::new();
        let finders = fan_out(&done, from_iter(&done, 1_u64..200), 4, || PrimeFinder);
        let mut primes = stream_into_vec(fan_in(&done, finders)).await;
        primes.sort();
        assert_eq!(primes.len(), 46);
        assert_eq!(&primes[..5], &[2, 3, 5, 7, 11]);
        assert_eq!(primes.last(), Some(&199));
    }

    #[tokio::test]
    async fn tee_copies_every_value() {
        let done = Done::new();
        let (mut first, mut second) = tee(&done, from_iter(&done, vec![1, 2, 3, 4]));

        let mut pairs = Vec::new();
        while let Some(a) = first.recv().await {
            pairs.push((a, second.recv().await.unwrap()));
        }
        assert_eq!(pairs, vec![(1, 1), (2, 2), (3, 3), (4, 4)]);
        assert_eq!(second.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn tee_is_a_barrier() {
        let done = Done::new();
        let (mut first, mut second) = tee(&done, from_iter(&done, vec![1, 2, 3]));

        assert_eq!(first.recv().await, Some(1));
        assert_eq!(second.recv().await, Some(1));

        // `first` has not read 2 yet, so `second` cannot get it either.
        let stalled = tokio::time::timeout(Duration::from_secs(60), second.recv()).await;
        assert!(stalled.is_err());

        assert_eq!(first.recv().await, Some(2));
        assert_eq!(second.recv().await, Some(2));
        done.cancel();
    }

    #[tokio::test]
    async fn tee_keeps_serving_remaining_reader() {
        let done = Done::new();
        let (first, second) = tee(&done, from_iter(&done, vec![1, 2, 3]));
        drop(first);
        assert_eq!(stream_into_vec(second).await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn bridge_flattens_in_order() {
        let done = Done::new();
        let inner = vec![
            Stream::from_values(vec![7]),
            Stream::from_values(vec![8]),
            Stream::from_values(vec![9]),
        ];
        let flat = bridge(&done, from_iter(&done, inner));
        assert_eq!(stream_into_vec(flat).await, vec![7, 8, 9]);
    }

    #[tokio::test]
    async fn bridge_drains_one_inner_stream_at_a_time() {
        let done = Done::new();
        let inner = vec![
            from_iter(&done, vec![1, 2, 3]),
            from_iter(&done, vec![4, 5]),
        ];
        let flat = bridge(&done, from_iter(&done, inner));
        assert_eq!(stream_into_vec(flat).await, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn bridge_stops_on_cancel() {
        let done = Done::new();
        let endless = from_iter(&done, vec![repeat(&done, vec![0])]);
        let mut flat = bridge(&done, endless);
        assert_eq!(flat.recv().await, Some(0));

        done.cancel();
        let end = tokio::time::timeout(Duration::from_secs(1), async {
            while flat.recv().await.is_some() {}
        })
        .await;
        assert!(end.is_ok());
    }
}
