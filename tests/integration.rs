//! Integration tests for cancellable stream pipelines

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pipeweld::prelude::*;
use pipeweld::util::stream_into_vec;
use tokio::time::{timeout, Instant};

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pipeweld=debug")
        .with_test_writer()
        .try_init();
}

async fn ends_within<T>(mut stream: Stream<T>, limit: Duration) -> bool {
    timeout(limit, async { while stream.recv().await.is_some() {} })
        .await
        .is_ok()
}

#[tokio::test]
async fn test_take_cycles_through_repeated_values() -> Result<()> {
    let done = Done::new();
    for n in [0, 1, 2, 3, 7, 10] {
        let values = stream_into_vec(take(&done, repeat(&done, vec![1, 2, 3]), n)).await;
        let expected: Vec<i32> = [1, 2, 3].iter().copied().cycle().take(n).collect();
        assert_eq!(values, expected);
    }
    done.cancel();
    Ok(())
}

#[tokio::test]
async fn test_repeat_with_generator() {
    let done = Done::new();
    let mut next = 0;
    let values = stream_into_vec(take(
        &done,
        repeat_with(&done, move || {
            next += 1;
            next
        }),
        4,
    ))
    .await;
    assert_eq!(values, vec![1, 2, 3, 4]);
    done.cancel();
}

#[tokio::test]
async fn test_projection_chain() {
    let done = Done::new();
    let source = from_iter(&done, vec![1, 2, 3, 4]);
    let out = multiply(&done, add(&done, multiply(&done, source, 2), 1), 2);
    assert_eq!(stream_into_vec(out).await, vec![6, 10, 14, 18]);
}

#[tokio::test]
async fn test_to_typed_surfaces_mismatch_per_element() {
    let done = Done::new();
    let mixed: Vec<AnyValue> = vec![
        Box::new("a".to_string()),
        Box::new(7_u8),
        Box::new("b".to_string()),
    ];
    let typed = stream_into_vec(to_typed::<String>(&done, from_iter(&done, mixed))).await;

    assert_eq!(typed.len(), 3);
    assert_eq!(typed[0].as_deref().ok(), Some("a"));
    assert!(matches!(typed[1], Err(Error::Conversion { .. })));
    assert_eq!(typed[2].as_deref().ok(), Some("b"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_unblocks_every_stage() {
    init_test_logging();
    let done = Done::new();

    // Blocked on send: nobody reads the source.
    let unread = repeat(&done, vec![1]);
    // Blocked on a long wait.
    let sleeping = sleep(&done, Duration::from_secs(3600), repeat(&done, vec![2]));
    // Blocked on receive: the upstream never produces.
    let (_idle_tx, idle) = channel::<u32>(0);
    let starved = or_done(&done, idle);
    // Blocked inside a barrier.
    let (teed, _unread_half) = tee(&done, repeat(&done, vec![3]));

    tokio::time::sleep(Duration::from_millis(10)).await;
    done.cancel();

    let limit = Duration::from_secs(1);
    assert!(ends_within(unread, limit).await);
    assert!(ends_within(sleeping, limit).await);
    assert!(ends_within(starved, limit).await);
    assert!(ends_within(teed, limit).await);
}

#[tokio::test]
async fn test_fan_in_forwards_k_times_m_values() {
    init_test_logging();
    let done = Done::new();
    let (k, m) = (5, 20);
    let sources = (0..k)
        .map(|source| from_iter(&done, (0..m).map(move |i| source * 100 + i)))
        .collect();

    let merged = stream_into_vec(fan_in(&done, sources)).await;
    assert_eq!(merged.len(), (k * m) as usize);
    for source in 0..k {
        let from_source: Vec<_> = merged.iter().filter(|v| **v / 100 == source).collect();
        // Per-source order is preserved even though sources interleave.
        assert!(from_source.windows(2).all(|w| w[0] < w[1]));
    }
}

#[tokio::test(start_paused = true)]
async fn test_fan_in_closes_after_last_source() {
    let done = Done::new();
    let fast = from_iter(&done, vec![1]);
    let slow = sleep(&done, Duration::from_secs(5), from_iter(&done, vec![2]));
    let mut merged = fan_in(&done, vec![fast, slow]);

    let start = Instant::now();
    let mut seen = Vec::new();
    while let Some(v) = merged.recv().await {
        seen.push(v);
    }
    seen.sort();
    assert_eq!(seen, vec![1, 2]);
    assert!(start.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fanned_out_prime_search_matches_single_worker() {
    let done = Done::new();
    let mut fanned = Pipeline::from_iter(&done, 1_u64..500)
        .workers(4)
        .find_primes()
        .collect()
        .await
        .unwrap();
    fanned.sort();

    let single = stream_into_vec(prime_finder(&done, from_iter(&done, 1_u64..500))).await;
    assert_eq!(fanned, single);
    assert_eq!(single.len(), 95);
}

#[tokio::test(start_paused = true)]
async fn test_tee_is_a_barrier() {
    let done = Done::new();
    let (mut a, mut b) = tee(&done, from_iter(&done, vec![1, 2, 3]));

    assert_eq!(a.recv().await, Some(1));
    assert_eq!(b.recv().await, Some(1));

    // A stalls before reading 2, so B must not see 2 either.
    assert!(timeout(Duration::from_secs(60), b.recv()).await.is_err());

    assert_eq!(a.recv().await, Some(2));
    assert_eq!(b.recv().await, Some(2));
    assert_eq!(a.recv().await, Some(3));
    assert_eq!(b.recv().await, Some(3));
    assert_eq!(a.recv().await, None);
    assert_eq!(b.recv().await, None);
}

#[tokio::test]
async fn test_bridge_of_single_element_streams() {
    let done = Done::new();
    let (tx, streams) = channel(0);
    let feeder = done.clone();
    tokio::spawn(async move {
        for v in [7, 8, 9] {
            let (inner_tx, inner) = channel(0);
            if tx.send(inner, &feeder).await.is_err() {
                return;
            }
            let _ = inner_tx.send(v, &feeder).await;
        }
    });

    assert_eq!(stream_into_vec(bridge(&done, streams)).await, vec![7, 8, 9]);
}

#[tokio::test(start_paused = true)]
async fn test_buffer_lets_producer_run_ahead() {
    let done = Done::new();
    let produced = Arc::new(AtomicUsize::new(0));
    let counter = produced.clone();
    let source = repeat_with(&done, move || counter.fetch_add(1, Ordering::SeqCst));
    let mut buffered = buffer(&done, 2, source);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let ahead = produced.load(Ordering::SeqCst);
    assert!(ahead >= 2, "producer only ran {ahead} ahead");
    // Bounded: the buffer, the relay and one pending handoff.
    assert!(ahead <= 5, "producer ran {ahead} ahead");

    // Reading never has to wait for the producer while the buffer is full.
    for expected in 0..3 {
        let value = timeout(Duration::from_millis(1), buffered.recv()).await;
        assert_eq!(value.unwrap(), Some(expected));
    }
    done.cancel();
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let done = Done::new();
    let stream = or_done(&done, repeat(&done, vec!["x"]));

    done.cancel();
    done.cancel();
    assert!(done.is_cancelled());
    assert!(ends_within(stream, Duration::from_secs(1)).await);

    let (ctx, cancel) = Context::with_cancel(&Context::background());
    cancel.cancel();
    cancel.cancel();
    assert!(matches!(ctx.err(), Some(Error::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_beats_long_wait() {
    let (ctx, _cancel) = Context::with_timeout(&Context::background(), Duration::from_secs(1));
    let start = Instant::now();

    let res: Result<()> = tokio::select! {
        _ = ctx.cancelled() => Err(ctx.err().unwrap_or(Error::Cancelled)),
        _ = tokio::time::sleep(Duration::from_secs(60)) => Ok(()),
    };

    assert!(matches!(res, Err(Error::DeadlineExceeded)));
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_greeting_deadline_cancels_farewell() {
    init_test_logging();
    let greeter = Greeter::new().lookup_delay(Duration::from_secs(60));
    let start = Instant::now();
    let outcome = greeter.run_in(&Context::background()).await;

    assert!(matches!(outcome.greeting, Err(Error::DeadlineExceeded)));
    assert!(matches!(outcome.farewell, Err(Error::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_pipeline_into_sink() -> Result<()> {
    let done = Done::new();
    let sink = CollectSink::new();
    Pipeline::from_iter(&done, 1..=10)
        .filter(|x| x % 2 == 0)
        .map(|x| x * x)
        .buffer_size(4)
        .buffered()
        .sink(sink.clone())
        .await?;

    assert_eq!(sink.take_items().await, vec![4, 16, 36, 64, 100]);
    Ok(())
}

#[tokio::test]
async fn test_stream_works_with_futures_adapters() {
    use futures::StreamExt;

    let done = Done::new();
    let doubled: Vec<i32> = from_iter(&done, 1..=5)
        .filter(|x| futures::future::ready(x % 2 == 1))
        .map(|x| x * 2)
        .collect()
        .await;
    assert_eq!(doubled, vec![2, 6, 10]);
}
