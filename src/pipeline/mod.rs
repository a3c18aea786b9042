//! Fluent pipeline composition.
//!
//! A [`Pipeline`] is a stream plus the signal its stages share, so stages can
//! be chained without threading the signal through every call. Terminal
//! operations drive the stream to its end and honour the configured
//! operation timeout.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::num::NonZeroUsize;
use std::ops::{Add, Mul};
use std::time::Duration;

use crate::core::{AnyValue, Done, Error, Processor, Result, Sink, Stream};
use crate::dispatcher::{bridge, fan_in, fan_out, tee};
use crate::processors::combinators::{buffer, or_done, sleep, take};
use crate::processors::{self, PrimeFinder};
use crate::sinks::drain;
use crate::sources::{from_iter, repeat, repeat_with};

/// Configuration for pipeline execution
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    /// Capacity used by [`Pipeline::buffered`]
    pub buffer_size: usize,
    /// Number of workers started by [`Pipeline::fan_out`]
    pub workers: usize,
    /// Maximum time a terminal operation may take
    pub operation_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: 16,
            workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            operation_timeout: None,
        }
    }
}

/// A stream under construction, together with its cancellation signal.
///
/// The pipeline runs under a child of the signal it was created with:
/// cancelling the caller's signal stops it, and a timed-out terminal
/// operation cancels only the pipeline's own stages.
///
/// ```rust
/// use pipeweld::core::Done;
/// use pipeweld::pipeline::Pipeline;
///
/// # tokio_test::block_on(async {
/// let done = Done::new();
/// let values = Pipeline::from_iter(&done, vec![1, 2, 3, 4])
///     .multiply(2)
///     .add(1)
///     .multiply(2)
///     .collect()
///     .await
///     .unwrap();
/// assert_eq!(values, vec![6, 10, 14, 18]);
/// # });
/// ```
pub struct Pipeline<T> {
    done: Done,
    stream: Stream<T>,
    config: PipelineConfig,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Wrap an existing stream
    pub fn new(done: &Done, stream: Stream<T>) -> Self {
        Self {
            done: done.child(),
            stream,
            config: PipelineConfig::default(),
        }
    }

    /// Start from a fixed collection
    pub fn from_iter<I>(done: &Done, items: I) -> Self
    where
        I: IntoIterator<Item = T> + Send + 'static,
        I::IntoIter: Send,
    {
        let done = done.child();
        let stream = from_iter(&done, items);
        Self {
            done,
            stream,
            config: PipelineConfig::default(),
        }
    }

    /// Start from values repeated forever
    pub fn repeat(done: &Done, values: Vec<T>) -> Self
    where
        T: Clone,
    {
        let done = done.child();
        let stream = repeat(&done, values);
        Self {
            done,
            stream,
            config: PipelineConfig::default(),
        }
    }

    /// Start from a generator function
    pub fn repeat_with<F>(done: &Done, f: F) -> Self
    where
        F: FnMut() -> T + Send + 'static,
    {
        let done = done.child();
        let stream = repeat_with(&done, f);
        Self {
            done,
            stream,
            config: PipelineConfig::default(),
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the capacity used by [`buffered`](Pipeline::buffered)
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Set the number of fan-out workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers.max(1);
        self
    }

    /// Set the operation timeout for terminal operations
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout = Some(timeout);
        self
    }

    /// The signal shared by this pipeline's stages
    pub fn done(&self) -> &Done {
        &self.done
    }

    fn then<U, F>(self, stage: F) -> Pipeline<U>
    where
        F: FnOnce(&Done, Stream<T>) -> Stream<U>,
    {
        let stream = stage(&self.done, self.stream);
        Pipeline {
            done: self.done,
            stream,
            config: self.config,
        }
    }

    pub fn map<U, F>(self, f: F) -> Pipeline<U>
    where
        F: FnMut(T) -> U + Send + 'static,
        U: Send + 'static,
    {
        self.then(|done, s| processors::map(done, s, f))
    }

    pub fn filter<F>(self, predicate: F) -> Pipeline<T>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        self.then(|done, s| processors::filter(done, s, predicate))
    }

    pub fn take(self, n: usize) -> Pipeline<T> {
        self.then(|done, s| take(done, s, n))
    }

    pub fn sleep(self, delay: Duration) -> Pipeline<T> {
        self.then(|done, s| sleep(done, delay, s))
    }

    /// Insert a queue of `capacity` values
    pub fn buffer(self, capacity: usize) -> Pipeline<T> {
        self.then(|done, s| buffer(done, capacity, s))
    }

    /// Insert a queue sized by the configured `buffer_size`
    pub fn buffered(self) -> Pipeline<T> {
        let capacity = self.config.buffer_size;
        self.buffer(capacity)
    }

    pub fn or_done(self) -> Pipeline<T> {
        self.then(or_done)
    }

    /// Run a processor as one stage, skipping elements it fails on
    pub fn process<P>(self, processor: P) -> Pipeline<P::Output>
    where
        P: Processor<Input = T> + 'static,
    {
        self.then(|done, s| processors::process(done, s, processor))
    }

    /// Run a processor as one stage, surfacing failures per element
    pub fn try_process<P>(self, processor: P) -> Pipeline<Result<P::Output>>
    where
        P: Processor<Input = T> + 'static,
    {
        self.then(|done, s| processors::try_process(done, s, processor))
    }

    /// Replicate a processor across the configured number of workers and
    /// merge their outputs, in arrival order.
    pub fn fan_out<P, F>(self, make: F) -> Pipeline<P::Output>
    where
        P: Processor<Input = T> + 'static,
        F: FnMut() -> P,
    {
        let workers = self.config.workers;
        self.then(|done, s| fan_in(done, fan_out(done, s, workers, make)))
    }

    /// Split into two lock-stepped pipelines sharing this signal
    pub fn tee(self) -> (Pipeline<T>, Pipeline<T>)
    where
        T: Clone,
    {
        let (first, second) = tee(&self.done, self.stream);
        (
            Pipeline {
                done: self.done.clone(),
                stream: first,
                config: self.config.clone(),
            },
            Pipeline {
                done: self.done,
                stream: second,
                config: self.config,
            },
        )
    }

    /// Hand the stream over; the pipeline's stages keep running.
    pub fn into_stream(self) -> Stream<T> {
        self.stream
    }

    /// Collect every value until the stream ends
    pub async fn collect(self) -> Result<Vec<T>> {
        let Pipeline {
            done,
            mut stream,
            config,
        } = self;
        bounded(&done, config.operation_timeout, async move {
            let mut items = Vec::new();
            while let Some(item) = stream.recv().await {
                items.push(item);
            }
            Ok(items)
        })
        .await
    }

    /// Count values until the stream ends
    pub async fn count(self) -> Result<usize> {
        let Pipeline {
            done,
            mut stream,
            config,
        } = self;
        bounded(&done, config.operation_timeout, async move {
            let mut count = 0;
            while stream.recv().await.is_some() {
                count += 1;
            }
            Ok(count)
        })
        .await
    }

    /// Run the pipeline into a sink
    pub async fn sink<S>(self, mut sink: S) -> Result<()>
    where
        S: Sink<Item = T>,
    {
        let Pipeline {
            done,
            stream,
            config,
        } = self;
        bounded(&done, config.operation_timeout, async move {
            drain(stream, &mut sink).await
        })
        .await
    }
}

impl<T> Pipeline<T>
where
    T: Add<Output = T> + Copy + Send + 'static,
{
    pub fn add(self, additive: T) -> Pipeline<T> {
        self.then(|done, s| processors::add(done, s, additive))
    }
}

impl<T> Pipeline<T>
where
    T: Mul<Output = T> + Copy + Send + 'static,
{
    pub fn multiply(self, multiplier: T) -> Pipeline<T> {
        self.then(|done, s| processors::multiply(done, s, multiplier))
    }
}

impl<T: Send + 'static> Pipeline<Stream<T>> {
    /// Flatten a pipeline of streams
    pub fn bridge(self) -> Pipeline<T> {
        self.then(bridge)
    }
}

impl Pipeline<AnyValue> {
    /// Recover `U` from type-erased elements
    pub fn to_typed<U: Any + Send>(self) -> Pipeline<Result<U>> {
        self.then(processors::to_typed::<U>)
    }
}

impl<T: Send + 'static> Pipeline<T> {
    /// Convert each element with `TryFrom`, surfacing failures per element
    pub fn try_convert<U>(self) -> Pipeline<Result<U>>
    where
        U: TryFrom<T> + Send + 'static,
        U::Error: Display,
    {
        self.then(processors::try_convert::<T, U>)
    }
}

impl Pipeline<u64> {
    /// Keep the primes, spread across the configured number of workers
    pub fn find_primes(self) -> Pipeline<u64> {
        self.fan_out(|| PrimeFinder)
    }
}

async fn bounded<R, F>(done: &Done, timeout: Option<Duration>, run: F) -> Result<R>
where
    F: Future<Output = Result<R>>,
{
    let Some(limit) = timeout else {
        return run.await;
    };
    match tokio::time::timeout(limit, run).await {
        Ok(res) => res,
        Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "pipeline timed out");
            done.cancel();
            Err(Error::timeout(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::CollectSink;

    #[tokio::test]
    async fn take_of_repeat() {
        let done = Done::new();
        let values = Pipeline::repeat(&done, vec!["I", "am."])
            .take(5)
            .collect()
            .await
            .unwrap();
        assert_eq!(values.concat(), "Iam.Iam.I");
        done.cancel();
    }

    #[tokio::test]
    async fn to_typed_pipeline() {
        let done = Done::new();
        let mixed: Vec<AnyValue> = vec![Box::new(1_i32), Box::new(2_i32), Box::new("three")];
        let typed = Pipeline::from_iter(&done, mixed)
            .to_typed::<i32>()
            .collect()
            .await
            .unwrap();
        assert_eq!(typed.len(), 3);
        assert!(typed[2].is_err());
    }

    #[tokio::test]
    async fn tee_pipelines_see_same_values() {
        let done = Done::new();
        let (first, second) = Pipeline::from_iter(&done, vec![1, 2, 3]).tee();
        let (a, b) = tokio::join!(first.collect(), second.collect());
        assert_eq!(a.unwrap(), vec![1, 2, 3]);
        assert_eq!(b.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn bridge_pipeline() {
        let done = Done::new();
        let streams = vec![Stream::from_values(vec![7]), Stream::from_values(vec![8, 9])];
        let flat = Pipeline::from_iter(&done, streams).bridge().collect().await.unwrap();
        assert_eq!(flat, vec![7, 8, 9]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn find_primes_across_workers() {
        let done = Done::new();
        let mut primes = Pipeline::from_iter(&done, 1_u64..50)
            .workers(3)
            .find_primes()
            .collect()
            .await
            .unwrap();
        primes.sort();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47]);
    }

    #[tokio::test]
    async fn zero_workers_from_config_still_produce_output() {
        let done = Done::new();
        let config = PipelineConfig {
            workers: 0,
            ..PipelineConfig::default()
        };
        let mut primes = Pipeline::from_iter(&done, 1_u64..20)
            .with_config(config)
            .find_primes()
            .collect()
            .await
            .unwrap();
        primes.sort();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19]);
    }

    #[tokio::test]
    async fn sink_receives_everything() {
        let done = Done::new();
        let sink = CollectSink::new();
        Pipeline::from_iter(&done, 1..=3)
            .map(|x| x * 10)
            .buffered()
            .sink(sink.clone())
            .await
            .unwrap();
        assert_eq!(sink.take_items().await, vec![10, 20, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn operation_timeout_cancels_pipeline() {
        let done = Done::new();
        let pipeline = Pipeline::repeat(&done, vec![0])
            .sleep(Duration::from_secs(1))
            .operation_timeout(Duration::from_millis(2500));
        let signal = pipeline.done().clone();

        let res = pipeline.count().await;
        assert!(matches!(res, Err(Error::Timeout { duration_ms: 2500 })));
        assert!(signal.is_cancelled());
        assert!(!done.is_cancelled());
        done.cancel();
    }

    #[tokio::test]
    async fn caller_cancel_ends_pipeline_cleanly() {
        let done = Done::new();
        let pipeline = Pipeline::repeat(&done, vec![1]).or_done();
        done.cancel();
        assert!(pipeline.count().await.is_ok());
    }
}
