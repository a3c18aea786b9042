//! Transform stages built on the [`Processor`] trait.
//!
//! [`process`] runs any processor as a stage and skips elements whose
//! processing fails; [`try_process`] surfaces those failures downstream as
//! `Err` elements instead. The projections (`map`, `filter`, `add`,
//! `multiply`) and the typed conversions are thin wrappers over the two.

pub mod combinators;

use async_trait::async_trait;
use std::any::Any;
use std::fmt::Display;
use std::marker::PhantomData;
use std::ops::{Add, Mul};

use crate::core::{channel, AnyValue, Done, Error, Processor, Result, Stream, StreamSender};
use crate::util::{emit, spawn_stage, CancellableExt};

/// Run one element through `processor` and forward its outputs.
///
/// Returns `false` once the output can no longer be written or `done` is
/// raised while the processor is still working.
pub(crate) async fn process_item<P>(
    processor: &mut P,
    item: P::Input,
    tx: &StreamSender<P::Output>,
    done: &Done,
    stage: &'static str,
) -> bool
where
    P: Processor,
{
    let Ok(processed) = processor.process(item).cancellable(done).await else {
        return false;
    };
    match processed {
        Ok(outputs) => {
            for output in outputs {
                if !emit(tx, output, done, stage).await {
                    return false;
                }
            }
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "skipping element");
            true
        }
    }
}

/// Flush whatever `processor` holds once its input has closed normally.
pub(crate) async fn finish_processor<P>(
    processor: &mut P,
    tx: &StreamSender<P::Output>,
    done: &Done,
    stage: &'static str,
) where
    P: Processor,
{
    if done.is_cancelled() {
        return;
    }
    match processor.finish().await {
        Ok(outputs) => {
            for output in outputs {
                if !emit(tx, output, done, stage).await {
                    return;
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "processor failed to finish"),
    }
}

fn spawn_processor<P>(
    stage: &'static str,
    done: &Done,
    mut source: Stream<P::Input>,
    mut processor: P,
) -> Stream<P::Output>
where
    P: Processor + 'static,
{
    let (tx, rx) = channel(0);
    let done = done.clone();
    spawn_stage(stage, async move {
        while let Some(item) = source.recv_or_done(&done).await {
            if !process_item(&mut processor, item, &tx, &done, stage).await {
                return;
            }
        }
        finish_processor(&mut processor, &tx, &done, stage).await;
    });
    rx
}

/// Run `processor` over `source`, skipping elements it fails on.
pub fn process<P>(done: &Done, source: Stream<P::Input>, processor: P) -> Stream<P::Output>
where
    P: Processor + 'static,
{
    spawn_processor("process", done, source, processor)
}

fn spawn_try_processor<P>(
    stage: &'static str,
    done: &Done,
    mut source: Stream<P::Input>,
    mut processor: P,
) -> Stream<Result<P::Output>>
where
    P: Processor + 'static,
{
    let (tx, rx) = channel(0);
    let done = done.clone();
    spawn_stage(stage, async move {
        while let Some(item) = source.recv_or_done(&done).await {
            let Ok(processed) = processor.process(item).cancellable(&done).await else {
                return;
            };
            match processed {
                Ok(outputs) => {
                    for output in outputs {
                        if !emit(&tx, Ok(output), &done, stage).await {
                            return;
                        }
                    }
                }
                Err(e) => {
                    if !emit(&tx, Err(e), &done, stage).await {
                        return;
                    }
                }
            }
        }
    });
    rx
}

/// Run `processor` over `source`, delivering each success or failure as its
/// own element.
pub fn try_process<P>(
    done: &Done,
    source: Stream<P::Input>,
    processor: P,
) -> Stream<Result<P::Output>>
where
    P: Processor + 'static,
{
    spawn_try_processor("try_process", done, source, processor)
}

/// A processor that maps events using a function.
pub struct MapProcessor<F, T, U> {
    f: F,
    _phantom: PhantomData<fn(T) -> U>,
}

impl<F, T, U> MapProcessor<F, T, U> {
    /// Create a new map processor
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<F, T, U> Processor for MapProcessor<F, T, U>
where
    F: FnMut(T) -> U + Send + 'static,
    T: Send + 'static,
    U: Send + 'static,
{
    type Input = T;
    type Output = U;

    async fn process(&mut self, item: Self::Input) -> Result<Vec<Self::Output>> {
        Ok(vec![(self.f)(item)])
    }
}

/// A processor that only passes events satisfying a predicate.
pub struct FilterProcessor<F, T> {
    predicate: F,
    _phantom: PhantomData<fn(T)>,
}

impl<F, T> FilterProcessor<F, T> {
    /// Create a new filter processor
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<F, T> Processor for FilterProcessor<F, T>
where
    F: FnMut(&T) -> bool + Send + 'static,
    T: Send + 'static,
{
    type Input = T;
    type Output = T;

    async fn process(&mut self, item: Self::Input) -> Result<Vec<Self::Output>> {
        if (self.predicate)(&item) {
            Ok(vec![item])
        } else {
            Ok(vec![])
        }
    }
}

/// Apply `f` to every element.
pub fn map<T, U, F>(done: &Done, source: Stream<T>, f: F) -> Stream<U>
where
    F: FnMut(T) -> U + Send + 'static,
    T: Send + 'static,
    U: Send + 'static,
{
    spawn_processor("map", done, source, MapProcessor::new(f))
}

/// Keep only elements matching `predicate`.
pub fn filter<T, F>(done: &Done, source: Stream<T>, predicate: F) -> Stream<T>
where
    F: FnMut(&T) -> bool + Send + 'static,
    T: Send + 'static,
{
    spawn_processor("filter", done, source, FilterProcessor::new(predicate))
}

/// Add `additive` to every element.
pub fn add<T>(done: &Done, source: Stream<T>, additive: T) -> Stream<T>
where
    T: Add<Output = T> + Copy + Send + 'static,
{
    spawn_processor(
        "add",
        done,
        source,
        MapProcessor::new(move |x: T| x + additive),
    )
}

/// Multiply every element by `multiplier`.
pub fn multiply<T>(done: &Done, source: Stream<T>, multiplier: T) -> Stream<T>
where
    T: Mul<Output = T> + Copy + Send + 'static,
{
    spawn_processor(
        "multiply",
        done,
        source,
        MapProcessor::new(move |x: T| x * multiplier),
    )
}

/// Recovers the concrete type of type-erased elements.
pub struct Downcast<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Downcast<T> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for Downcast<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Any + Send> Processor for Downcast<T> {
    type Input = AnyValue;
    type Output = T;

    async fn process(&mut self, item: Self::Input) -> Result<Vec<Self::Output>> {
        item.downcast::<T>()
            .map(|value| vec![*value])
            .map_err(|_| Error::conversion::<T>("element has a different type"))
    }
}

/// Recover `T` from each type-erased element; mismatches arrive as
/// [`Error::Conversion`] elements rather than ending the stream.
pub fn to_typed<T>(done: &Done, source: Stream<AnyValue>) -> Stream<Result<T>>
where
    T: Any + Send,
{
    spawn_try_processor("to_typed", done, source, Downcast::<T>::new())
}

/// Converts elements with `TryFrom`.
pub struct TryConvert<T, U> {
    _phantom: PhantomData<fn(T) -> U>,
}

impl<T, U> TryConvert<T, U> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T, U> Default for TryConvert<T, U> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T, U> Processor for TryConvert<T, U>
where
    T: Send + 'static,
    U: TryFrom<T> + Send + 'static,
    U::Error: Display,
{
    type Input = T;
    type Output = U;

    async fn process(&mut self, item: Self::Input) -> Result<Vec<Self::Output>> {
        U::try_from(item)
            .map(|value| vec![value])
            .map_err(|e| Error::conversion::<U>(e.to_string()))
    }
}

/// Convert every element with `TryFrom`, surfacing failures per element.
pub fn try_convert<T, U>(done: &Done, source: Stream<T>) -> Stream<Result<U>>
where
    T: Send + 'static,
    U: TryFrom<T> + Send + 'static,
    U::Error: Display,
{
    spawn_try_processor("try_convert", done, source, TryConvert::<T, U>::new())
}

/// Primality by trial division over every candidate divisor.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    // Linear on purpose: O(n) per candidate.
    (2..n).rev().all(|divisor| n % divisor != 0)
}

const DIVISORS_PER_YIELD: u64 = 4096;

/// [`is_prime`] that hands control back to the runtime every
/// `DIVISORS_PER_YIELD` divisors, so a stage running it stays cancellable.
pub async fn is_prime_yielding(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    let mut divisor = n - 1;
    while divisor > 1 {
        if n % divisor == 0 {
            return false;
        }
        divisor -= 1;
        if divisor % DIVISORS_PER_YIELD == 0 {
            tokio::task::yield_now().await;
        }
    }
    true
}

/// Passes through only the prime candidates.
///
/// A CPU-bound worker meant to be replicated with
/// [`fan_out`](crate::dispatcher::fan_out).
#[derive(Debug, Default, Clone, Copy)]
pub struct PrimeFinder;

#[async_trait]
impl Processor for PrimeFinder {
    type Input = u64;
    type Output = u64;

    async fn process(&mut self, candidate: u64) -> Result<Vec<u64>> {
        Ok(if is_prime_yielding(candidate).await {
            vec![candidate]
        } else {
            vec![]
        })
    }
}

/// A single prime-finding stage.
pub fn prime_finder(done: &Done, source: Stream<u64>) -> Stream<u64> {
    spawn_processor("prime_finder", done, source, PrimeFinder)
}
