//! Finding primes among random candidates, first with one worker and then
//! with one worker per CPU.

use std::time::Instant;

use pipeweld::core::{Done, Result};
use pipeweld::dispatcher::{fan_in, fan_out};
use pipeweld::processors::combinators::take;
use pipeweld::processors::{prime_finder, PrimeFinder};
use pipeweld::sources::repeat_with;
use pipeweld::util::stream_into_vec;

const PRIMES_WANTED: usize = 10;

fn candidates(done: &Done, mut seed: u64) -> pipeweld::core::Stream<u64> {
    repeat_with(done, move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed % 50_000_000
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("pipeweld=info")
        .init();

    let done = Done::new();
    let start = Instant::now();
    let primes = stream_into_vec(take(
        &done,
        prime_finder(&done, candidates(&done, 0x2545_f491)),
        PRIMES_WANTED,
    ))
    .await;
    for prime in &primes {
        println!("\t{}", prime);
    }
    println!("Search took: {:?}", start.elapsed());
    done.cancel();

    let done = Done::new();
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    println!("Spinning up {} prime finders.", workers);

    let start = Instant::now();
    let finders = fan_out(&done, candidates(&done, 0x2545_f491), workers, || PrimeFinder);
    let primes = stream_into_vec(take(&done, fan_in(&done, finders), PRIMES_WANTED)).await;
    for prime in &primes {
        println!("\t{}", prime);
    }
    println!("Search took: {:?}", start.elapsed());
    done.cancel();

    Ok(())
}
