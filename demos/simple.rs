//! Small pipelines built from sources, projections and sinks.

use pipeweld::core::{Done, Result};
use pipeweld::pipeline::Pipeline;
use pipeweld::sinks::PrintSink;

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Repeat and take ===");
    let done = Done::new();
    let words = Pipeline::repeat(&done, vec!["I", "am."])
        .take(5)
        .collect()
        .await?;
    println!("{}", words.concat());

    println!("\n=== Projections ===");
    Pipeline::from_iter(&done, vec![1, 2, 3, 4])
        .multiply(2)
        .add(1)
        .multiply(2)
        .sink(PrintSink::with_prefix("Processed: "))
        .await?;

    println!("\n=== Tee ===");
    let (left, right) = Pipeline::from_iter(&done, vec![1, 2]).tee();
    let (left, right) = tokio::join!(left.collect(), right.collect());
    for (a, b) in left?.into_iter().zip(right?) {
        println!("out1: {}, out2: {}", a, b);
    }

    done.cancel();
    println!("\nSimple pipelines completed!");
    Ok(())
}
