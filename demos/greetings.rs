//! Two lookups sharing one signal: first stopped together, then with the
//! greeting's deadline escalated to the farewell.

use std::time::Duration;

use pipeweld::core::{Context, Done};
use pipeweld::greeter::Greeter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let greeter = Greeter::new().lookup_delay(Duration::from_secs(2));

    println!("=== Shared signal ===");
    let outcome = greeter.run(&Done::new()).await;
    print_outcome(outcome.greeting, outcome.farewell);

    println!("\n=== Greeting deadline ===");
    let greeter = greeter.greeting_timeout(Duration::from_secs(1));
    let outcome = greeter.run_in(&Context::background()).await;
    print_outcome(outcome.greeting, outcome.farewell);
}

fn print_outcome(greeting: pipeweld::Result<String>, farewell: pipeweld::Result<String>) {
    for line in [greeting, farewell] {
        match line {
            Ok(line) => println!("{}", line),
            Err(e) => println!("failed: {}", e),
        }
    }
}
