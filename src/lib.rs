//! # Cancellable stream pipelines for Rust
//!
//! This crate builds data pipelines out of small concurrent stages connected
//! by streams. Every stage runs on its own task and every stage watches a
//! shared cancellation signal, so a whole pipeline can be stopped at once
//! without leaking tasks.
//!
//! ## Core Concepts
//!
//! - **Stream**: the conduit between two stages; unbuffered by default
//! - **Done**: the one-shot cancellation signal every stage watches
//! - **Context**: a signal with a reason, a deadline and a parent
//! - **Source**: starts a pipeline (`repeat`, `repeat_with`, `from_iter`)
//! - **Processor**: transforms values between two streams
//! - **Dispatcher**: routes values across streams (`fan_out`, `fan_in`,
//!   `tee`, `bridge`)
//! - **Sink**: the final consumer
//!
//! ## Example
//!
//! ```rust
//! use pipeweld::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let done = Done::new();
//!     let words = Pipeline::repeat(&done, vec!["I", "am."])
//!         .take(5)
//!         .collect()
//!         .await?;
//!
//!     assert_eq!(words.concat(), "Iam.Iam.I");
//!     done.cancel();
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod dispatcher;
pub mod greeter;
pub mod pipeline;
pub mod processors;
pub mod sinks;
pub mod sources;
pub mod util;

// Re-export commonly used items
pub mod prelude {
    pub use crate::core::{
        channel, AnyValue, CancelHandle, Context, Done, Error, Processor, Result, Sink, Stream,
        StreamSender,
    };
    pub use crate::dispatcher::{bridge, fan_in, fan_out, tee};
    pub use crate::greeter::{Greeter, GreeterConfig};
    pub use crate::pipeline::{Pipeline, PipelineConfig};
    pub use crate::processors::combinators::{buffer, or_done, sleep, take};
    pub use crate::processors::{
        add, filter, map, multiply, prime_finder, to_typed, try_convert, FilterProcessor,
        MapProcessor, PrimeFinder,
    };
    pub use crate::sinks::{drain, CollectSink, CountSink, PrintSink};
    pub use crate::sources::{from_iter, repeat, repeat_with};
    pub use crate::util::CancellableExt;
}

// Re-export main error type
pub use crate::core::{Error, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
