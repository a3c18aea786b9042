//! Core types for the pipeweld library.
//!
//! This module contains the stream conduit, the cancellation signals and the
//! traits that every stage is built from.

pub mod cancel;
pub mod context;
pub mod error;
pub mod stream;
pub mod traits;

// Re-export core items
pub use cancel::Done;
pub use context::{CancelHandle, Context, ContextGuard};
pub use error::{Error, Result};
pub use stream::{channel, AnyValue, SharedStream, Stream, StreamSender};
pub use traits::{Processor, Sink};
