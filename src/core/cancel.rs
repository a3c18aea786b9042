//! The broadcast cancellation signal shared by every stage.

use tokio_util::sync::{
    CancellationToken, WaitForCancellationFuture, WaitForCancellationFutureOwned,
};

/// A level-triggered, idempotent stop signal.
///
/// Cloning a `Done` yields another handle to the same signal. Once
/// [`cancel`](Done::cancel) is called the signal stays raised forever and every
/// clone observes it, so a single `Done` can be handed to all stages of a
/// pipeline and raised from any task.
///
/// ```rust
/// use pipeweld::core::Done;
///
/// let done = Done::new();
/// let seen_by_stage = done.clone();
/// done.cancel();
/// done.cancel();
/// assert!(seen_by_stage.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Done {
    token: CancellationToken,
}

impl Done {
    /// Create a new, unraised signal
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Raise the signal. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Non-blocking check
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal is raised
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Owned variant of [`cancelled`](Done::cancelled) for storing in futures
    pub fn cancelled_owned(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }

    /// Derive a signal that is raised with this one but can also be raised on
    /// its own without affecting the parent.
    pub fn child(&self) -> Done {
        Done {
            token: self.token.child_token(),
        }
    }

    /// The underlying token, for interop with other tokio-util users
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl From<CancellationToken> for Done {
    fn from(token: CancellationToken) -> Self {
        Self { token }
    }
}
