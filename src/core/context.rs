//! A cancellation signal that also carries why it was raised and an
//! optional deadline.
//!
//! Contexts form a tree: a child is raised when its parent is raised, when its
//! own [`CancelHandle`] is used, or when its deadline elapses. Raising a child
//! never affects the parent. [`Context::err`] reports [`Error::Cancelled`] or
//! [`Error::DeadlineExceeded`] so callers can decide whether to escalate.

use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use tokio::time::Instant;

use crate::core::cancel::Done;
use crate::core::error::Error;

#[derive(Debug)]
struct ContextInner {
    done: Done,
    reason: OnceLock<Error>,
    deadline: Option<Instant>,
    parent: Option<Context>,
}

impl ContextInner {
    fn cancel_with(&self, reason: Error) {
        // Already raised, possibly by an ancestor: the first reason stands.
        if self.done.is_cancelled() {
            return;
        }
        // Reason first, so any observer of the raised signal can read it.
        let _ = self.reason.set(reason);
        self.done.cancel();
    }
}

/// A cancellation signal with a reason, a deadline and a parent.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// A root context that is never raised on its own
    pub fn background() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                done: Done::new(),
                reason: OnceLock::new(),
                deadline: None,
                parent: None,
            }),
        }
    }

    /// Derive a child that can be cancelled explicitly
    pub fn with_cancel(parent: &Context) -> (Context, CancelHandle) {
        let ctx = parent.derive(parent.deadline());
        let handle = CancelHandle {
            inner: ctx.inner.clone(),
        };
        (ctx, handle)
    }

    /// Derive a child raised automatically after `timeout`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_timeout(parent: &Context, timeout: Duration) -> (Context, CancelHandle) {
        Self::with_deadline(parent, Instant::now() + timeout)
    }

    /// Derive a child raised automatically at `deadline`.
    ///
    /// If the parent already expires earlier, the child simply inherits that
    /// deadline. Must be called from within a Tokio runtime.
    pub fn with_deadline(parent: &Context, deadline: Instant) -> (Context, CancelHandle) {
        if let Some(inherited) = parent.deadline() {
            if inherited <= deadline {
                return Self::with_cancel(parent);
            }
        }

        let ctx = parent.derive(Some(deadline));
        let handle = CancelHandle {
            inner: ctx.inner.clone(),
        };

        if deadline <= Instant::now() {
            ctx.inner.cancel_with(Error::DeadlineExceeded);
        } else if !ctx.is_done() {
            spawn_deadline_timer(Arc::downgrade(&ctx.inner), ctx.inner.done.clone(), deadline);
        }

        (ctx, handle)
    }

    fn derive(&self, deadline: Option<Instant>) -> Context {
        Context {
            inner: Arc::new(ContextInner {
                done: self.inner.done.child(),
                reason: OnceLock::new(),
                deadline,
                parent: Some(self.clone()),
            }),
        }
    }

    /// The plain signal, for handing to pipeline stages
    pub fn done(&self) -> &Done {
        &self.inner.done
    }

    /// Non-blocking check
    pub fn is_done(&self) -> bool {
        self.inner.done.is_cancelled()
    }

    /// Resolves once this context is raised for any reason
    pub async fn cancelled(&self) {
        self.inner.done.cancelled().await
    }

    /// The earliest deadline of this context and its ancestors
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Why the context was raised, or `None` while it is still live.
    pub fn err(&self) -> Option<Error> {
        if !self.is_done() {
            return None;
        }
        self.inner
            .reason
            .get()
            .cloned()
            .or_else(|| self.inner.parent.as_ref().and_then(Context::err))
            .or(Some(Error::Cancelled))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

fn spawn_deadline_timer(inner: Weak<ContextInner>, done: Done, deadline: Instant) {
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = done.cancelled() => {}
            _ = tokio::time::sleep_until(deadline) => {
                if let Some(inner) = inner.upgrade() {
                    tracing::debug!("context deadline elapsed");
                    inner.cancel_with(Error::DeadlineExceeded);
                }
            }
        }
    });
}

/// Raises the [`Context`] it was created with.
///
/// Cloneable so several tasks can share the ability to cancel; cancelling more
/// than once keeps the first reason.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    inner: Arc<ContextInner>,
}

impl CancelHandle {
    /// Cancel the context and everything derived from it
    pub fn cancel(&self) {
        self.inner.cancel_with(Error::Cancelled);
    }

    /// Cancel when the returned guard goes out of scope
    pub fn drop_guard(self) -> ContextGuard {
        ContextGuard { handle: self }
    }
}

/// Cancels its context on drop.
#[derive(Debug)]
#[must_use = "the context is cancelled as soon as the guard is dropped"]
pub struct ContextGuard {
    handle: CancelHandle,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
