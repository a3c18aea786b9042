//! Two sibling lookups sharing one cancellation signal.
//!
//! Both the greeting and the farewell wait on a slow locale lookup. With a
//! plain [`Done`] the caller can only stop both at once. With a [`Context`]
//! the greeting runs under its own short deadline, and when it fails the
//! caller escalates by cancelling the shared parent, which aborts the
//! farewell that is still waiting.

use std::time::Duration;

use crate::core::{Context, Done, Error, Result};
use crate::util::CancellableExt;

const SUPPORTED_LOCALE: &str = "EN/US";

/// Configuration for [`Greeter`]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GreeterConfig {
    /// Locale the lookup resolves to
    pub locale: String,
    /// How long a locale lookup takes
    pub lookup_delay: Duration,
    /// Deadline applied to the greeting in the context variant
    pub greeting_timeout: Duration,
}

impl Default for GreeterConfig {
    fn default() -> Self {
        Self {
            locale: SUPPORTED_LOCALE.to_string(),
            lookup_delay: Duration::from_secs(5),
            greeting_timeout: Duration::from_secs(1),
        }
    }
}

/// Result of running both lookups side by side.
#[derive(Debug)]
pub struct ChainOutcome {
    /// `"hello world!"` or why the greeting failed
    pub greeting: Result<String>,
    /// `"goodbye world!"` or why the farewell failed
    pub farewell: Result<String>,
}

impl ChainOutcome {
    /// True when both lines were produced
    pub fn is_ok(&self) -> bool {
        self.greeting.is_ok() && self.farewell.is_ok()
    }
}

/// Produces greetings and farewells after a cancellable locale lookup.
#[derive(Debug, Clone, Default)]
pub struct Greeter {
    config: GreeterConfig,
}

impl Greeter {
    /// Create a greeter with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a greeter from a configuration
    pub fn with_config(config: GreeterConfig) -> Self {
        Self { config }
    }

    /// Set the locale the lookup returns
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.config.locale = locale.into();
        self
    }

    /// Set how long the lookup takes
    pub fn lookup_delay(mut self, delay: Duration) -> Self {
        self.config.lookup_delay = delay;
        self
    }

    /// Set the greeting deadline used by the context variant
    pub fn greeting_timeout(mut self, timeout: Duration) -> Self {
        self.config.greeting_timeout = timeout;
        self
    }

    pub fn config(&self) -> &GreeterConfig {
        &self.config
    }

    async fn lookup_locale(&self, done: &Done) -> Result<String> {
        tokio::time::sleep(self.config.lookup_delay)
            .cancellable(done)
            .await?;
        Ok(self.config.locale.clone())
    }

    async fn lookup_locale_in(&self, ctx: &Context) -> Result<String> {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(ctx.err().unwrap_or(Error::Cancelled)),
            _ = tokio::time::sleep(self.config.lookup_delay) => Ok(self.config.locale.clone()),
        }
    }

    /// `"hello"` once the lookup completes, unless `done` is raised first.
    pub async fn greeting(&self, done: &Done) -> Result<String> {
        let locale = self.lookup_locale(done).await?;
        phrase(&locale, "hello")
    }

    /// `"goodbye"` once the lookup completes, unless `done` is raised first.
    pub async fn farewell(&self, done: &Done) -> Result<String> {
        let locale = self.lookup_locale(done).await?;
        phrase(&locale, "goodbye")
    }

    /// Greeting under a child context with its own deadline.
    ///
    /// Fails with [`Error::DeadlineExceeded`] when the lookup outlasts
    /// `greeting_timeout`.
    pub async fn greeting_in(&self, ctx: &Context) -> Result<String> {
        let (ctx, cancel) = Context::with_timeout(ctx, self.config.greeting_timeout);
        let _guard = cancel.drop_guard();
        let locale = self.lookup_locale_in(&ctx).await?;
        phrase(&locale, "hello")
    }

    /// Farewell bounded only by `ctx`.
    pub async fn farewell_in(&self, ctx: &Context) -> Result<String> {
        let locale = self.lookup_locale_in(ctx).await?;
        phrase(&locale, "goodbye")
    }

    /// Run both lookups concurrently under a shared [`Done`].
    pub async fn run(&self, done: &Done) -> ChainOutcome {
        let (greeting, farewell) = tokio::join!(self.greeting(done), self.farewell(done));
        ChainOutcome {
            greeting: greeting.map(line),
            farewell: farewell.map(line),
        }
    }

    /// Run both lookups under a context derived from `parent`.
    ///
    /// A failed greeting cancels the shared context, so the farewell stops
    /// waiting too.
    pub async fn run_in(&self, parent: &Context) -> ChainOutcome {
        let (ctx, cancel) = Context::with_cancel(parent);
        let _guard = cancel.clone().drop_guard();

        let greeting = async {
            let res = self.greeting_in(&ctx).await;
            if let Err(e) = &res {
                tracing::warn!(error = %e, "cannot print greeting");
                cancel.cancel();
            }
            res
        };
        let farewell = async {
            let res = self.farewell_in(&ctx).await;
            if let Err(e) = &res {
                tracing::warn!(error = %e, "cannot print farewell");
            }
            res
        };

        let (greeting, farewell) = tokio::join!(greeting, farewell);
        ChainOutcome {
            greeting: greeting.map(line),
            farewell: farewell.map(line),
        }
    }
}

fn phrase(locale: &str, word: &str) -> Result<String> {
    if locale == SUPPORTED_LOCALE {
        Ok(word.to_string())
    } else {
        Err(Error::UnsupportedLocale(locale.to_string()))
    }
}

fn line(word: String) -> String {
    format!("{} world!", word)
}
