//! Sequential retry with exponential backoff.

use super::classifier::{classify, is_retryable};
use super::types::FailoverReason;
use crate::env::retry::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MAX_RETRIES,
};
use crate::llm::error::ProviderError;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Observer invoked before each backoff sleep.
pub type RetryObserver = Box<dyn Fn(&RetryEvent<'_>) + Send + Sync>;

/// Details handed to the retry observer.
#[derive(Debug)]
pub struct RetryEvent<'a> {
    /// 1-based number of the retry about to be scheduled.
    pub attempt: u32,
    pub delay: Duration,
    pub error: &'a ProviderError,
    pub reason: Option<FailoverReason>,
}

pub struct RetryOptions {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub on_retry: Option<RetryObserver>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            on_retry: None,
        }
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn on_retry(mut self, observer: impl Fn(&RetryEvent<'_>) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Box::new(observer));
        self
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.backoff_multiplier;
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled.max(0.0))
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent.
///
/// Attempts never overlap: each backoff sleep completes before the next call
/// starts. The error from the final attempt is returned unchanged.
pub async fn with_retry<T, F, Fut>(mut operation: F, options: RetryOptions) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt: u32 = 0;
    let mut delay = options.initial_delay.min(options.max_delay);

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let reason = classify(&error);
        let message = error.to_string();
        if !is_retryable(reason, &message) {
            debug!(reason = ?reason, error = %message, "Non-retryable error, giving up");
            return Err(error);
        }
        if attempt >= options.max_retries {
            warn!(
                attempts = attempt + 1,
                reason = ?reason,
                error = %message,
                "Retry budget exhausted"
            );
            return Err(error);
        }

        attempt += 1;
        if let Some(observer) = &options.on_retry {
            observer(&RetryEvent {
                attempt,
                delay,
                error: &error,
                reason,
            });
        }
        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            reason = ?reason,
            error = %message,
            "Retryable error, backing off"
        );

        tokio::time::sleep(delay).await;
        delay = options.next_delay(delay);
    }
}
