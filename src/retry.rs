use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RequestError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Maps a 1-based retry number to the wait before that retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Linear,
    Exponential,
}

/// Side-effecting hook invoked before each retry with the error that
/// triggered it and the 1-based retry number. A hook failure halts the
/// retry loop and surfaces as `RETRY_CALLBACK_ERROR`.
pub trait RetryHook: Send + Sync {
    fn on_retry(&self, error: &RequestError, attempt: u32) -> Result<(), BoxError>;
}

#[derive(Clone)]
pub struct RetryPolicy {
    max: u32,
    delay: Duration,
    backoff: Backoff,
    factor: u32,
    retry_on: BTreeSet<u16>,
    retry_on_transport: bool,
    retry_on_timeout: bool,
    on_retry: Option<Arc<dyn RetryHook>>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RetryPolicy")
            .field("max", &self.max)
            .field("delay", &self.delay)
            .field("backoff", &self.backoff)
            .field("factor", &self.factor)
            .field("retry_on", &self.retry_on)
            .field("retry_on_transport", &self.retry_on_transport)
            .field("retry_on_timeout", &self.retry_on_timeout)
            .field("on_retry", &self.on_retry.as_ref().map(|_| "..."))
            .finish()
    }
}

impl RetryPolicy {
    /// No retries at all: empty status set, zero budget.
    pub fn disabled() -> Self {
        Self {
            max: 0,
            delay: Duration::from_millis(200),
            backoff: Backoff::Exponential,
            factor: 2,
            retry_on: BTreeSet::new(),
            retry_on_transport: false,
            retry_on_timeout: false,
            on_retry: None,
        }
    }

    /// Sensible defaults for service-to-service traffic: two retries with
    /// exponential backoff on throttling and transient 5xx answers, plus
    /// transport-level failures. Timeouts are not retried.
    pub fn standard() -> Self {
        Self {
            max: 2,
            delay: Duration::from_millis(200),
            backoff: Backoff::Exponential,
            factor: 2,
            retry_on: [429_u16, 500, 502, 503, 504].into_iter().collect(),
            retry_on_transport: true,
            retry_on_timeout: false,
            on_retry: None,
        }
    }

    /// Maximum retry attempts after the first send.
    pub fn max(mut self, max: u32) -> Self {
        self.max = max;
        self
    }

    /// Base delay fed into the backoff curve.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Multiplier for exponential backoff. Clamped to at least 1.
    pub fn factor(mut self, factor: u32) -> Self {
        self.factor = factor.max(1);
        self
    }

    /// Status codes eligible for retry. An empty set means status failures
    /// are never retried.
    pub fn retry_on(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retry_on = codes.into_iter().collect();
        self
    }

    /// Whether transport-level failures (no HTTP status) are retried.
    pub fn retry_on_transport(mut self, retry: bool) -> Self {
        self.retry_on_transport = retry;
        self
    }

    /// Whether a timed-out attempt is retried. Off by default.
    pub fn retry_on_timeout(mut self, retry: bool) -> Self {
        self.retry_on_timeout = retry;
        self
    }

    pub fn on_retry(mut self, hook: Arc<dyn RetryHook>) -> Self {
        self.on_retry = Some(hook);
        self
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.max
    }

    pub(crate) fn on_retry_hook(&self) -> Option<&Arc<dyn RetryHook>> {
        self.on_retry.as_ref()
    }

    /// Whether this error class is eligible for another attempt. Status
    /// failures consult `retry_on` only; transport and timeout failures go
    /// through their own switches; everything else is terminal.
    pub fn should_retry(&self, error: &RequestError) -> bool {
        match error {
            RequestError::Transport { .. } => self.retry_on_transport,
            RequestError::Timeout { .. } => self.retry_on_timeout,
            _ => match error.status_code() {
                Some(status) => !self.retry_on.is_empty() && self.retry_on.contains(&status),
                None => false,
            },
        }
    }

    /// Delay before the given 1-based retry. Saturates instead of
    /// overflowing for large attempt numbers.
    pub fn backoff_for_retry(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay_ms = self.delay.as_millis();
        let scaled_ms = match self.backoff {
            Backoff::Fixed => delay_ms,
            Backoff::Linear => delay_ms.saturating_mul(u128::from(attempt)),
            Backoff::Exponential => {
                let exponent = (attempt - 1).min(31);
                let multiplier = u128::from(self.factor).saturating_pow(exponent);
                delay_ms.saturating_mul(multiplier)
            }
        };
        Duration::from_millis(scaled_ms.min(u64::MAX as u128) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}
