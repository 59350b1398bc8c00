//! bounded exponential backoff
//!
//! the error variant decides whether to retry. fatal errors return on the
//! first attempt, retryable ones back off up to `max_attempts` and then the
//! last error is returned unchanged.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::error::{Result, VoucherError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(2_000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(15_000);
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.5;

/// called with (attempt, delay, error) before each backoff sleep
pub type RetryCallback = Arc<dyn Fn(u32, Duration, &VoucherError) + Send + Sync>;

#[derive(Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub on_retry: Option<RetryCallback>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            on_retry: None,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryConfig {
    pub fn with_on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration, &VoucherError) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(f));
        self
    }

    /// delay after failed attempt `attempt` (1-based):
    /// `min(base * multiplier^(attempt - 1), max)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else if secs <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// classify a failed attempt: fatal errors and the last attempt hand the
    /// error back, anything else backs off before the next attempt
    async fn settle(&self, attempt: u32, err: VoucherError) -> Result<()> {
        if !err.is_retryable() {
            debug!("fatal error on attempt {}, not retrying: {}", attempt, err);
            return Err(err);
        }
        if attempt >= self.attempts() {
            warn!("giving up after {} attempts: {}", attempt, err);
            return Err(err);
        }
        self.back_off(attempt, &err).await;
        Ok(())
    }

    async fn back_off(&self, attempt: u32, err: &VoucherError) {
        let delay = self.delay_for_attempt(attempt);
        warn!(
            "attempt {}/{} failed, retrying in {:?}: {}",
            attempt,
            self.attempts(),
            delay,
            err
        );
        if let Some(cb) = &self.on_retry {
            cb(attempt, delay, err);
        }
        tokio::time::sleep(delay).await;
    }
}

/// retry a stateless operation
pub async fn retry_with_backoff<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => config.settle(attempt, err).await?,
        }
        attempt += 1;
    }
}

/// retry an operation that needs exclusive access to some state, e.g. a
/// synchronizer that rebuilds its tree on every attempt
pub async fn retry_with_state<S, T, F>(config: &RetryConfig, state: &mut S, mut op: F) -> Result<T>
where
    S: Send,
    F: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op(&mut *state).await {
            Ok(value) => return Ok(value),
            Err(err) => config.settle(attempt, err).await?,
        }
        attempt += 1;
    }
}
