//! Bounded retry with exponential backoff and jitter.
//!
//! Wraps one logical data-access call. Only transient failures (per the
//! classifier) are retried; everything else, including the last transient
//! failure once the budget is spent, is returned to the caller unchanged.

use crate::classifier::classify;
use crate::config::RetryConfig;
use crate::error::StoreError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry policy executor for data-store operations.
///
/// # Example
///
/// ```no_run
/// use cache_steward::config::RetryConfig;
/// use cache_steward::retry::RetryExecutor;
/// use cache_steward::error::StoreError;
///
/// # async fn example() -> Result<(), StoreError> {
/// let retry = RetryExecutor::new(RetryConfig::default());
/// let rows = retry
///     .execute(|| async {
///         // one logical store call
///         Ok::<_, StoreError>(vec![1, 2, 3])
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        RetryExecutor { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `op`, retrying transient failures with backoff.
    ///
    /// # Errors
    ///
    /// The original, unmodified `StoreError` once it is non-transient or
    /// the attempt budget is exhausted.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let class = classify(&error);
                    if !class.is_transient || attempt >= self.config.max_attempts {
                        return Err(error);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "[store] transient failure ({}), retrying attempt {}/{} in {}ms",
                        error.describe(),
                        attempt + 1,
                        self.config.max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// `min(max_delay, initial × multiplier^(attempt−1))` ± uniform jitter.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = (self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(exponent))
        .round()
        .min(self.config.max_delay_ms as f64);
        if self.config.jitter_ratio <= 0.0 {
            return Duration::from_millis(base as u64);
        }
        let jitter = base * self.config.jitter_ratio;
        let offset = rand::rng().random_range(-jitter..=jitter);
        let perturbed = (base + offset).round().max(0.0);
        Duration::from_millis(perturbed as u64)
    }
}
