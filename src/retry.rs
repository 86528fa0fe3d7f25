use log::{debug, warn};
use rand::random;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{LogError, Result};

/// Configuration for retrying batch writes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: usize,

    /// Initial delay before first retry in milliseconds
    pub initial_delay_ms: u64,

    /// Multiplier for exponential backoff
    pub backoff_factor: f64,

    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,

    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            backoff_factor: 2.0,
            max_delay_ms: 10_000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A configuration that tries exactly once
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let scaled = (current.as_millis() as f64 * self.backoff_factor) as u64;
        let next_ms = scaled.min(self.max_delay_ms);

        if self.jitter {
            Duration::from_millis(next_ms + random::<u64>() % 100)
        } else {
            Duration::from_millis(next_ms)
        }
    }
}

/// Run an operation until it succeeds or `max_attempts` is reached.
///
/// The final error is wrapped in [`LogError::Retry`] and keeps the text of
/// the last underlying failure.
pub async fn execute_with_retry<F, Fut, T, E>(
    operation: F,
    config: &RetryConfig,
    context: &str,
) -> Result<T>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<T, E>> + Send,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;
    let mut delay = Duration::from_millis(config.initial_delay_ms);

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                attempts += 1;

                if attempts >= max_attempts {
                    return Err(LogError::retry(context, attempts, err));
                }

                warn!("{} (attempt {}/{}): {}", context, attempts, max_attempts, err);

                sleep(delay).await;
                delay = config.next_delay(delay);

                debug!("Retrying {} after {:?} delay", context, delay);
            }
        }
    }
}
