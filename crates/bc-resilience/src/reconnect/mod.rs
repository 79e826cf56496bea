//! Reconnect policy for the store connection.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Linear backoff capped at a ceiling, with a bounded number of attempts.
///
/// Attempt `n` (1-based) waits `initial_delay * (n - 1)`, never more than
/// `max_delay`. The first attempt runs immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Maximum number of connection attempts before giving up.
    pub max_attempts: u32,
    /// Delay unit multiplied by the attempt number.
    pub initial_delay: Duration,
    /// Ceiling for a single delay.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl ReconnectPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    /// Calculates the delay preceding retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        self.initial_delay
            .checked_mul(retry)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Runs `connect` until it succeeds or `max_attempts` is reached.
    ///
    /// `connect` receives the 1-based attempt number. The last error is
    /// returned once attempts are exhausted.
    pub async fn execute<F, Fut, T, E>(&self, mut connect: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match connect(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_for_retry(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Connection attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
