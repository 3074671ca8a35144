//! Startup connect with bounded exponential backoff.
//!
//! Attempt `n` sleeps for `sleep / 2 + jitter`, where
//! `sleep = base * 2^min(n, max_exponent)` and `jitter` is drawn uniformly from
//! `[0, sleep / 3)`. Attempts continue until one succeeds or `max_wait` has
//! elapsed since the first one.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{info, warn};

use super::source::MessageSource;
use crate::utils::{FanoutError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max_exponent: u32,
    pub max_wait: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_BASE: Duration = Duration::from_millis(200);
    pub const DEFAULT_MAX_EXPONENT: u32 = 6;

    pub fn new(max_wait: Duration) -> Self {
        Self {
            base: Self::DEFAULT_BASE,
            max_exponent: Self::DEFAULT_MAX_EXPONENT,
            max_wait,
        }
    }

    /// Upper end of the backoff window for `attempt` (1-based).
    pub fn window(&self, attempt: u32) -> Duration {
        self.base * 2u32.pow(attempt.min(self.max_exponent))
    }

    /// Randomized delay to sleep after failed `attempt`.
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let sleep = self.window(attempt);
        let spread = (sleep / 3).as_nanos() as u64;
        let jitter = if spread == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(rng.random_range(0..spread))
        };
        sleep / 2 + jitter
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

/// Connect to `source`, retrying until `policy.max_wait` runs out.
///
/// Running out of time is reported as `FanoutError::BrokerConnect` carrying the
/// last underlying failure.
pub async fn connect_with_retry<S: MessageSource>(
    source: &S,
    policy: &RetryPolicy,
) -> Result<S::Deliveries> {
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match source.connect().await {
            Ok(deliveries) => {
                info!(attempt, source = %source.describe(), "connected to broker");
                return Ok(deliveries);
            }
            Err(e) => e,
        };

        let waited = started.elapsed();
        if waited >= policy.max_wait {
            return Err(FanoutError::BrokerConnect {
                attempts: attempt,
                waited,
                source: Box::new(err),
            });
        }

        let delay = policy
            .delay_for(attempt, &mut rand::rng())
            .min(policy.max_wait - waited);
        warn!(
            attempt,
            wait_ms = delay.as_millis() as u64,
            error = %err,
            "broker connect failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
