// SPDX-License-Identifier: MIT

//! Bounded retry with jittered exponential backoff.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Retry policy: at most `max_attempts` tries, delays growing
/// exponentially from `base_delay` with up to 50% jitter.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        exp + jitter(exp / 2)
    }
}

/// Cheap jitter source; sub-millisecond clock noise is plenty here.
fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    Duration::from_nanos(nanos % max.as_nanos().min(u64::MAX as u128) as u64)
}

/// Run `operation` until it succeeds, the error is not retryable, or
/// the attempt budget runs out.
pub async fn with_backoff<T, E, F, Fut>(
    policy: BackoffPolicy,
    mut retryable: impl FnMut(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= policy.max_attempts || !retryable(&e) {
                    return Err(e);
                }
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
