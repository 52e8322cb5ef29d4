//! Bounded retry around a fallible async operation.

use std::{fmt, future::Future, time::Duration};

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

/// Delay schedule between attempts.
///
/// The baseline is a constant delay; linear and exponential (with jitter)
/// schedules are available for RPC endpoints that throttle under sustained
/// load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Constant { delay: Duration },
    Linear { base: Duration },
    Exponential { base: Duration, max: Duration, jitter: bool },
}

impl RetryPolicy {
    pub fn constant(delay: Duration) -> Self {
        Self::Constant { delay }
    }

    /// Delay to wait after `attempt` (1-based) has failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Constant { delay } => *delay,
            Self::Linear { base } => base.saturating_mul(attempt),
            Self::Exponential { base, max, jitter } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                let delay = base.saturating_mul(factor).min(*max);
                if *jitter && !delay.is_zero() {
                    let millis = delay.as_millis() as u64;
                    let jittered = rand::thread_rng().gen_range(millis / 2..=millis);
                    Duration::from_millis(jittered)
                } else {
                    delay
                }
            }
        }
    }
}

/// All attempts failed; carries the attempt count and the last error.
#[derive(Debug)]
pub struct RetriesExhausted<E> {
    pub attempts: u32,
    pub last: E,
}

impl<E: fmt::Display> fmt::Display for RetriesExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempts: {}", self.attempts, self.last)
    }
}

/// Invokes an operation up to `max_attempts` times, waiting per the policy
/// between attempts. Attempt failures are logged but only surfaced to the
/// caller once attempts are exhausted. Waits are not interruptible.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    max_attempts: u32,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, max_attempts: u32) -> Self {
        assert!(max_attempts >= 1, "max_attempts must be at least 1");
        Self { policy, max_attempts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn execute<T, E, F, Fut>(
        &self,
        label: &str,
        mut operation: F,
    ) -> Result<T, RetriesExhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_attempts {
                        warn!(label, attempt, "attempt failed, no retries left");
                        return Err(RetriesExhausted { attempts: attempt, last: err });
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
