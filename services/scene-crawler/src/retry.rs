//!
//! src/retry.rs  Andrew Belles  Oct 2nd, 2025
//!
//! Bounded retry with exponential backoff, applied around any fallible
//! network call. Only transient errors are retried.
//!

use std::{thread::sleep, time::Duration};

use rand::{rngs::SmallRng, Rng, SeedableRng};
use tracing::{error, warn};

use crate::config::RetryConfig;
use crate::errors::CrawlerError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_backoff: Duration,
    pub jitter: bool
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_backoff: cfg.base_backoff,
            jitter: cfg.jitter
        }
    }
}

/// Wait before the next attempt; base * 2^attempt (+ jitter)
fn generate_backoff(
    base: Duration,
    attempt: usize,
    jitter: bool,
    rng: &mut SmallRng
) -> Duration {
    let exp = base * (1_u32 << attempt.min(6));
    if jitter {
        exp + Duration::from_millis(rng.gen_range(50..=200))
    } else {
        exp
    }
}

pub fn with_retry<T, F>(policy: &RetryPolicy, op: &str, mut f: F) -> Result<T, CrawlerError>
where
    F: FnMut() -> Result<T, CrawlerError>
{
    let mut rng = SmallRng::from_entropy();
    let max_attempts = usize::from(policy.max_attempts.max(1));
    let mut attempt = 0_usize;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    error!(op, attempts = attempt, error = %e, "http.retry.exhausted");
                    return Err(e);
                }
                let backoff = generate_backoff(
                    policy.base_backoff, attempt - 1, policy.jitter, &mut rng
                );
                warn!(op, attempt, backoff = ?backoff.as_millis(), error = %e, "http.retry");
                sleep(backoff);
            }
        }
    }
}
