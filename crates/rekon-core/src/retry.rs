use crate::executor::{Chain, Executor};
use crate::outcome::Outcome;
use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::{debug, warn};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Bounded, immediate retries. Every error is retried; there is no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Result<Self, CoreError> {
        if max_attempts == 0 {
            return Err(CoreError::InvalidPolicy(
                "retry policy needs at least one attempt".to_owned(),
            ));
        }
        Ok(Self { max_attempts })
    }

    pub fn max_attempts(self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

impl TryFrom<u32> for RetryPolicy {
    type Error = CoreError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RetryPolicy> for u32 {
    fn from(policy: RetryPolicy) -> Self {
        policy.max_attempts
    }
}

/// Call `op` until it succeeds or the policy's attempts run out, returning
/// the last error in that case.
pub fn retry<T, E, F>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => {
                if attempt > 1 {
                    debug!("succeeded on attempt {attempt}");
                }
                return Ok(value);
            }
            Err(e) if attempt >= policy.max_attempts => {
                warn!("giving up after {attempt} attempts: {e}");
                return Err(e);
            }
            Err(e) => {
                debug!("attempt {attempt}/{} failed: {e}", policy.max_attempts);
                attempt += 1;
            }
        }
    }
}

/// Re-run `chain` from the start while it ends in `Error`.
///
/// Each pass re-reads from the store, so a read-modify-write chain picks
/// up the newest version after a conflict.
pub fn retry_chain(executor: &Executor<'_>, policy: RetryPolicy, chain: &Chain) -> Outcome {
    retry(policy, || executor.run(chain).into_result()).unwrap_or_else(Outcome::error)
}
