//! Fixed-interval retry.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Runs an operation up to `max_attempts` times, sleeping `interval` between
/// attempts. No backoff, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
  pub interval: Duration,
  pub max_attempts: u32,
}

impl Default for RetryPolicy {
  /// One attempt per second for two minutes.
  fn default() -> Self {
    Self {
      interval: Duration::from_secs(1),
      max_attempts: 120,
    }
  }
}

/// All attempts failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
  pub attempts: u32,
  pub last: E,
}

impl RetryPolicy {
  pub fn new(interval: Duration, max_attempts: u32) -> Self {
    Self { interval, max_attempts }
  }

  /// Call `op` with the 1-based attempt number until it succeeds.
  ///
  /// At least one attempt is always made. There is no sleep after the last
  /// attempt.
  pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryExhausted<E>>
  where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let max_attempts = self.max_attempts.max(1);
    let mut attempt = 1;

    loop {
      match op(attempt).await {
        Ok(value) => return Ok(value),
        Err(last) if attempt >= max_attempts => {
          return Err(RetryExhausted {
            attempts: attempt,
            last,
          });
        }
        Err(e) => {
          debug!(attempt, max_attempts, error = %e, "attempt failed, retrying");
          tokio::time::sleep(self.interval).await;
          attempt += 1;
        }
      }
    }
  }
}
