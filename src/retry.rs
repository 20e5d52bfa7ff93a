//! Retry policy for store calls.
//!
//! Only transient failures (`StoreError::Unavailable`) are retried. Waits grow as
//! `backoff_base * 2^attempt`.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, warn};

use crate::error::StoreError;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_attempts: 3, backoff_base_ms: 1000 }
  }
}

impl RetryPolicy {
  /// Policy that tries once and never sleeps.
  pub fn none() -> Self {
    Self { max_attempts: 1, backoff_base_ms: 0 }
  }

  pub fn backoff(&self, attempt: u32) -> Duration {
    Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << attempt.min(16)))
  }

  /// Run `op` until it succeeds, fails permanently, or attempts run out.
  pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, StoreError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
  {
    let attempts = self.max_attempts.max(1);
    let mut attempt = 0;
    loop {
      match op().await {
        Ok(v) => return Ok(v),
        Err(e) if e.is_transient() && attempt + 1 < attempts => {
          let wait = self.backoff(attempt);
          warn!(target: "prepforge_backend", %what, attempt = attempt + 1, max_attempts = attempts, ?wait, error = %e, "Store call failed; retrying");
          if !wait.is_zero() {
            tokio::time::sleep(wait).await;
          }
          attempt += 1;
        }
        Err(e) => {
          if e.is_transient() {
            error!(target: "prepforge_backend", %what, attempts, error = %e, "Store call failed after all attempts");
          }
          return Err(e);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn fast(max_attempts: u32) -> RetryPolicy {
    RetryPolicy { max_attempts, backoff_base_ms: 0 }
  }

  #[test]
  fn backoff_doubles() {
    let p = RetryPolicy { max_attempts: 3, backoff_base_ms: 100 };
    assert_eq!(p.backoff(0), Duration::from_millis(100));
    assert_eq!(p.backoff(1), Duration::from_millis(200));
    assert_eq!(p.backoff(2), Duration::from_millis(400));
  }

  #[tokio::test]
  async fn retries_transient_until_success() {
    let calls = AtomicU32::new(0);
    let out = fast(3)
      .run("flaky", || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
          if n < 2 { Err(StoreError::Unavailable("reset".into())) } else { Ok(n) }
        }
      })
      .await;
    assert_eq!(out, Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn gives_up_after_max_attempts() {
    let calls = AtomicU32::new(0);
    let out: Result<(), _> = fast(2)
      .run("down", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(StoreError::Unavailable("down".into())) }
      })
      .await;
    assert!(out.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn permanent_errors_are_not_retried() {
    let calls = AtomicU32::new(0);
    let out: Result<(), _> = fast(5)
      .run("corrupt", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(StoreError::Corrupt("bad".into())) }
      })
      .await;
    assert_eq!(out, Err(StoreError::Corrupt("bad".into())));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
