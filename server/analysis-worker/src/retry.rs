//! Bounded retry with linear backoff (`delay = base * attempt`).

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub base_delay: Duration,
}

impl RetryPolicy {
  pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
    Self {
      max_attempts,
      base_delay,
    }
  }

  /// Pause after the given failed attempt (1-based).
  pub fn delay(&self, attempt: u32) -> Duration {
    self.base_delay * attempt
  }

  /// Attempt counter for call sites that drive the operation themselves,
  /// such as calls through a `&mut` handle that a closure cannot reborrow.
  pub fn attempts<'a>(&self, op: &'a str) -> Attempts<'a> {
    Attempts {
      policy: *self,
      op,
      attempt: 1,
    }
  }

  /// Run `op` until it succeeds or attempts are exhausted; the last error is returned.
  pub async fn run<T, E, F, Fut>(&self, op: &str, mut f: F) -> Result<T, E>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
  {
    let mut attempts = self.attempts(op);
    loop {
      match f().await {
        Ok(value) => return Ok(value),
        Err(e) => match attempts.failed(&e) {
          Some(delay) => tokio::time::sleep(delay).await,
          None => return Err(e),
        },
      }
    }
  }
}

/// Tracks one operation's attempts against a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Attempts<'a> {
  policy: RetryPolicy,
  op: &'a str,
  attempt: u32,
}

impl Attempts<'_> {
  /// Record a failed attempt. Returns the pause before the next attempt, or
  /// `None` once the policy is exhausted.
  pub fn failed(&mut self, error: &dyn Display) -> Option<Duration> {
    let max_attempts = self.policy.max_attempts.max(1);
    if self.attempt >= max_attempts {
      error!(op = self.op, attempts = max_attempts, error = %error, "operation failed permanently");
      return None;
    }
    let delay = self.policy.delay(self.attempt);
    warn!(
      op = self.op,
      attempt = self.attempt,
      max_attempts,
      delay_ms = delay.as_millis() as u64,
      error = %error,
      "operation failed, retrying"
    );
    self.attempt += 1;
    Some(delay)
  }
}

/// The three policies the worker uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicies {
  /// Fetch, persist, delete and publish on the success path.
  pub main: RetryPolicy,
  /// Recording a FAILED outcome.
  pub failure: RetryPolicy,
  /// Startup health gate and queue connection.
  pub startup: RetryPolicy,
}

impl Default for RetryPolicies {
  fn default() -> Self {
    Self {
      main: RetryPolicy::new(3, Duration::from_secs(2)),
      failure: RetryPolicy::new(2, Duration::from_secs(2)),
      startup: RetryPolicy::new(5, Duration::from_secs(3)),
    }
  }
}

impl RetryPolicies {
  /// Same attempt counts with no sleeping between attempts.
  pub fn without_delay() -> Self {
    let d = Self::default();
    Self {
      main: RetryPolicy::new(d.main.max_attempts, Duration::ZERO),
      failure: RetryPolicy::new(d.failure.max_attempts, Duration::ZERO),
      startup: RetryPolicy::new(d.startup.max_attempts, Duration::ZERO),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[test]
  fn delay_grows_linearly() {
    let p = RetryPolicy::new(3, Duration::from_secs(2));
    assert_eq!(p.delay(1), Duration::from_secs(2));
    assert_eq!(p.delay(2), Duration::from_secs(4));
  }

  #[test]
  fn default_attempt_counts() {
    let p = RetryPolicies::default();
    assert_eq!(p.main.max_attempts, 3);
    assert_eq!(p.failure.max_attempts, 2);
    assert_eq!(p.startup.max_attempts, 5);
    assert_eq!(p.startup.base_delay, Duration::from_secs(3));
  }

  #[tokio::test]
  async fn exhausting_attempts_returns_last_error() {
    let calls = &AtomicU32::new(0);
    let p = RetryPolicy::new(3, Duration::ZERO);
    let result: Result<(), String> = p
      .run("always_fails", move || async move {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Err(format!("boom {}", n))
      })
      .await;
    assert_eq!(result.unwrap_err(), "boom 3");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn success_stops_retrying() {
    let calls = &AtomicU32::new(0);
    let p = RetryPolicy::new(5, Duration::ZERO);
    let result: Result<u32, String> = p
      .run("flaky", move || async move {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n < 2 {
          Err("not yet".to_string())
        } else {
          Ok(n)
        }
      })
      .await;
    assert_eq!(result.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn attempts_stop_at_policy_limit() {
    let p = RetryPolicy::new(3, Duration::from_secs(1));
    let mut attempts = p.attempts("publish");
    assert_eq!(attempts.failed(&"down"), Some(Duration::from_secs(1)));
    assert_eq!(attempts.failed(&"down"), Some(Duration::from_secs(2)));
    assert_eq!(attempts.failed(&"down"), None);
  }

  #[tokio::test(start_paused = true)]
  async fn backoff_sleeps_between_attempts() {
    let p = RetryPolicy::new(3, Duration::from_secs(2));
    let start = tokio::time::Instant::now();
    let _: Result<(), &str> = p.run("sleepy", || async { Err("down") }).await;
    assert_eq!(start.elapsed(), Duration::from_secs(6));
  }
}
