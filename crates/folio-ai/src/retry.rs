//! Retry policy for generation calls.

use std::time::Duration;

/// Retry on HTTP 429 only, waiting `base_delay × attempt` between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub base_delay:   Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_attempts: 3, base_delay: Duration::from_millis(5000) }
  }
}

impl RetryPolicy {
  pub fn with_base_delay(base_delay: Duration) -> Self {
    Self { base_delay, ..Self::default() }
  }

  /// How long to wait after the 1-based `attempt` was rate limited.
  pub fn delay_after(&self, attempt: u32) -> Duration { self.base_delay * attempt }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_waits_five_seconds_per_attempt() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.delay_after(1), Duration::from_secs(5));
    assert_eq!(policy.delay_after(2), Duration::from_secs(10));
  }
}
