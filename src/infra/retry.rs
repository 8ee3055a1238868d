// ============================================================
// Layer 6 — Retry Policy
// ============================================================
// Wraps an operation that may fail with AbsaError::Transient
// (hub downloads). Transient failures are logged and retried
// after a fixed delay; any other error is returned at once.
// `max_attempts: None` retries until the operation succeeds.

use std::thread;
use std::time::Duration;

use crate::domain::error::AbsaResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: Option<usize>,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: None, delay: Duration::from_secs(60) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: Option<usize>, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    pub fn run<T>(&self, mut op: impl FnMut() -> AbsaResult<T>) -> AbsaResult<T> {
        let mut attempt = 1usize;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    if self.max_attempts.is_some_and(|max| attempt >= max) {
                        tracing::error!("Giving up after {} attempts: {}", attempt, err);
                        return Err(err);
                    }
                    tracing::warn!(
                        "Attempt {} failed: {}; retrying in {:?}",
                        attempt,
                        err,
                        self.delay
                    );
                    thread::sleep(self.delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
