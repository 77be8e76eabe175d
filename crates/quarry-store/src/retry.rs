//! Retry policies for transient store failures

use std::thread;
use std::time::Duration;

use crate::error::Result;

/// Executes a unit of work, replaying it on transient failures.
///
/// The closure is replayed from scratch on every attempt: it must
/// re-acquire its locks and reopen its transaction itself. Fatal errors
/// and exhausted attempts surface the last error to the caller.
pub trait RetryPolicy: Send + Sync {
    fn execute(&self, op: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}

/// Retry a bounded number of times with a fixed delay between attempts.
pub struct FixedDelayRetry {
    attempts: u32,
    delay: Duration,
}

impl FixedDelayRetry {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl Default for FixedDelayRetry {
    fn default() -> Self {
        Self::new(6, Duration::from_millis(200))
    }
}

impl RetryPolicy for FixedDelayRetry {
    fn execute(&self, op: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    tracing::debug!("Transient store failure on attempt {}: {}", attempt, err);
                    attempt += 1;
                    thread::sleep(self.delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn succeeds_after_transient_failures() {
        let policy = FixedDelayRetry::new(5, Duration::ZERO);
        let mut calls = 0;
        let result = policy.execute(&mut || {
            calls += 1;
            if calls < 3 {
                Err(StoreError::Busy("database is locked".into()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn fatal_error_is_not_retried() {
        let policy = FixedDelayRetry::new(5, Duration::ZERO);
        let mut calls = 0;
        let result = policy.execute(&mut || {
            calls += 1;
            Err(StoreError::Database("no such table".into()))
        });
        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn exhaustion_surfaces_last_error() {
        let policy = FixedDelayRetry::new(3, Duration::ZERO);
        let mut calls = 0;
        let result = policy.execute(&mut || {
            calls += 1;
            Err(StoreError::Busy("database is locked".into()))
        });
        assert!(matches!(result, Err(StoreError::Busy(_))));
        assert_eq!(calls, 3);
    }
}
