//! Backoff between CAS retries.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::{Error, Result};

/// Tracks one retry loop against a [`RetryPolicy`].
pub(crate) struct Backoff<'a> {
    policy: &'a RetryPolicy,
    session_id: &'a str,
    operation: &'static str,
    attempts: u32,
}

impl<'a> Backoff<'a> {
    pub fn new(policy: &'a RetryPolicy, session_id: &'a str, operation: &'static str) -> Self {
        Self {
            policy,
            session_id,
            operation,
            attempts: 1,
        }
    }

    /// Record a lost CAS race and wait before the next attempt.
    ///
    /// Fails with [`Error::LockContention`] once the policy's attempt bound
    /// has been used up.
    pub async fn conflict(&mut self) -> Result<()> {
        if self.attempts >= self.policy.max_attempts {
            warn!(
                session_id = %self.session_id,
                operation = self.operation,
                attempts = self.attempts,
                "CAS retries exhausted"
            );
            return Err(Error::LockContention {
                id: self.session_id.to_string(),
                attempts: self.attempts,
            });
        }

        let delay = self.policy.backoff_for(self.attempts);
        debug!(
            session_id = %self.session_id,
            operation = self.operation,
            attempt = self.attempts,
            backoff_ms = delay.as_millis() as u64,
            "CAS conflict, retrying"
        );
        self.attempts += 1;
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_bound() {
        let policy = RetryPolicy::default().with_max_attempts(3);
        let mut backoff = Backoff::new(&policy, "s1", "test");

        backoff.conflict().await.unwrap();
        backoff.conflict().await.unwrap();
        let err = backoff.conflict().await.unwrap_err();
        assert!(matches!(err, Error::LockContention { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policy_never_waits() {
        let policy = RetryPolicy::default().with_max_attempts(1);
        let mut backoff = Backoff::new(&policy, "s1", "test");
        assert!(backoff.conflict().await.is_err());
    }
}
