use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::StoreResult;

/// Timing of connection probes and operation retries.
///
/// Retries are sequential with fixed delays and no jitter.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Reachability probes made by `install()` before giving up.
    pub install_attempts: u32,
    /// Sleep between two probes.
    pub install_delay: Duration,
    /// Factor applied to the probe timeout after each failed probe.
    pub backoff: f64,
    /// Attempts made by an operation hitting a transient disconnect.
    pub operation_attempts: u32,
    /// Sleep between two operation attempts.
    pub operation_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            install_attempts: 3,
            install_delay: Duration::from_secs(1),
            backoff: 1.5,
            operation_attempts: 3,
            operation_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Same attempt counts, no sleeping.
    pub fn immediate() -> Self {
        Self {
            install_delay: Duration::ZERO,
            operation_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Timeout for the probe numbered `attempt` (starting at 0).
    pub fn probe_timeout(&self, base: Duration, attempt: u32) -> Duration {
        base.mul_f64(self.backoff.powi(attempt as i32))
    }

    /// Run `op`, retrying transient failures.
    ///
    /// Non-transient errors are returned immediately. The last transient
    /// error is returned once attempts are exhausted.
    pub fn run<T>(&self, operation: &str, mut op: impl FnMut() -> StoreResult<T>) -> StoreResult<T> {
        let attempts = self.operation_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(operation, attempt, error = %err, "transient store failure, retrying");
                    if !self.operation_delay.is_zero() {
                        thread::sleep(self.operation_delay);
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
