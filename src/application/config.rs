use std::time::Duration;

/// Runtime knobs for the ledger service.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Attempts per mutation before a lock conflict is reported as internal.
    pub max_attempts: u32,
    /// Backoff step between attempts; attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_backoff: Duration::from_millis(20),
        }
    }
}

impl LedgerConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    pub(crate) fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(attempt)
    }
}
