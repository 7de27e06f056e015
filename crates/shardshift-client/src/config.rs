//! Sink configuration.

use std::time::Duration;

/// Default number of resubmissions of a batch's failed positions.
pub const DEFAULT_MAX_RESUBMIT_ATTEMPTS: u32 = 3;

/// Default base delay between resubmissions. Attempt `n` waits `n` times this.
pub const DEFAULT_RESUBMIT_BACKOFF: Duration = Duration::from_millis(100);

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Bulk document sink configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkSinkConfig {
    /// Item error types counted as success.
    pub allowlisted_error_types: Vec<String>,

    /// Resubmissions after the first request. Zero disables resubmission.
    pub max_resubmit_attempts: u32,

    /// Linear backoff base between resubmissions.
    pub resubmit_backoff: Duration,

    /// Timeout for a single request to the target.
    pub request_timeout: Duration,
}

impl Default for BulkSinkConfig {
    fn default() -> Self {
        Self {
            allowlisted_error_types: Vec::new(),
            max_resubmit_attempts: DEFAULT_MAX_RESUBMIT_ATTEMPTS,
            resubmit_backoff: DEFAULT_RESUBMIT_BACKOFF,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl BulkSinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count items failing with any of `types` as successful.
    pub fn with_allowlisted_error_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlisted_error_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_resubmit_attempts(mut self, attempts: u32) -> Self {
        self.max_resubmit_attempts = attempts;
        self
    }

    pub fn with_resubmit_backoff(mut self, backoff: Duration) -> Self {
        self.resubmit_backoff = backoff;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
