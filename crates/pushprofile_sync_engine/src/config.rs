//! Configuration for the sync engine.

use std::time::Duration;

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://mobile.infobip.com";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Application code sent in the `Authorization` header.
    pub application_code: String,
    /// Original base URL of the profile service.
    pub base_url: String,
    /// Retry configuration for transient failures.
    pub retry: RetryConfig,
    /// Request timeout handed to the HTTP client.
    pub request_timeout: Duration,
    /// Failed self-depersonalize attempts before the status becomes `failure`.
    pub max_depersonalize_failures: u32,
    /// Name of the operation queue thread.
    pub queue_thread_name: String,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(application_code: impl Into<String>) -> Self {
        Self {
            application_code: application_code.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(20),
            max_depersonalize_failures: 3,
            queue_thread_name: "pushprofile-queue".to_string(),
        }
    }

    /// Sets the original base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the depersonalize failure limit.
    pub fn with_max_depersonalize_failures(mut self, max: u32) -> Self {
        self.max_depersonalize_failures = max.max(1);
        self
    }

    /// Sets the operation queue thread name.
    pub fn with_queue_thread_name(mut self, name: impl Into<String>) -> Self {
        self.queue_thread_name = name.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Configuration for retry behavior on transient failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra attempts after a transient failure.
    pub max_transient_retries: u32,
    /// Delay before each retry.
    pub retry_delay: Duration,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_transient_retries: u32) -> Self {
        Self {
            max_transient_retries,
            retry_delay: Duration::ZERO,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    /// Sets the retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_transient_retries.saturating_add(1)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(1)
    }
}
