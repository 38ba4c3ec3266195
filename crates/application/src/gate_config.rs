use std::time::Duration;

use leasegate_core::{AppError, AppResult};

const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(15);
const DEFAULT_STALENESS_THRESHOLD: Duration = Duration::from_secs(15 * 60);
const DEFAULT_RETRY_JITTER_MIN: Duration = Duration::from_millis(250);
const DEFAULT_RETRY_JITTER_MAX: Duration = Duration::from_millis(1000);

/// Timing policy shared by the exclusive lock and the coalescing gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    lease_duration: Duration,
    staleness_threshold: Duration,
    retry_jitter_min: Duration,
    retry_jitter_max: Duration,
    acquire_timeout: Option<Duration>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            lease_duration: DEFAULT_LEASE_DURATION,
            staleness_threshold: DEFAULT_STALENESS_THRESHOLD,
            retry_jitter_min: DEFAULT_RETRY_JITTER_MIN,
            retry_jitter_max: DEFAULT_RETRY_JITTER_MAX,
            acquire_timeout: None,
        }
    }
}

impl GateConfig {
    /// Creates a validated configuration with default retry jitter and no
    /// acquisition deadline.
    pub fn new(lease_duration: Duration, staleness_threshold: Duration) -> AppResult<Self> {
        let config = Self {
            lease_duration,
            staleness_threshold,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the bounds of the randomized sleep between acquisition attempts.
    pub fn with_retry_jitter(mut self, min: Duration, max: Duration) -> AppResult<Self> {
        self.retry_jitter_min = min;
        self.retry_jitter_max = max;
        self.validate()?;
        Ok(self)
    }

    /// Bounds how long one lock acquisition may keep retrying.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> AppResult<Self> {
        self.acquire_timeout = Some(timeout);
        self.validate()?;
        Ok(self)
    }

    /// Checks every timing invariant.
    pub fn validate(&self) -> AppResult<()> {
        if self.lease_duration.is_zero() {
            return Err(AppError::Validation(
                "lease_duration must be greater than zero".to_owned(),
            ));
        }

        if self.staleness_threshold.is_zero() {
            return Err(AppError::Validation(
                "staleness_threshold must be greater than zero".to_owned(),
            ));
        }

        if self.retry_jitter_max.is_zero() {
            return Err(AppError::Validation(
                "retry_jitter_max must be greater than zero".to_owned(),
            ));
        }

        if self.retry_jitter_min > self.retry_jitter_max {
            return Err(AppError::Validation(
                "retry_jitter_min must not exceed retry_jitter_max".to_owned(),
            ));
        }

        if self.acquire_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(AppError::Validation(
                "acquire_timeout must be greater than zero".to_owned(),
            ));
        }

        Ok(())
    }

    /// Returns the lease duration requested from the store.
    #[must_use]
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Returns the maximum lock age before its holder is presumed dead.
    #[must_use]
    pub fn staleness_threshold(&self) -> Duration {
        self.staleness_threshold
    }

    /// Returns the lower retry jitter bound.
    #[must_use]
    pub fn retry_jitter_min(&self) -> Duration {
        self.retry_jitter_min
    }

    /// Returns the upper retry jitter bound.
    #[must_use]
    pub fn retry_jitter_max(&self) -> Duration {
        self.retry_jitter_max
    }

    /// Returns the optional acquisition deadline.
    #[must_use]
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout
    }
}
