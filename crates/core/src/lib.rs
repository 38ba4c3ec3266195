//! Shared primitives for all Rust crates in Leasegate.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Result type used across Leasegate crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input, configuration, or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested store object or container does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Lease is already held by another caller.
    #[error("lease conflict: {0}")]
    LeaseConflict(String),

    /// Lease presented with a store operation is no longer held.
    #[error("lease lost: {0}")]
    LeaseLost(String),

    /// Backing store could not serve the request.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Re-injecting a trigger into the delivery system failed.
    #[error("enqueue failed: {0}")]
    EnqueueFailed(String),

    /// Operation did not finish before its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true for the error classes a lease acquisition loop retries.
    ///
    /// Contention and not-found races are expected while several workers
    /// create and lease the same object; everything else is fatal.
    #[must_use]
    pub fn is_transient_lease_error(&self) -> bool {
        matches!(self, Self::LeaseConflict(_) | Self::NotFound(_))
    }
}
