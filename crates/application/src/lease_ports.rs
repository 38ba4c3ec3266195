use std::time::Duration;

use async_trait::async_trait;
use leasegate_core::AppResult;
use leasegate_domain::{ObjectPath, Scope};

/// Handle to one object that exists in a lease store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreObject {
    /// Location of the object.
    pub path: ObjectPath,
}

impl StoreObject {
    /// Creates a store object handle.
    #[must_use]
    pub fn new(path: ObjectPath) -> Self {
        Self { path }
    }
}

/// Opaque token proving ownership of one object lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseToken(String);

impl LeaseToken {
    /// Wraps a store-issued lease token.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Object store capability with per-object exclusive leases.
///
/// Implementations report contention as `AppError::LeaseConflict`, a vanished
/// object as `AppError::NotFound`, a stale token as `AppError::LeaseLost`, and
/// backend failures as `AppError::StoreUnavailable`.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Creates the container for one scope if it does not exist.
    async fn ensure_container(&self, scope: &Scope) -> AppResult<()>;

    /// Creates one object with an empty payload if it does not exist.
    async fn ensure_object(&self, path: &ObjectPath) -> AppResult<StoreObject>;

    /// Acquires an exclusive lease on one object for a bounded duration.
    async fn acquire_lease(&self, object: &StoreObject, duration: Duration)
    -> AppResult<LeaseToken>;

    /// Releases one lease. Releasing an expired or foreign lease returns
    /// `AppError::LeaseLost`.
    async fn release_lease(&self, object: &StoreObject, token: &LeaseToken) -> AppResult<()>;

    /// Reads the object payload while presenting the held lease.
    async fn read_payload(&self, object: &StoreObject, token: &LeaseToken) -> AppResult<Vec<u8>>;

    /// Replaces the object payload while presenting the held lease.
    async fn write_payload(
        &self,
        object: &StoreObject,
        payload: &[u8],
        token: &LeaseToken,
    ) -> AppResult<()>;

    /// Deletes one object if it is unleased and its payload is empty.
    ///
    /// Returns `false` when the object was kept because it carries a payload
    /// (someone stamped it after the caller released its lease), `true` when
    /// it was deleted or did not exist. A live lease on the object is
    /// reported as `AppError::LeaseConflict`. The payload check and the
    /// delete must be atomic.
    async fn delete_if_empty(&self, object: &StoreObject) -> AppResult<bool>;
}
