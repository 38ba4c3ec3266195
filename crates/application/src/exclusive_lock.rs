//! Lease-backed exclusive lock over one store object.
//!
//! Store leases are short (seconds) and only make a decision-and-bookkeeping
//! step atomic. Callers must not hold a handle across long-running work.

use std::sync::Arc;
use std::time::Duration;

use leasegate_core::{AppError, AppResult};
use leasegate_domain::ObjectPath;
use tracing::debug;

use crate::gate_config::GateConfig;
use crate::lease_ports::LeaseStore;

mod handle;

pub use handle::LockHandle;

/// Acquires exclusive leases with jittered blocking retry.
#[derive(Clone)]
pub struct ExclusiveLock {
    store: Arc<dyn LeaseStore>,
    config: GateConfig,
}

impl ExclusiveLock {
    /// Creates a lock acquirer over one lease store.
    #[must_use]
    pub fn new(store: Arc<dyn LeaseStore>, config: GateConfig) -> Self {
        Self { store, config }
    }

    /// Blocks until the lease on `path` is held.
    ///
    /// Contention and not-found races are retried indefinitely unless the
    /// configuration carries an acquisition timeout. Any other store error
    /// aborts acquisition.
    pub async fn acquire(&self, path: &ObjectPath) -> AppResult<LockHandle> {
        match self.config.acquire_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, self.acquire_with_retry(path))
                .await
                .map_err(|_| {
                    AppError::Timeout(format!(
                        "failed to acquire lease on '{path}' within {} ms",
                        timeout.as_millis()
                    ))
                })?,
            None => self.acquire_with_retry(path).await,
        }
    }

    async fn acquire_with_retry(&self, path: &ObjectPath) -> AppResult<LockHandle> {
        let mut attempt = 0_u32;
        loop {
            attempt = attempt.saturating_add(1);

            match self.try_acquire(path).await {
                Ok(handle) => {
                    debug!(object = %path, attempt, "lease acquired");
                    return Ok(handle);
                }
                Err(error) if error.is_transient_lease_error() => {
                    let delay = jittered_delay(
                        self.config.retry_jitter_min(),
                        self.config.retry_jitter_max(),
                    );
                    debug!(
                        object = %path,
                        attempt,
                        error = %error,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "lease unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn try_acquire(&self, path: &ObjectPath) -> AppResult<LockHandle> {
        self.store.ensure_container(path.scope()).await?;
        // Concurrent callers may all create the object; only one wins the lease.
        let object = self.store.ensure_object(path).await?;
        let token = self
            .store
            .acquire_lease(&object, self.config.lease_duration())
            .await?;

        Ok(LockHandle::new(Arc::clone(&self.store), object, token))
    }
}

/// Picks a uniformly random delay in `[min, max]` at millisecond granularity.
fn jittered_delay(min: Duration, max: Duration) -> Duration {
    let span_ms = u64::try_from(max.saturating_sub(min).as_millis()).unwrap_or(u64::MAX);
    if span_ms == 0 {
        return min;
    }

    let mut bytes = [0u8; 8];
    if getrandom::fill(&mut bytes).is_err() {
        return max;
    }

    let offset_ms = u64::from_le_bytes(bytes) % span_ms.saturating_add(1);
    min.saturating_add(Duration::from_millis(offset_ms))
}
