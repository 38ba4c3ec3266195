use std::sync::Arc;

use chrono::{DateTime, Utc};
use leasegate_core::{AppError, AppResult};
use leasegate_domain::{decode_timestamp, encode_timestamp};
use tracing::{debug, warn};

use crate::lease_ports::{LeaseStore, LeaseToken, StoreObject};

/// Scoped ownership of one object lease.
///
/// Call [`LockHandle::release`] on every exit path. A handle dropped while
/// still holding its lease (cancelled future, unwinding) releases it on the
/// current tokio runtime in the background.
pub struct LockHandle {
    store: Arc<dyn LeaseStore>,
    object: StoreObject,
    token: Option<LeaseToken>,
    delete_on_release: bool,
}

impl LockHandle {
    pub(super) fn new(store: Arc<dyn LeaseStore>, object: StoreObject, token: LeaseToken) -> Self {
        Self {
            store,
            object,
            token: Some(token),
            delete_on_release: false,
        }
    }

    /// Returns true until the handle has been released.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.token.is_some()
    }

    /// Reads the timestamp payload under the held lease.
    pub async fn read_timestamp(&self) -> AppResult<Option<DateTime<Utc>>> {
        let token = self.held_token()?;
        let payload = self.store.read_payload(&self.object, token).await?;
        let timestamp = decode_timestamp(&payload);

        debug!(
            object = %self.object.path,
            timestamp = ?timestamp,
            "read lock timestamp"
        );
        Ok(timestamp)
    }

    /// Writes a timestamp payload under the held lease.
    pub async fn write_timestamp(&self, now: DateTime<Utc>) -> AppResult<()> {
        let token = self.held_token()?;
        self.store
            .write_payload(&self.object, &encode_timestamp(now), token)
            .await?;

        debug!(object = %self.object.path, timestamp = %now, "wrote lock timestamp");
        Ok(())
    }

    /// Clears the payload and deletes the object once the lease is released.
    ///
    /// The delete only happens while the object is still empty and
    /// unleased, so a holder that stamps it after our release keeps it.
    pub fn mark_delete_on_release(&mut self) {
        self.delete_on_release = true;
        debug!(object = %self.object.path, "object marked for deletion on release");
    }

    /// Releases the lease, deleting the object when marked.
    ///
    /// Releasing twice, or releasing a lease the store already expired, is
    /// not an error. Delete failures are logged and swallowed.
    pub async fn release(&mut self) -> AppResult<()> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };

        release_object(
            self.store.as_ref(),
            &self.object,
            &token,
            self.delete_on_release,
        )
        .await
    }

    fn held_token(&self) -> AppResult<&LeaseToken> {
        self.token.as_ref().ok_or_else(|| {
            AppError::LeaseLost(format!(
                "lease on '{}' was already released",
                self.object.path
            ))
        })
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };

        let store = Arc::clone(&self.store);
        let object = self.object.clone();
        let delete_on_release = self.delete_on_release;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(error) =
                        release_object(store.as_ref(), &object, &token, delete_on_release).await
                    {
                        warn!(
                            object = %object.path,
                            error = %error,
                            "failed to release dropped lock handle"
                        );
                    }
                });
            }
            Err(_) => {
                warn!(
                    object = %self.object.path,
                    "lock handle dropped outside a runtime, lease left to expire"
                );
            }
        }
    }
}

async fn release_object(
    store: &dyn LeaseStore,
    object: &StoreObject,
    token: &LeaseToken,
    delete_on_release: bool,
) -> AppResult<()> {
    if delete_on_release {
        // Clear the payload while still leased so a caller racing in between
        // release and delete observes an empty lock.
        if let Err(error) = store.write_payload(object, &[], token).await {
            debug!(
                object = %object.path,
                error = %error,
                "could not clear payload before delete"
            );
        }
    }

    match store.release_lease(object, token).await {
        Ok(()) => debug!(object = %object.path, "lease released"),
        Err(error) if is_already_released(&error) => {
            debug!(object = %object.path, error = %error, "lease was already gone");
        }
        Err(error) => return Err(error),
    }

    if delete_on_release {
        match store.delete_if_empty(object).await {
            Ok(true) => debug!(object = %object.path, "object deleted"),
            Ok(false) => debug!(
                object = %object.path,
                "object re-stamped after release, kept"
            ),
            Err(error) => warn!(
                object = %object.path,
                error = %error,
                "best-effort object delete failed"
            ),
        }
    }

    Ok(())
}

fn is_already_released(error: &AppError) -> bool {
    matches!(
        error,
        AppError::LeaseLost(_) | AppError::LeaseConflict(_) | AppError::NotFound(_)
    )
}
