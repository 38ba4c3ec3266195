use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use leasegate_application::{LeaseStore, LeaseToken, StoreObject};
use leasegate_core::{AppError, AppResult};
use leasegate_domain::{ObjectPath, Scope};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct ActiveLease {
    token: String,
    expires_at: Instant,
}

impl ActiveLease {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
struct StoredObject {
    payload: Vec<u8>,
    lease: Option<ActiveLease>,
}

impl StoredObject {
    fn live_lease(&self, now: Instant) -> Option<&ActiveLease> {
        self.lease.as_ref().filter(|lease| lease.is_live(now))
    }

    fn is_held_by(&self, token: &LeaseToken, now: Instant) -> bool {
        self.live_lease(now)
            .is_some_and(|lease| lease.token == token.as_str())
    }
}

#[derive(Debug, Default)]
struct LeaseStoreState {
    containers: HashSet<Scope>,
    objects: HashMap<ObjectPath, StoredObject>,
}

/// Process-local lease store with expiring leases.
///
/// Leases lapse on their own once their duration passes, the same way a
/// remote store would revoke them from an unresponsive holder.
#[derive(Default)]
pub struct InMemoryLeaseStore {
    state: Mutex<LeaseStoreState>,
}

impl InMemoryLeaseStore {
    /// Creates an empty in-memory lease store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn ensure_container(&self, scope: &Scope) -> AppResult<()> {
        self.state.lock().await.containers.insert(scope.clone());
        Ok(())
    }

    async fn ensure_object(&self, path: &ObjectPath) -> AppResult<StoreObject> {
        let mut state = self.state.lock().await;
        if !state.containers.contains(path.scope()) {
            return Err(AppError::NotFound(format!(
                "container '{}' does not exist",
                path.scope()
            )));
        }

        state.objects.entry(path.clone()).or_default();
        Ok(StoreObject::new(path.clone()))
    }

    async fn acquire_lease(
        &self,
        object: &StoreObject,
        duration: Duration,
    ) -> AppResult<LeaseToken> {
        if duration.is_zero() {
            return Err(AppError::Validation(
                "lease duration must be greater than zero".to_owned(),
            ));
        }

        let now = Instant::now();
        let mut state = self.state.lock().await;
        let stored = state
            .objects
            .get_mut(&object.path)
            .ok_or_else(|| AppError::NotFound(format!("object '{}' does not exist", object.path)))?;

        if stored.live_lease(now).is_some() {
            return Err(AppError::LeaseConflict(format!(
                "object '{}' is leased by another holder",
                object.path
            )));
        }

        let token = uuid::Uuid::new_v4().to_string();
        stored.lease = Some(ActiveLease {
            token: token.clone(),
            expires_at: now.checked_add(duration).unwrap_or(now),
        });

        Ok(LeaseToken::new(token))
    }

    async fn release_lease(&self, object: &StoreObject, token: &LeaseToken) -> AppResult<()> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        match state.objects.get_mut(&object.path) {
            Some(stored) if stored.is_held_by(token, now) => {
                stored.lease = None;
                Ok(())
            }
            _ => Err(AppError::LeaseLost(format!(
                "lease on '{}' is no longer held",
                object.path
            ))),
        }
    }

    async fn read_payload(&self, object: &StoreObject, token: &LeaseToken) -> AppResult<Vec<u8>> {
        let now = Instant::now();
        let state = self.state.lock().await;
        match state.objects.get(&object.path) {
            Some(stored) if stored.is_held_by(token, now) => Ok(stored.payload.clone()),
            Some(_) => Err(AppError::LeaseLost(format!(
                "lease on '{}' is no longer held",
                object.path
            ))),
            None => Err(AppError::NotFound(format!(
                "object '{}' does not exist",
                object.path
            ))),
        }
    }

    async fn write_payload(
        &self,
        object: &StoreObject,
        payload: &[u8],
        token: &LeaseToken,
    ) -> AppResult<()> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        match state.objects.get_mut(&object.path) {
            Some(stored) if stored.is_held_by(token, now) => {
                stored.payload = payload.to_vec();
                Ok(())
            }
            Some(_) => Err(AppError::LeaseLost(format!(
                "lease on '{}' is no longer held",
                object.path
            ))),
            None => Err(AppError::NotFound(format!(
                "object '{}' does not exist",
                object.path
            ))),
        }
    }

    async fn delete_if_empty(&self, object: &StoreObject) -> AppResult<bool> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let Some(stored) = state.objects.get(&object.path) else {
            return Ok(true);
        };

        if stored.live_lease(now).is_some() {
            return Err(AppError::LeaseConflict(format!(
                "object '{}' is leased and cannot be deleted",
                object.path
            )));
        }
        if !stored.payload.is_empty() {
            return Ok(false);
        }

        state.objects.remove(&object.path);
        Ok(true)
    }
}
