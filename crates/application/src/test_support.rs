use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leasegate_core::{AppError, AppResult};
use leasegate_domain::{ObjectPath, Scope, decode_timestamp, encode_timestamp};
use tokio::sync::{Mutex, Notify};

use crate::lease_ports::{LeaseStore, LeaseToken, StoreObject};

#[derive(Default)]
struct FakeObject {
    payload: Vec<u8>,
    lease: Option<String>,
}

/// Lease store fake with knobs for failure injection.
#[derive(Default)]
pub(crate) struct FakeLeaseStore {
    containers: Mutex<HashSet<String>>,
    objects: Mutex<HashMap<String, FakeObject>>,
    next_token: AtomicUsize,
    acquire_attempts: AtomicUsize,
    not_found_races: AtomicUsize,
    unavailable: AtomicBool,
}

impl FakeLeaseStore {
    pub(crate) fn acquire_attempts(&self) -> usize {
        self.acquire_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_next_acquires_with_not_found(&self, count: usize) {
        self.not_found_races.store(count, Ordering::SeqCst);
    }

    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub(crate) async fn seed_timestamp(&self, path: &ObjectPath, timestamp: DateTime<Utc>) {
        self.objects
            .lock()
            .await
            .entry(path.to_string())
            .or_default()
            .payload = encode_timestamp(timestamp);
    }

    pub(crate) async fn timestamp(&self, path: &ObjectPath) -> Option<DateTime<Utc>> {
        self.objects
            .lock()
            .await
            .get(&path.to_string())
            .and_then(|object| decode_timestamp(&object.payload))
    }

    pub(crate) async fn exists(&self, path: &ObjectPath) -> bool {
        self.objects.lock().await.contains_key(&path.to_string())
    }

    pub(crate) async fn is_leased(&self, path: &ObjectPath) -> bool {
        self.objects
            .lock()
            .await
            .get(&path.to_string())
            .is_some_and(|object| object.lease.is_some())
    }

    /// Simulates the store expiring a lease behind the holder's back.
    pub(crate) async fn expire_lease(&self, path: &ObjectPath) {
        if let Some(object) = self.objects.lock().await.get_mut(&path.to_string()) {
            object.lease = None;
        }
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("fake store is down".to_owned()));
        }

        Ok(())
    }
}

#[async_trait]
impl LeaseStore for FakeLeaseStore {
    async fn ensure_container(&self, scope: &Scope) -> AppResult<()> {
        self.check_available()?;
        self.containers
            .lock()
            .await
            .insert(scope.as_str().to_owned());
        Ok(())
    }

    async fn ensure_object(&self, path: &ObjectPath) -> AppResult<StoreObject> {
        self.check_available()?;
        self.objects
            .lock()
            .await
            .entry(path.to_string())
            .or_default();
        Ok(StoreObject::new(path.clone()))
    }

    async fn acquire_lease(
        &self,
        object: &StoreObject,
        _duration: Duration,
    ) -> AppResult<LeaseToken> {
        self.acquire_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        if self
            .not_found_races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
        {
            return Err(AppError::NotFound(format!("{} vanished", object.path)));
        }

        let mut objects = self.objects.lock().await;
        let stored = objects
            .get_mut(&object.path.to_string())
            .ok_or_else(|| AppError::NotFound(object.path.to_string()))?;

        if stored.lease.is_some() {
            return Err(AppError::LeaseConflict(object.path.to_string()));
        }

        let token = format!("token-{}", self.next_token.fetch_add(1, Ordering::SeqCst));
        stored.lease = Some(token.clone());
        Ok(LeaseToken::new(token))
    }

    async fn release_lease(&self, object: &StoreObject, token: &LeaseToken) -> AppResult<()> {
        self.check_available()?;
        let mut objects = self.objects.lock().await;
        match objects.get_mut(&object.path.to_string()) {
            Some(stored) if stored.lease.as_deref() == Some(token.as_str()) => {
                stored.lease = None;
                Ok(())
            }
            _ => Err(AppError::LeaseLost(object.path.to_string())),
        }
    }

    async fn read_payload(&self, object: &StoreObject, token: &LeaseToken) -> AppResult<Vec<u8>> {
        self.check_available()?;
        let objects = self.objects.lock().await;
        match objects.get(&object.path.to_string()) {
            Some(stored) if stored.lease.as_deref() == Some(token.as_str()) => {
                Ok(stored.payload.clone())
            }
            _ => Err(AppError::LeaseLost(object.path.to_string())),
        }
    }

    async fn write_payload(
        &self,
        object: &StoreObject,
        payload: &[u8],
        token: &LeaseToken,
    ) -> AppResult<()> {
        self.check_available()?;
        let mut objects = self.objects.lock().await;
        match objects.get_mut(&object.path.to_string()) {
            Some(stored) if stored.lease.as_deref() == Some(token.as_str()) => {
                stored.payload = payload.to_vec();
                Ok(())
            }
            _ => Err(AppError::LeaseLost(object.path.to_string())),
        }
    }

    async fn delete_if_empty(&self, object: &StoreObject) -> AppResult<bool> {
        self.check_available()?;
        let mut objects = self.objects.lock().await;
        let key = object.path.to_string();
        match objects.get(&key) {
            None => Ok(true),
            Some(stored) if stored.lease.is_some() => Err(AppError::LeaseConflict(key)),
            Some(stored) if !stored.payload.is_empty() => Ok(false),
            Some(_) => {
                objects.remove(&key);
                Ok(true)
            }
        }
    }
}

/// Lease store wrapper that adds latency to every call and a longer one to
/// deletes, widening the window between a release and the follow-up delete.
pub(crate) struct SlowLeaseStore {
    inner: Arc<FakeLeaseStore>,
    call_delay: Duration,
    delete_delay: Duration,
}

impl SlowLeaseStore {
    pub(crate) fn new(
        inner: Arc<FakeLeaseStore>,
        call_delay: Duration,
        delete_delay: Duration,
    ) -> Self {
        Self {
            inner,
            call_delay,
            delete_delay,
        }
    }
}

#[async_trait]
impl LeaseStore for SlowLeaseStore {
    async fn ensure_container(&self, scope: &Scope) -> AppResult<()> {
        tokio::time::sleep(self.call_delay).await;
        self.inner.ensure_container(scope).await
    }

    async fn ensure_object(&self, path: &ObjectPath) -> AppResult<StoreObject> {
        tokio::time::sleep(self.call_delay).await;
        self.inner.ensure_object(path).await
    }

    async fn acquire_lease(
        &self,
        object: &StoreObject,
        duration: Duration,
    ) -> AppResult<LeaseToken> {
        tokio::time::sleep(self.call_delay).await;
        self.inner.acquire_lease(object, duration).await
    }

    async fn release_lease(&self, object: &StoreObject, token: &LeaseToken) -> AppResult<()> {
        tokio::time::sleep(self.call_delay).await;
        self.inner.release_lease(object, token).await
    }

    async fn read_payload(&self, object: &StoreObject, token: &LeaseToken) -> AppResult<Vec<u8>> {
        tokio::time::sleep(self.call_delay).await;
        self.inner.read_payload(object, token).await
    }

    async fn write_payload(
        &self,
        object: &StoreObject,
        payload: &[u8],
        token: &LeaseToken,
    ) -> AppResult<()> {
        tokio::time::sleep(self.call_delay).await;
        self.inner.write_payload(object, payload, token).await
    }

    async fn delete_if_empty(&self, object: &StoreObject) -> AppResult<bool> {
        tokio::time::sleep(self.delete_delay).await;
        self.inner.delete_if_empty(object).await
    }
}

/// Lease store wrapper that parks the first delete of a `-lock` object until
/// the test resumes it.
pub(crate) struct PausedLockDeleteStore {
    inner: Arc<FakeLeaseStore>,
    armed: AtomicBool,
    delete_started: Notify,
    resume: Notify,
}

impl PausedLockDeleteStore {
    pub(crate) fn new(inner: Arc<FakeLeaseStore>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
            delete_started: Notify::new(),
            resume: Notify::new(),
        }
    }

    pub(crate) async fn wait_for_paused_delete(&self) {
        self.delete_started.notified().await;
    }

    pub(crate) fn resume_delete(&self) {
        self.resume.notify_one();
    }
}

#[async_trait]
impl LeaseStore for PausedLockDeleteStore {
    async fn ensure_container(&self, scope: &Scope) -> AppResult<()> {
        self.inner.ensure_container(scope).await
    }

    async fn ensure_object(&self, path: &ObjectPath) -> AppResult<StoreObject> {
        self.inner.ensure_object(path).await
    }

    async fn acquire_lease(
        &self,
        object: &StoreObject,
        duration: Duration,
    ) -> AppResult<LeaseToken> {
        self.inner.acquire_lease(object, duration).await
    }

    async fn release_lease(&self, object: &StoreObject, token: &LeaseToken) -> AppResult<()> {
        self.inner.release_lease(object, token).await
    }

    async fn read_payload(&self, object: &StoreObject, token: &LeaseToken) -> AppResult<Vec<u8>> {
        self.inner.read_payload(object, token).await
    }

    async fn write_payload(
        &self,
        object: &StoreObject,
        payload: &[u8],
        token: &LeaseToken,
    ) -> AppResult<()> {
        self.inner.write_payload(object, payload, token).await
    }

    async fn delete_if_empty(&self, object: &StoreObject) -> AppResult<bool> {
        if object.path.key().as_str().ends_with("-lock") && self.armed.swap(false, Ordering::SeqCst)
        {
            self.delete_started.notify_one();
            self.resume.notified().await;
        }

        self.inner.delete_if_empty(object).await
    }
}
