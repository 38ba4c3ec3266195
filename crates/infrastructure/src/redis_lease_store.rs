//! Redis-backed lease store.
//!
//! Every object is a payload string plus a companion lease key that holds
//! the current token under a `PX` expiry. Lease-gated operations compare the
//! presented token inside a Lua script so the check and the mutation happen
//! atomically.

use std::time::Duration;

use async_trait::async_trait;
use leasegate_application::{LeaseStore, LeaseToken, StoreObject};
use leasegate_core::{AppError, AppResult};
use leasegate_domain::{ObjectPath, Scope};
use redis::{AsyncCommands, Script};

const ACQUIRE_LEASE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return -1
end
if redis.call('SET', KEYS[2], ARGV[1], 'NX', 'PX', ARGV[2]) then
  return 1
end
return 0
"#;

const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

const READ_PAYLOAD_SCRIPT: &str = r#"
if redis.call('GET', KEYS[2]) ~= ARGV[1] then
  return {0, ''}
end
local payload = redis.call('GET', KEYS[1])
if not payload then
  return {-1, ''}
end
return {1, payload}
"#;

const WRITE_PAYLOAD_SCRIPT: &str = r#"
if redis.call('GET', KEYS[2]) ~= ARGV[1] then
  return 0
end
if redis.call('EXISTS', KEYS[1]) == 0 then
  return -1
end
redis.call('SET', KEYS[1], ARGV[2])
return 1
"#;

const DELETE_IF_EMPTY_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[2]) == 1 then
  return 0
end
local payload = redis.call('GET', KEYS[1])
if payload and payload ~= '' then
  return -1
end
redis.call('DEL', KEYS[1])
return 1
"#;

/// Redis implementation of the lease store port.
#[derive(Clone)]
pub struct RedisLeaseStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisLeaseStore {
    /// Creates one store adapter. All keys are placed under `key_prefix`.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn containers_key(&self) -> String {
        format!("{}:containers", self.key_prefix)
    }

    fn payload_key(&self, path: &ObjectPath) -> String {
        format!("{}:{}:{}:payload", self.key_prefix, path.scope(), path.key())
    }

    fn lease_key(&self, path: &ObjectPath) -> String {
        format!("{}:{}:{}:lease", self.key_prefix, path.scope(), path.key())
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!("failed to connect to redis: {error}"))
            })
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn ensure_container(&self, scope: &Scope) -> AppResult<()> {
        let mut connection = self.connection().await?;
        connection
            .sadd::<_, _, ()>(self.containers_key(), scope.as_str())
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!(
                    "failed to create container '{scope}': {error}"
                ))
            })
    }

    async fn ensure_object(&self, path: &ObjectPath) -> AppResult<StoreObject> {
        let mut connection = self.connection().await?;

        let container_exists: bool = connection
            .sismember(self.containers_key(), path.scope().as_str())
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!(
                    "failed to look up container '{}': {error}",
                    path.scope()
                ))
            })?;
        if !container_exists {
            return Err(AppError::NotFound(format!(
                "container '{}' does not exist",
                path.scope()
            )));
        }

        connection
            .set_nx::<_, _, bool>(self.payload_key(path), "")
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!("failed to create object '{path}': {error}"))
            })?;

        Ok(StoreObject::new(path.clone()))
    }

    async fn acquire_lease(
        &self,
        object: &StoreObject,
        duration: Duration,
    ) -> AppResult<LeaseToken> {
        let lease_millis = u64::try_from(duration.as_millis())
            .ok()
            .filter(|millis| *millis > 0)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "lease duration {duration:?} must be between 1ms and u64::MAX ms"
                ))
            })?;

        let token = uuid::Uuid::new_v4().to_string();
        let mut connection = self.connection().await?;

        let acquired = Script::new(ACQUIRE_LEASE_SCRIPT)
            .key(self.payload_key(&object.path))
            .key(self.lease_key(&object.path))
            .arg(token.as_str())
            .arg(lease_millis)
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!(
                    "failed to acquire lease on '{}': {error}",
                    object.path
                ))
            })?;

        match acquired {
            1 => Ok(LeaseToken::new(token)),
            0 => Err(AppError::LeaseConflict(format!(
                "object '{}' is leased by another holder",
                object.path
            ))),
            _ => Err(AppError::NotFound(format!(
                "object '{}' does not exist",
                object.path
            ))),
        }
    }

    async fn release_lease(&self, object: &StoreObject, token: &LeaseToken) -> AppResult<()> {
        let mut connection = self.connection().await?;

        let released = Script::new(RELEASE_LEASE_SCRIPT)
            .key(self.lease_key(&object.path))
            .arg(token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!(
                    "failed to release lease on '{}': {error}",
                    object.path
                ))
            })?;

        if released == 0 {
            return Err(AppError::LeaseLost(format!(
                "lease on '{}' is no longer held",
                object.path
            )));
        }

        Ok(())
    }

    async fn read_payload(&self, object: &StoreObject, token: &LeaseToken) -> AppResult<Vec<u8>> {
        let mut connection = self.connection().await?;

        let (status, payload) = Script::new(READ_PAYLOAD_SCRIPT)
            .key(self.payload_key(&object.path))
            .key(self.lease_key(&object.path))
            .arg(token.as_str())
            .invoke_async::<(i32, Vec<u8>)>(&mut connection)
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!(
                    "failed to read object '{}': {error}",
                    object.path
                ))
            })?;

        match status {
            1 => Ok(payload),
            0 => Err(AppError::LeaseLost(format!(
                "lease on '{}' is no longer held",
                object.path
            ))),
            _ => Err(AppError::NotFound(format!(
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
        let mut connection = self.connection().await?;

        let written = Script::new(WRITE_PAYLOAD_SCRIPT)
            .key(self.payload_key(&object.path))
            .key(self.lease_key(&object.path))
            .arg(token.as_str())
            .arg(payload)
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!(
                    "failed to write object '{}': {error}",
                    object.path
                ))
            })?;

        match written {
            1 => Ok(()),
            0 => Err(AppError::LeaseLost(format!(
                "lease on '{}' is no longer held",
                object.path
            ))),
            _ => Err(AppError::NotFound(format!(
                "object '{}' does not exist",
                object.path
            ))),
        }
    }

    async fn delete_if_empty(&self, object: &StoreObject) -> AppResult<bool> {
        let mut connection = self.connection().await?;

        let deleted = Script::new(DELETE_IF_EMPTY_SCRIPT)
            .key(self.payload_key(&object.path))
            .key(self.lease_key(&object.path))
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!(
                    "failed to delete object '{}': {error}",
                    object.path
                ))
            })?;

        match deleted {
            0 => Err(AppError::LeaseConflict(format!(
                "object '{}' is leased and cannot be deleted",
                object.path
            ))),
            -1 => Ok(false),
            _ => Ok(true),
        }
    }
}
