use std::time::Duration;

use async_trait::async_trait;
use leasegate_application::{LeaseStore, LeaseToken, StoreObject};
use leasegate_core::{AppError, AppResult};
use leasegate_domain::{ObjectPath, Scope};
use sqlx::PgPool;

/// PostgreSQL-backed lease store.
///
/// Leases are columns on the object row; a lease counts as held while
/// `lease_expires_at` is in the future.
#[derive(Clone)]
pub struct PostgresLeaseStore {
    pool: PgPool,
}

impl PostgresLeaseStore {
    /// Creates a lease store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn object_exists(&self, path: &ObjectPath) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM lease_objects
                WHERE scope = $1 AND object_key = $2
            )
            "#,
        )
        .bind(path.scope().as_str())
        .bind(path.key().as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::StoreUnavailable(format!("failed to look up object '{path}': {error}"))
        })
    }

    async fn lease_missing_error(&self, path: &ObjectPath) -> AppError {
        match self.object_exists(path).await {
            Ok(true) => AppError::LeaseLost(format!("lease on '{path}' is no longer held")),
            Ok(false) => AppError::NotFound(format!("object '{path}' does not exist")),
            Err(error) => error,
        }
    }
}

#[async_trait]
impl LeaseStore for PostgresLeaseStore {
    async fn ensure_container(&self, scope: &Scope) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO lease_containers (scope)
            VALUES ($1)
            ON CONFLICT (scope) DO NOTHING
            "#,
        )
        .bind(scope.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::StoreUnavailable(format!("failed to create container '{scope}': {error}"))
        })?;

        Ok(())
    }

    async fn ensure_object(&self, path: &ObjectPath) -> AppResult<StoreObject> {
        let result = sqlx::query(
            r#"
            INSERT INTO lease_objects (scope, object_key)
            VALUES ($1, $2)
            ON CONFLICT (scope, object_key) DO NOTHING
            "#,
        )
        .bind(path.scope().as_str())
        .bind(path.key().as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(StoreObject::new(path.clone())),
            Err(error) => {
                if let sqlx::Error::Database(database_error) = &error
                    && database_error.code().as_deref() == Some("23503")
                {
                    return Err(AppError::NotFound(format!(
                        "container '{}' does not exist",
                        path.scope()
                    )));
                }

                Err(AppError::StoreUnavailable(format!(
                    "failed to create object '{path}': {error}"
                )))
            }
        }
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

        let token = uuid::Uuid::new_v4().to_string();
        let acquired = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE lease_objects
            SET lease_token = $3,
                lease_expires_at = now() + make_interval(secs => $4),
                updated_at = now()
            WHERE scope = $1
              AND object_key = $2
              AND (lease_token IS NULL OR lease_expires_at <= now())
            RETURNING lease_token
            "#,
        )
        .bind(object.path.scope().as_str())
        .bind(object.path.key().as_str())
        .bind(token.as_str())
        .bind(duration.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::StoreUnavailable(format!(
                "failed to acquire lease on '{}': {error}",
                object.path
            ))
        })?;

        match acquired {
            Some(token) => Ok(LeaseToken::new(token)),
            None if self.object_exists(&object.path).await? => Err(AppError::LeaseConflict(
                format!("object '{}' is leased by another holder", object.path),
            )),
            None => Err(AppError::NotFound(format!(
                "object '{}' does not exist",
                object.path
            ))),
        }
    }

    async fn release_lease(&self, object: &StoreObject, token: &LeaseToken) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE lease_objects
            SET lease_token = NULL,
                lease_expires_at = NULL,
                updated_at = now()
            WHERE scope = $1
              AND object_key = $2
              AND lease_token = $3
              AND lease_expires_at > now()
            "#,
        )
        .bind(object.path.scope().as_str())
        .bind(object.path.key().as_str())
        .bind(token.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::StoreUnavailable(format!(
                "failed to release lease on '{}': {error}",
                object.path
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::LeaseLost(format!(
                "lease on '{}' is no longer held",
                object.path
            )));
        }

        Ok(())
    }

    async fn read_payload(&self, object: &StoreObject, token: &LeaseToken) -> AppResult<Vec<u8>> {
        let payload = sqlx::query_scalar::<_, Vec<u8>>(
            r#"
            SELECT payload
            FROM lease_objects
            WHERE scope = $1
              AND object_key = $2
              AND lease_token = $3
              AND lease_expires_at > now()
            "#,
        )
        .bind(object.path.scope().as_str())
        .bind(object.path.key().as_str())
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::StoreUnavailable(format!(
                "failed to read object '{}': {error}",
                object.path
            ))
        })?;

        match payload {
            Some(payload) => Ok(payload),
            None => Err(self.lease_missing_error(&object.path).await),
        }
    }

    async fn write_payload(
        &self,
        object: &StoreObject,
        payload: &[u8],
        token: &LeaseToken,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE lease_objects
            SET payload = $4,
                updated_at = now()
            WHERE scope = $1
              AND object_key = $2
              AND lease_token = $3
              AND lease_expires_at > now()
            "#,
        )
        .bind(object.path.scope().as_str())
        .bind(object.path.key().as_str())
        .bind(token.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::StoreUnavailable(format!(
                "failed to write object '{}': {error}",
                object.path
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(self.lease_missing_error(&object.path).await);
        }

        Ok(())
    }

    async fn delete_if_empty(&self, object: &StoreObject) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM lease_objects
            WHERE scope = $1
              AND object_key = $2
              AND (lease_token IS NULL OR lease_expires_at <= now())
              AND payload = ''::BYTEA
            "#,
        )
        .bind(object.path.scope().as_str())
        .bind(object.path.key().as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::StoreUnavailable(format!(
                "failed to delete object '{}': {error}",
                object.path
            ))
        })?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let leased = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT lease_token IS NOT NULL AND lease_expires_at > now()
            FROM lease_objects
            WHERE scope = $1 AND object_key = $2
            "#,
        )
        .bind(object.path.scope().as_str())
        .bind(object.path.key().as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::StoreUnavailable(format!(
                "failed to look up object '{}': {error}",
                object.path
            ))
        })?;

        match leased {
            None => Ok(true),
            Some(true) => Err(AppError::LeaseConflict(format!(
                "object '{}' is leased and cannot be deleted",
                object.path
            ))),
            Some(false) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests;
