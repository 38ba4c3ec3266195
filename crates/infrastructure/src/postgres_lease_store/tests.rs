use std::time::Duration;

use leasegate_application::LeaseStore;
use leasegate_core::AppError;
use leasegate_domain::{ObjectKey, ObjectPath, Scope};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use super::PostgresLeaseStore;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres lease store tests: {error}");
    }

    Some(pool)
}

fn unique_path(key: &str) -> ObjectPath {
    ObjectPath::new(
        Scope::new(format!("scope-{}", uuid::Uuid::new_v4())).unwrap_or_else(|_| unreachable!()),
        ObjectKey::new(key).unwrap_or_else(|_| unreachable!()),
    )
}

#[tokio::test]
async fn object_requires_existing_container() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PostgresLeaseStore::new(pool);

    let result = store.ensure_object(&unique_path("order-1-lock")).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn lease_gates_payload_access() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PostgresLeaseStore::new(pool);
    let target = unique_path("order-1-lock");

    assert!(store.ensure_container(target.scope()).await.is_ok());
    assert!(store.ensure_container(target.scope()).await.is_ok());
    let object = store
        .ensure_object(&target)
        .await
        .unwrap_or_else(|_| unreachable!());

    let token = store
        .acquire_lease(&object, Duration::from_secs(5))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(matches!(
        store.acquire_lease(&object, Duration::from_secs(5)).await,
        Err(AppError::LeaseConflict(_))
    ));
    assert!(matches!(
        store.read_payload(&object, &token).await.as_deref(),
        Ok(b"")
    ));
    assert!(store.write_payload(&object, b"stamp", &token).await.is_ok());
    assert!(matches!(
        store.delete_if_empty(&object).await,
        Err(AppError::LeaseConflict(_))
    ));
    assert!(store.release_lease(&object, &token).await.is_ok());
    assert!(matches!(
        store.read_payload(&object, &token).await,
        Err(AppError::LeaseLost(_))
    ));

    let again = store
        .ensure_object(&target)
        .await
        .unwrap_or_else(|_| unreachable!());
    let next = store
        .acquire_lease(&again, Duration::from_secs(5))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(matches!(
        store.read_payload(&again, &next).await.as_deref(),
        Ok(b"stamp")
    ));
    assert!(store.release_lease(&again, &next).await.is_ok());
    assert!(matches!(store.delete_if_empty(&again).await, Ok(false)));

    let cleared = store
        .acquire_lease(&again, Duration::from_secs(5))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(store.write_payload(&again, b"", &cleared).await.is_ok());
    assert!(store.release_lease(&again, &cleared).await.is_ok());
    assert!(matches!(store.delete_if_empty(&again).await, Ok(true)));
    assert!(matches!(store.delete_if_empty(&again).await, Ok(true)));
    assert!(matches!(
        store.acquire_lease(&again, Duration::from_secs(5)).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn expired_lease_is_lost_and_reacquirable() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PostgresLeaseStore::new(pool);
    let target = unique_path("order-2-lock");

    assert!(store.ensure_container(target.scope()).await.is_ok());
    let object = store
        .ensure_object(&target)
        .await
        .unwrap_or_else(|_| unreachable!());

    let stale = store
        .acquire_lease(&object, Duration::from_millis(50))
        .await
        .unwrap_or_else(|_| unreachable!());
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(matches!(
        store.write_payload(&object, b"late", &stale).await,
        Err(AppError::LeaseLost(_))
    ));
    assert!(matches!(
        store.release_lease(&object, &stale).await,
        Err(AppError::LeaseLost(_))
    ));
    assert!(store.acquire_lease(&object, Duration::from_secs(5)).await.is_ok());
}
