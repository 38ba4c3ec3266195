//! Leasegate demo worker: consumes triggers and runs them through the gate.

#![forbid(unsafe_code)]

mod config;

use std::sync::Arc;

use leasegate_application::{CoalescingGate, GateOutcome, LeaseStore, TriggerQueue};
use leasegate_core::{AppError, AppResult};
use leasegate_domain::TriggerMessage;
use leasegate_infrastructure::{
    InMemoryLeaseStore, InMemoryTriggerQueue, PostgresLeaseStore, RedisLeaseStore,
    RedisTriggerQueue,
};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{QueueMode, StoreMode, WorkerConfig};

static MIGRATOR: Migrator = sqlx::migrate!("../../crates/infrastructure/migrations");

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Arc::new(WorkerConfig::load()?);
    let store = build_store(&config).await?;
    let queue = build_queue(&config)?;
    let gate = CoalescingGate::new(store, config.gate)?;

    info!(
        worker_id = %config.worker_id,
        store = config.store_mode.as_str(),
        queue = config.queue_mode.as_str(),
        queue_name = %config.queue_name,
        scope = %config.scope,
        concurrency = config.concurrency,
        work_duration_ms = config.work_duration_ms,
        lease_seconds = config.gate.lease_duration().as_secs(),
        staleness_seconds = config.gate.staleness_threshold().as_secs(),
        "leasegate-worker started"
    );

    for id in &config.seed_ids {
        let message = TriggerMessage::new(id.as_str())?;
        queue.enqueue(&message).await?;
        info!(worker_id = %config.worker_id, id = %id, "seeded trigger");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut consumers = Vec::with_capacity(config.concurrency);
    for index in 0..config.concurrency {
        consumers.push(tokio::spawn(run_consumer(
            format!("{}-{index}", config.worker_id),
            gate.clone(),
            queue.clone(),
            config.clone(),
            shutdown_rx.clone(),
        )));
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|error| AppError::Internal(format!("failed to listen for ctrl-c: {error}")))?;
    info!(worker_id = %config.worker_id, "shutdown requested, waiting for in-flight work");
    shutdown_tx.send_replace(true);

    for consumer in consumers {
        if let Err(error) = consumer.await {
            warn!(worker_id = %config.worker_id, error = %error, "consumer task failed");
        }
    }

    info!(worker_id = %config.worker_id, "leasegate-worker stopped");
    Ok(())
}

async fn run_consumer(
    consumer_id: String,
    gate: CoalescingGate,
    queue: Arc<dyn TriggerQueue>,
    config: Arc<WorkerConfig>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = tokio::select! {
            _ = shutdown.changed() => break,
            next = queue.dequeue(config.poll_interval()) => next,
        };

        match next {
            Ok(Some(message)) => {
                handle_message(consumer_id.as_str(), &gate, &queue, &config, message).await;
            }
            Ok(None) => {}
            Err(error) => {
                warn!(
                    consumer_id = %consumer_id,
                    error = %error,
                    "failed to receive trigger"
                );
                tokio::time::sleep(config.poll_interval()).await;
            }
        }
    }
}

async fn handle_message(
    consumer_id: &str,
    gate: &CoalescingGate,
    queue: &Arc<dyn TriggerQueue>,
    config: &WorkerConfig,
    message: TriggerMessage,
) {
    let work_duration = config.work_duration();
    let work_duration_ms = config.work_duration_ms;
    let retrigger_queue = queue.clone();
    let retrigger_message = message.clone();
    let logic_consumer = consumer_id.to_owned();
    let logic_id = message.id.clone();

    let result = gate
        .run_under_lock(
            &config.scope,
            message.id.as_str(),
            || async move {
                info!(
                    consumer_id = %logic_consumer,
                    id = %logic_id,
                    work_duration_ms,
                    "simulating heavy work"
                );
                tokio::time::sleep(work_duration).await;
                Ok(())
            },
            || async move { re_enqueue(retrigger_queue.as_ref(), &retrigger_message).await },
        )
        .await;

    match result {
        Ok(GateOutcome::Ran {
            rerun_requested, ..
        }) => info!(
            consumer_id = %consumer_id,
            id = %message.id,
            rerun_requested,
            "trigger processed"
        ),
        Ok(GateOutcome::Deferred) => info!(
            consumer_id = %consumer_id,
            id = %message.id,
            "trigger deferred to running worker"
        ),
        Ok(GateOutcome::Retriggered) => info!(
            consumer_id = %consumer_id,
            id = %message.id,
            "stale lock reset, trigger re-enqueued"
        ),
        Err(error) => warn!(
            consumer_id = %consumer_id,
            id = %message.id,
            error = %error,
            "trigger processing failed"
        ),
    }
}

async fn re_enqueue(queue: &dyn TriggerQueue, message: &TriggerMessage) -> AppResult<()> {
    queue.enqueue(message).await.map_err(|error| match error {
        AppError::EnqueueFailed(_) => error,
        other => AppError::EnqueueFailed(format!(
            "failed to re-enqueue trigger '{}': {other}",
            message.id
        )),
    })
}

async fn build_store(config: &WorkerConfig) -> AppResult<Arc<dyn LeaseStore>> {
    match config.store_mode {
        StoreMode::Memory => Ok(Arc::new(InMemoryLeaseStore::new())),
        StoreMode::Redis => Ok(Arc::new(RedisLeaseStore::new(
            redis_client(config)?,
            config.key_prefix.clone(),
        ))),
        StoreMode::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| AppError::Validation("DATABASE_URL is required".to_owned()))?;
            let pool = connect_pool(database_url).await?;
            Ok(Arc::new(PostgresLeaseStore::new(pool)))
        }
    }
}

fn build_queue(config: &WorkerConfig) -> AppResult<Arc<dyn TriggerQueue>> {
    match config.queue_mode {
        QueueMode::Memory => Ok(Arc::new(InMemoryTriggerQueue::new())),
        QueueMode::Redis => Ok(Arc::new(RedisTriggerQueue::new(
            redis_client(config)?,
            config.key_prefix.clone(),
            config.queue_name.clone(),
        ))),
    }
}

fn redis_client(config: &WorkerConfig) -> AppResult<redis::Client> {
    let redis_url = config
        .redis_url
        .as_deref()
        .ok_or_else(|| AppError::Validation("REDIS_URL is required".to_owned()))?;

    redis::Client::open(redis_url)
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| {
            AppError::StoreUnavailable(format!("failed to connect to database: {error}"))
        })?;

    MIGRATOR
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
