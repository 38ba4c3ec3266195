use std::env;
use std::str::FromStr;
use std::time::Duration;

use leasegate_application::GateConfig;
use leasegate_core::{AppError, AppResult};
use leasegate_domain::Scope;

/// Lease store backend selected by `LEASEGATE_STORE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Memory,
    Redis,
    Postgres,
}

impl StoreMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
            Self::Postgres => "postgres",
        }
    }
}

impl FromStr for StoreMode {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            "postgres" => Ok(Self::Postgres),
            other => Err(AppError::Validation(format!(
                "unknown LEASEGATE_STORE value '{other}', expected memory, redis, or postgres"
            ))),
        }
    }
}

/// Trigger queue backend selected by `LEASEGATE_QUEUE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    Memory,
    Redis,
}

impl QueueMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        }
    }
}

impl FromStr for QueueMode {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(AppError::Validation(format!(
                "unknown LEASEGATE_QUEUE value '{other}', expected memory or redis"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub store_mode: StoreMode,
    pub queue_mode: QueueMode,
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
    pub key_prefix: String,
    pub queue_name: String,
    pub scope: Scope,
    pub worker_id: String,
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub work_duration_ms: u64,
    pub seed_ids: Vec<String>,
    pub gate: GateConfig,
}

impl WorkerConfig {
    pub fn load() -> AppResult<Self> {
        let store_mode = optional_env("LEASEGATE_STORE")
            .map(|value| value.parse::<StoreMode>())
            .transpose()?
            .unwrap_or(StoreMode::Memory);
        let queue_mode = optional_env("LEASEGATE_QUEUE")
            .map(|value| value.parse::<QueueMode>())
            .transpose()?
            .unwrap_or(QueueMode::Memory);

        let needs_redis = store_mode == StoreMode::Redis || queue_mode == QueueMode::Redis;
        let redis_url = if needs_redis {
            Some(required_env("REDIS_URL")?)
        } else {
            None
        };
        let database_url = if store_mode == StoreMode::Postgres {
            Some(required_env("DATABASE_URL")?)
        } else {
            None
        };

        let key_prefix =
            optional_env("LEASEGATE_KEY_PREFIX").unwrap_or_else(|| "leasegate".to_owned());
        let queue_name =
            optional_env("LEASEGATE_QUEUE_NAME").unwrap_or_else(|| "demoqueue".to_owned());
        let scope =
            Scope::new(optional_env("LEASEGATE_SCOPE").unwrap_or_else(|| "demoscope".to_owned()))?;
        let worker_id =
            optional_env("WORKER_ID").unwrap_or_else(|| format!("worker-{}", std::process::id()));

        let concurrency = parse_env_usize("WORKER_CONCURRENCY", 4)?;
        let poll_interval_ms = parse_env_u64("WORKER_POLL_INTERVAL_MS", 1000)?;
        let work_duration_ms = parse_env_u64("WORKER_WORK_DURATION_MS", 60_000)?;
        let seed_ids = parse_seed_ids(optional_env("WORKER_SEED_IDS").as_deref().unwrap_or(""));

        if concurrency == 0 {
            return Err(AppError::Validation(
                "WORKER_CONCURRENCY must be greater than zero".to_owned(),
            ));
        }
        require_positive("WORKER_POLL_INTERVAL_MS", poll_interval_ms)?;

        let gate = load_gate_config()?;

        Ok(Self {
            store_mode,
            queue_mode,
            redis_url,
            database_url,
            key_prefix,
            queue_name,
            scope,
            worker_id,
            concurrency,
            poll_interval_ms,
            work_duration_ms,
            seed_ids,
            gate,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn work_duration(&self) -> Duration {
        Duration::from_millis(self.work_duration_ms)
    }
}

fn load_gate_config() -> AppResult<GateConfig> {
    let lease_seconds = parse_env_u64("GATE_LEASE_SECONDS", 15)?;
    let staleness_seconds = parse_env_u64("GATE_STALENESS_SECONDS", 900)?;
    let jitter_min_ms = parse_env_u64("GATE_JITTER_MIN_MS", 250)?;
    let jitter_max_ms = parse_env_u64("GATE_JITTER_MAX_MS", 1000)?;

    require_positive("GATE_LEASE_SECONDS", lease_seconds)?;
    require_positive("GATE_STALENESS_SECONDS", staleness_seconds)?;
    require_positive("GATE_JITTER_MAX_MS", jitter_max_ms)?;

    let mut gate = GateConfig::new(
        Duration::from_secs(lease_seconds),
        Duration::from_secs(staleness_seconds),
    )?
    .with_retry_jitter(
        Duration::from_millis(jitter_min_ms),
        Duration::from_millis(jitter_max_ms),
    )?;

    if let Some(value) = optional_env("GATE_ACQUIRE_TIMEOUT_MS") {
        let timeout_ms = parse_u64("GATE_ACQUIRE_TIMEOUT_MS", value.as_str())?;
        require_positive("GATE_ACQUIRE_TIMEOUT_MS", timeout_ms)?;
        gate = gate.with_acquire_timeout(Duration::from_millis(timeout_ms))?;
    }

    Ok(gate)
}

/// Splits a comma separated id list, dropping blank entries.
pub fn parse_seed_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect()
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required_env(name: &str) -> AppResult<String> {
    optional_env(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn require_positive(name: &str, value: u64) -> AppResult<()> {
    if value == 0 {
        return Err(AppError::Validation(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(())
}

fn parse_u64(name: &str, value: &str) -> AppResult<u64> {
    value
        .parse::<u64>()
        .map_err(|error| AppError::Validation(format!("invalid {name} value '{value}': {error}")))
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match optional_env(name) {
        Some(value) => parse_u64(name, value.as_str()),
        None => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match optional_env(name) {
        Some(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use leasegate_core::AppError;

    use super::{QueueMode, StoreMode, parse_seed_ids, parse_u64, require_positive};

    #[test]
    fn store_modes_parse_case_insensitively() {
        assert!(matches!("memory".parse::<StoreMode>(), Ok(StoreMode::Memory)));
        assert!(matches!(" Redis ".parse::<StoreMode>(), Ok(StoreMode::Redis)));
        assert!(matches!("POSTGRES".parse::<StoreMode>(), Ok(StoreMode::Postgres)));
        assert!(matches!(
            "sqlite".parse::<StoreMode>(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn queue_mode_rejects_postgres() {
        assert!(matches!("redis".parse::<QueueMode>(), Ok(QueueMode::Redis)));
        assert!(matches!(
            "postgres".parse::<QueueMode>(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn seed_ids_skip_blank_entries() {
        assert_eq!(
            parse_seed_ids(" order-1, ,order-2,,"),
            vec!["order-1".to_owned(), "order-2".to_owned()]
        );
        assert!(parse_seed_ids("").is_empty());
    }

    #[test]
    fn numeric_settings_are_validated() {
        assert!(matches!(parse_u64("X", "15"), Ok(15)));
        assert!(matches!(parse_u64("X", "-1"), Err(AppError::Validation(_))));
        assert!(matches!(
            require_positive("X", 0),
            Err(AppError::Validation(_))
        ));
    }
}
