//! Coalescing execution gate over a lock and a flag object.
//!
//! Each unit of work `(scope, id)` owns two store objects: `{id}-lock` holds
//! the start timestamp of the running holder and `{id}-flag` records that a
//! re-run was requested while it ran.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use leasegate_core::{AppError, AppResult};
use leasegate_domain::{GateDecision, GateResources, LockState, Scope};
use tracing::{info, warn};

use crate::exclusive_lock::{ExclusiveLock, LockHandle};
use crate::gate_config::GateConfig;
use crate::lease_ports::LeaseStore;

/// Result of one pass through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    /// The protected logic ran in this invocation.
    Ran {
        /// Value returned by the protected logic.
        output: T,
        /// True when a deferred trigger arrived during the run and the
        /// re-trigger callback was invoked.
        rerun_requested: bool,
    },
    /// Another holder is running; a re-run was requested from it.
    Deferred,
    /// A stale lock was reset and the trigger was re-injected.
    Retriggered,
}

/// Runs protected logic at most once at a time per unit of work and
/// coalesces triggers that arrive meanwhile into one follow-up run.
#[derive(Clone)]
pub struct CoalescingGate {
    lock: ExclusiveLock,
    config: GateConfig,
}

impl CoalescingGate {
    /// Creates a gate over one lease store.
    pub fn new(store: Arc<dyn LeaseStore>, config: GateConfig) -> AppResult<Self> {
        config.validate()?;

        Ok(Self {
            lock: ExclusiveLock::new(store, config),
            config,
        })
    }

    /// Decides whether this trigger runs, defers, or re-triggers, and runs
    /// the protected logic when it owns the unit of work.
    ///
    /// The protected logic executes without any lease held. After it
    /// finishes (successfully or not) the gate resets the lock, consumes the
    /// flag, and invokes `retrigger` once if any trigger was deferred in the
    /// meantime. A failing protected logic error is returned after this
    /// bookkeeping. A panic inside the protected logic is caught, goes
    /// through the same bookkeeping, and surfaces as `AppError::Internal`.
    pub async fn run_under_lock<T, Logic, LogicFuture, Retrigger, RetriggerFuture>(
        &self,
        scope: &Scope,
        id: &str,
        protected_logic: Logic,
        retrigger: Retrigger,
    ) -> AppResult<GateOutcome<T>>
    where
        Logic: FnOnce() -> LogicFuture,
        LogicFuture: Future<Output = AppResult<T>>,
        Retrigger: FnOnce() -> RetriggerFuture,
        RetriggerFuture: Future<Output = AppResult<()>>,
    {
        let resources = GateResources::new(scope.clone(), id)?;

        match self.decide(&resources, Utc::now()).await? {
            GateDecision::Defer => Ok(GateOutcome::Deferred),
            GateDecision::RetryViaRetrigger => {
                info!(scope = %scope, id, "re-triggering after stale lock reset");
                retrigger().await?;
                Ok(GateOutcome::Retriggered)
            }
            GateDecision::Run => {
                info!(scope = %scope, id, "protected logic starting");
                let logic_result = AssertUnwindSafe(async move { protected_logic().await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(AppError::Internal(format!(
                            "protected logic for '{id}' panicked"
                        )))
                    });
                match &logic_result {
                    Ok(_) => info!(scope = %scope, id, "protected logic finished"),
                    Err(error) => warn!(
                        scope = %scope,
                        id,
                        error = %error,
                        "protected logic failed"
                    ),
                }

                let rerun_requested = match self.complete(&resources).await {
                    Ok(rerun_requested) => rerun_requested,
                    Err(completion_error) => {
                        return Err(combine_failures(
                            logic_result.err(),
                            completion_error,
                            "reset gate state",
                            id,
                        ));
                    }
                };

                if rerun_requested {
                    info!(scope = %scope, id, "deferred trigger pending, re-triggering");
                    if let Err(retrigger_error) = retrigger().await {
                        return Err(combine_failures(
                            logic_result.err(),
                            retrigger_error,
                            "re-trigger deferred run",
                            id,
                        ));
                    }
                }

                Ok(GateOutcome::Ran {
                    output: logic_result?,
                    rerun_requested,
                })
            }
        }
    }

    /// Inspects the lock under its lease and records the decision.
    ///
    /// `Run` stamps the lock with `now`, `Defer` sets the flag while the lock
    /// is still held, and `RetryViaRetrigger` deletes the stale lock.
    pub async fn decide(
        &self,
        resources: &GateResources,
        now: DateTime<Utc>,
    ) -> AppResult<GateDecision> {
        let mut lock = self.lock.acquire(resources.lock()).await?;
        let decided = self.decide_locked(&mut lock, resources, now).await;
        let released = lock.release().await;

        let decision = decided?;
        released?;
        Ok(decision)
    }

    /// Consumes the flag and resets the lock to empty.
    ///
    /// Returns whether any trigger was deferred since the flag was last
    /// cleared. The flag is read and cleared while the lock lease is held,
    /// so a concurrent deferral either lands before the read or observes the
    /// reset lock.
    pub async fn complete(&self, resources: &GateResources) -> AppResult<bool> {
        let mut lock = self.lock.acquire(resources.lock()).await?;
        let consumed = self.consume_flag(resources).await;

        lock.mark_delete_on_release();
        let released = lock.release().await;

        let rerun_requested = consumed?;
        released?;
        Ok(rerun_requested)
    }

    async fn decide_locked(
        &self,
        lock: &mut LockHandle,
        resources: &GateResources,
        now: DateTime<Utc>,
    ) -> AppResult<GateDecision> {
        let timestamp = lock.read_timestamp().await?;
        let state = LockState::classify(timestamp, now, self.config.staleness_threshold());
        let decision = state.decision();

        match state {
            LockState::Empty => {
                lock.write_timestamp(now).await?;
                info!(
                    object = %resources.lock(),
                    decision = decision.as_str(),
                    "lock is free, claiming it"
                );
            }
            LockState::Fresh { age } => {
                self.set_flag(resources, now).await?;
                info!(
                    object = %resources.lock(),
                    decision = decision.as_str(),
                    age_seconds = age.as_secs(),
                    "lock is held by a running worker, re-run requested"
                );
            }
            LockState::Stale { age } => {
                lock.mark_delete_on_release();
                warn!(
                    object = %resources.lock(),
                    decision = decision.as_str(),
                    age_seconds = age.as_secs(),
                    "lock holder presumed dead, resetting lock"
                );
            }
        }

        Ok(decision)
    }

    async fn set_flag(&self, resources: &GateResources, now: DateTime<Utc>) -> AppResult<()> {
        let mut flag = self.lock.acquire(resources.flag()).await?;
        let written = flag.write_timestamp(now).await;
        let released = flag.release().await;

        written?;
        released?;
        info!(object = %resources.flag(), "flag set");
        Ok(())
    }

    async fn consume_flag(&self, resources: &GateResources) -> AppResult<bool> {
        let mut flag = self.lock.acquire(resources.flag()).await?;
        let timestamp = match flag.read_timestamp().await {
            Ok(timestamp) => timestamp,
            Err(error) => {
                // An unread flag must survive; only release the lease.
                if let Err(release_error) = flag.release().await {
                    warn!(
                        object = %resources.flag(),
                        error = %release_error,
                        "failed to release flag after read error"
                    );
                }
                return Err(error);
            }
        };

        flag.mark_delete_on_release();
        flag.release().await?;

        let is_set = timestamp.is_some();
        info!(object = %resources.flag(), was_set = is_set, "flag cleared");
        Ok(is_set)
    }
}

fn combine_failures(
    logic_error: Option<AppError>,
    bookkeeping_error: AppError,
    step: &str,
    id: &str,
) -> AppError {
    match logic_error {
        None => bookkeeping_error,
        Some(logic_error) => AppError::Internal(format!(
            "protected logic for '{id}' failed: {logic_error}; additionally failed to {step}: {bookkeeping_error}"
        )),
    }
}
