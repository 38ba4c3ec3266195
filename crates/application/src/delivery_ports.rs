use std::time::Duration;

use async_trait::async_trait;
use leasegate_core::AppResult;
use leasegate_domain::TriggerMessage;

/// Message delivery port used by workers to receive and re-inject triggers.
#[async_trait]
pub trait TriggerQueue: Send + Sync {
    /// Durably enqueues one trigger. Failures map to `AppError::EnqueueFailed`.
    async fn enqueue(&self, message: &TriggerMessage) -> AppResult<()>;

    /// Waits up to `wait` for the next trigger.
    async fn dequeue(&self, wait: Duration) -> AppResult<Option<TriggerMessage>>;
}
