use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use leasegate_application::TriggerQueue;
use leasegate_core::AppResult;
use leasegate_domain::TriggerMessage;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// Process-local FIFO trigger queue.
#[derive(Default)]
pub struct InMemoryTriggerQueue {
    messages: Mutex<VecDeque<TriggerMessage>>,
    available: Notify,
}

impl InMemoryTriggerQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of queued messages.
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    /// Returns whether the queue holds no messages.
    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }
}

#[async_trait]
impl TriggerQueue for InMemoryTriggerQueue {
    async fn enqueue(&self, message: &TriggerMessage) -> AppResult<()> {
        self.messages.lock().await.push_back(message.clone());
        self.available.notify_one();
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> AppResult<Option<TriggerMessage>> {
        let deadline = Instant::now() + wait;

        loop {
            if let Some(message) = self.messages.lock().await.pop_front() {
                return Ok(Some(message));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            if tokio::time::timeout(remaining, self.available.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }
}
