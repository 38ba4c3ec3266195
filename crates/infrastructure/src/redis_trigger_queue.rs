//! Redis list-backed trigger queue.

use std::time::Duration;

use async_trait::async_trait;
use leasegate_application::TriggerQueue;
use leasegate_core::{AppError, AppResult};
use leasegate_domain::TriggerMessage;
use redis::AsyncCommands;
use tokio::time::Instant;

const EMPTY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Redis implementation of the trigger queue port.
///
/// Producers `RPUSH` JSON bodies onto one list and consumers `LPOP` them,
/// polling while the list is empty.
#[derive(Clone)]
pub struct RedisTriggerQueue {
    client: redis::Client,
    key_prefix: String,
    queue_name: String,
}

impl RedisTriggerQueue {
    /// Creates one queue adapter.
    #[must_use]
    pub fn new(
        client: redis::Client,
        key_prefix: impl Into<String>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            queue_name: queue_name.into(),
        }
    }

    fn queue_key(&self) -> String {
        format!("{}:queue:{}", self.key_prefix, self.queue_name)
    }
}

#[async_trait]
impl TriggerQueue for RedisTriggerQueue {
    async fn enqueue(&self, message: &TriggerMessage) -> AppResult<()> {
        let body = message.to_json()?;

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| {
                AppError::EnqueueFailed(format!("failed to connect to redis: {error}"))
            })?;

        connection
            .rpush::<_, _, ()>(self.queue_key(), body)
            .await
            .map_err(|error| {
                AppError::EnqueueFailed(format!(
                    "failed to enqueue trigger '{}' on '{}': {error}",
                    message.id, self.queue_name
                ))
            })
    }

    async fn dequeue(&self, wait: Duration) -> AppResult<Option<TriggerMessage>> {
        let deadline = Instant::now() + wait;
        let key = self.queue_key();

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        loop {
            let body: Option<String> = connection.lpop(key.as_str(), None).await.map_err(|error| {
                AppError::Internal(format!(
                    "failed to dequeue trigger from '{}': {error}",
                    self.queue_name
                ))
            })?;

            if let Some(body) = body {
                return TriggerMessage::from_json(body.as_str()).map(Some);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            tokio::time::sleep(remaining.min(EMPTY_POLL_INTERVAL)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use leasegate_application::TriggerQueue;
    use leasegate_domain::TriggerMessage;

    use super::RedisTriggerQueue;

    fn test_queue() -> Option<RedisTriggerQueue> {
        let Ok(redis_url) = std::env::var("REDIS_URL") else {
            return None;
        };

        let client = match redis::Client::open(redis_url.as_str()) {
            Ok(client) => client,
            Err(error) => panic!("failed to open REDIS_URL in test: {error}"),
        };

        Some(RedisTriggerQueue::new(
            client,
            format!("leasegate-test:{}", uuid::Uuid::new_v4()),
            "demoqueue",
        ))
    }

    #[tokio::test]
    async fn enqueued_triggers_round_trip_in_order() {
        let Some(queue) = test_queue() else {
            return;
        };

        let mut first = TriggerMessage::new("order-1").unwrap_or_else(|_| unreachable!());
        first.payload = serde_json::json!({ "attempt": 1 });
        let second = TriggerMessage::new("order-2").unwrap_or_else(|_| unreachable!());

        assert!(queue.enqueue(&first).await.is_ok());
        assert!(queue.enqueue(&second).await.is_ok());

        let received = queue.dequeue(Duration::from_millis(200)).await;
        assert!(matches!(received, Ok(Some(ref message)) if *message == first));
        let received = queue.dequeue(Duration::from_millis(200)).await;
        assert!(matches!(received, Ok(Some(ref message)) if *message == second));
        assert!(matches!(
            queue.dequeue(Duration::from_millis(150)).await,
            Ok(None)
        ));
    }
}
