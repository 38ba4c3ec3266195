use leasegate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One trigger delivered by the message queue for a gated unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerMessage {
    /// Identifier of the unit of work within its scope.
    pub id: String,
    /// Opaque payload carried along for the protected logic.
    #[serde(default)]
    pub payload: Value,
}

impl TriggerMessage {
    /// Creates a trigger with an empty payload.
    pub fn new(id: impl Into<String>) -> AppResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AppError::Validation(
                "trigger message id must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            id,
            payload: Value::Null,
        })
    }

    /// Serializes the message for a queue body.
    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string(self).map_err(|error| {
            AppError::Internal(format!(
                "failed to serialize trigger message '{}': {error}",
                self.id
            ))
        })
    }

    /// Parses a queue body into a message.
    pub fn from_json(body: &str) -> AppResult<Self> {
        let message: Self = serde_json::from_str(body).map_err(|error| {
            AppError::Validation(format!("invalid trigger message body: {error}"))
        })?;

        if message.id.trim().is_empty() {
            return Err(AppError::Validation(
                "trigger message id must not be empty".to_owned(),
            ));
        }

        Ok(message)
    }
}
