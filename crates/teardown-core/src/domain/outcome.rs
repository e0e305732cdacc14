//! Outcome model: result of one removal attempt.
//!
//! The outcome selects the EventSink call and the consumer acknowledgement.
//! It is ephemeral: nothing here is persisted.

use serde::{Deserialize, Serialize};

use super::errors::RemovalError;

/// Serialized as SCREAMING_SNAKE_CASE in event metadata:
/// SUCCEEDED / SUCCEEDED_NOOP / FAILED / DEAD_LETTERED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Succeeded,
    SucceededNoop,
    Failed,
    DeadLettered,
}

/// Result of handling one delivery of a removal task.
///
/// - `Succeeded`: the cluster project was deleted and the registry updated.
/// - `SucceededNoop`: the project was already gone; only the registry was updated.
/// - `Failed`: retry-eligible failure, the consumer policy decides what happens next.
/// - `DeadLettered`: terminal failure, no redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    SucceededNoop,
    Failed(RemovalError),
    DeadLettered(RemovalError),
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Succeeded => OutcomeKind::Succeeded,
            Outcome::SucceededNoop => OutcomeKind::SucceededNoop,
            Outcome::Failed(_) => OutcomeKind::Failed,
            Outcome::DeadLettered(_) => OutcomeKind::DeadLettered,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded | Outcome::SucceededNoop)
    }

    pub fn error(&self) -> Option<&RemovalError> {
        match self {
            Outcome::Failed(err) | Outcome::DeadLettered(err) => Some(err),
            Outcome::Succeeded | Outcome::SucceededNoop => None,
        }
    }
}
