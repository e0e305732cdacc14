//! TaskConsumer port - キューからのタスク受信
//!
//! 配送・ack の仕組み（AMQP など）は実装側に閉じ込める。worker は
//! lease を受け取り、ack / retry / dead_letter のどれか一つで必ず終わらせる。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::TaskEnvelope;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue closed")]
    Closed,

    #[error("queue operation failed: {0}")]
    OperationFailed(String),
}

/// A leased delivery.
///
/// Design intent:
/// - The consumer owns delivery state (queued -> running -> ...).
/// - The worker executes side effects, the decider picks retry or dead-letter,
///   and the lease reports the choice back.
/// - `TaskEnvelope` is exposed as an immutable reference to avoid accidental mutation.
#[async_trait]
pub trait TaskLease: Send {
    fn envelope(&self) -> &TaskEnvelope;

    /// Deliveries of this task so far, including the current one (1-indexed).
    fn attempt(&self) -> u32;

    /// Handler succeeded.
    async fn ack(self: Box<Self>) -> Result<(), QueueError>;

    /// Redeliver after `delay`.
    async fn retry(self: Box<Self>, delay: Duration, error: String) -> Result<(), QueueError>;

    /// Remove from the active queue without further automatic action.
    async fn dead_letter(self: Box<Self>, error: String) -> Result<(), QueueError>;
}

/// Consumer of one named queue (competing consumers are allowed).
#[async_trait]
pub trait TaskConsumer: Send + Sync {
    fn queue_name(&self) -> &str;

    /// Lease one ready task. Waits until one is available; `None` once the
    /// consumer is closed and drained.
    async fn lease(&self) -> Option<Box<dyn TaskLease>>;
}
