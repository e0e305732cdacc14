//! In-memory task queue with delayed redelivery.
//!
//! Stands in for the message broker: one named queue, competing consumers,
//! backoff via a scheduled min-heap, and a dead-letter list for tasks that
//! need manual intervention.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::TaskEnvelope;
use crate::ports::{QueueError, TaskConsumer, TaskLease};

/// Delivery state of one queued task.
///
/// State transitions:
/// - Queued -> Running -> Succeeded
/// - Queued -> Running -> RetryScheduled -> Queued (until the decider gives up)
/// - Queued -> Running -> DeadLettered
///
/// Succeeded and DeadLettered records are dropped from the queue; only counts remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryState {
    Queued,
    Running,
    Succeeded,
    RetryScheduled,
    DeadLettered,
}

impl DeliveryState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryState::Succeeded | DeliveryState::DeadLettered)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub retry_scheduled: usize,
    pub dead_lettered: usize,
}

/// A task removed from the active queue.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub envelope: TaskEnvelope,
    pub attempts: u32,
    pub error: String,
}

type DeliveryKey = u64;

/// Metadata + envelope for a task in the queue.
#[derive(Debug, Clone)]
struct TaskRecord {
    envelope: TaskEnvelope,
    state: DeliveryState,

    /// Deliveries so far, including the current one while Running.
    attempts: u32,
}

impl TaskRecord {
    fn new(envelope: TaskEnvelope) -> Self {
        Self {
            envelope,
            state: DeliveryState::Queued,
            attempts: 0,
        }
    }

    fn transition(&mut self, state: DeliveryState) {
        debug_assert!(!self.state.is_terminal(), "terminal deliveries never move");
        self.state = state;
    }
}

/// Scheduled redelivery; reverse ordering turns BinaryHeap into a min-heap.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledTask {
    next_run_at: Instant,
    key: DeliveryKey,
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .next_run_at
            .cmp(&self.next_run_at)
            .then_with(|| other.key.cmp(&self.key))
    }
}

#[derive(Default)]
struct QueueState {
    records: HashMap<DeliveryKey, TaskRecord>,
    ready: VecDeque<DeliveryKey>,
    scheduled: BinaryHeap<ScheduledTask>,
    dead_letters: Vec<DeadLetter>,

    /// Settled deliveries leave `records`; only their totals are kept.
    succeeded: usize,
    dead_lettered: usize,

    next_key: DeliveryKey,
    closed: bool,
}

impl QueueState {
    /// Move tasks from scheduled to ready if their time has come.
    fn promote_scheduled_tasks(&mut self) {
        let now = Instant::now();
        while let Some(entry) = self.scheduled.peek() {
            if entry.next_run_at > now {
                break;
            }
            let key = entry.key;
            self.scheduled.pop();
            if let Some(record) = self.records.get_mut(&key)
                && record.state == DeliveryState::RetryScheduled
            {
                record.transition(DeliveryState::Queued);
                self.ready.push_back(key);
            }
        }
    }

    fn running(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.state == DeliveryState::Running)
            .count()
    }

    /// Closed and nothing can become ready any more.
    fn drained(&self) -> bool {
        self.closed && self.ready.is_empty() && self.scheduled.is_empty() && self.running() == 0
    }

    fn counts_by_state(&self) -> QueueCounts {
        let mut counts = QueueCounts {
            succeeded: self.succeeded,
            dead_lettered: self.dead_lettered,
            ..QueueCounts::default()
        };
        for record in self.records.values() {
            match record.state {
                DeliveryState::Queued => counts.queued += 1,
                DeliveryState::Running => counts.running += 1,
                DeliveryState::Succeeded => counts.succeeded += 1,
                DeliveryState::RetryScheduled => counts.retry_scheduled += 1,
                DeliveryState::DeadLettered => counts.dead_lettered += 1,
            }
        }
        counts
    }
}

/// In-memory implementation of [`TaskConsumer`].
pub struct InMemoryTaskQueue {
    name: String,
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

impl InMemoryTaskQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(QueueState::default())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Add a delivery. Duplicate envelopes are separate deliveries.
    pub async fn enqueue(&self, envelope: TaskEnvelope) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(QueueError::Closed);
            }
            let key = state.next_key;
            state.next_key += 1;
            state.records.insert(key, TaskRecord::new(envelope));
            state.ready.push_back(key);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Stop accepting tasks. Consumers get `None` once everything is settled.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }

    pub async fn is_idle(&self) -> bool {
        let state = self.state.lock().await;
        state.ready.is_empty() && state.scheduled.is_empty() && state.running() == 0
    }

    pub async fn counts_by_state(&self) -> QueueCounts {
        self.state.lock().await.counts_by_state()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.clone()
    }
}

#[async_trait]
impl TaskConsumer for InMemoryTaskQueue {
    fn queue_name(&self) -> &str {
        &self.name
    }

    async fn lease(&self) -> Option<Box<dyn TaskLease>> {
        loop {
            // register interest before inspecting state so no wakeup is lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_wake = {
                let mut state = self.state.lock().await;
                state.promote_scheduled_tasks();

                while let Some(key) = state.ready.pop_front() {
                    if let Some(record) = state.records.get_mut(&key) {
                        record.attempts += 1;
                        record.transition(DeliveryState::Running);
                        return Some(Box::new(InMemoryLease {
                            key,
                            envelope: record.envelope.clone(),
                            attempt: record.attempts,
                            queue: Arc::clone(&self.state),
                            notify: Arc::clone(&self.notify),
                        }));
                    }
                }

                if state.drained() {
                    return None;
                }
                state.scheduled.peek().map(|entry| entry.next_run_at)
            };

            match next_wake {
                Some(wake_time) => {
                    tokio::select! {
                        _ = &mut notified => {},
                        _ = tokio::time::sleep_until(wake_time) => {},
                    }
                }
                None => notified.await,
            }
        }
    }
}

/// Lease implementation for InMemoryTaskQueue.
struct InMemoryLease {
    key: DeliveryKey,
    envelope: TaskEnvelope,
    attempt: u32,
    queue: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

#[async_trait]
impl TaskLease for InMemoryLease {
    fn envelope(&self) -> &TaskEnvelope {
        &self.envelope
    }

    fn attempt(&self) -> u32 {
        self.attempt
    }

    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        {
            let mut state = self.queue.lock().await;
            let mut record = state
                .records
                .remove(&self.key)
                .ok_or_else(|| QueueError::OperationFailed("unknown delivery".into()))?;
            record.transition(DeliveryState::Succeeded);
            state.succeeded += 1;
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn retry(self: Box<Self>, delay: Duration, error: String) -> Result<(), QueueError> {
        {
            let mut state = self.queue.lock().await;
            let record = state
                .records
                .get_mut(&self.key)
                .ok_or_else(|| QueueError::OperationFailed("unknown delivery".into()))?;
            tracing::debug!(key = self.key, %error, ?delay, "redelivery scheduled");
            record.transition(DeliveryState::RetryScheduled);
            let next_run_at = Instant::now()
                .checked_add(delay)
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400 * 365));
            state.scheduled.push(ScheduledTask {
                next_run_at,
                key: self.key,
            });
        }
        // Notify outside the lock
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dead_letter(self: Box<Self>, error: String) -> Result<(), QueueError> {
        {
            let mut state = self.queue.lock().await;
            let mut record = state
                .records
                .remove(&self.key)
                .ok_or_else(|| QueueError::OperationFailed("unknown delivery".into()))?;
            record.transition(DeliveryState::DeadLettered);
            state.dead_lettered += 1;
            state.dead_letters.push(DeadLetter {
                envelope: record.envelope,
                attempts: record.attempts,
                error,
            });
        }
        self.notify.notify_waiters();
        Ok(())
    }
}
