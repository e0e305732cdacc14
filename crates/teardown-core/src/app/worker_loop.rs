//! WorkerLoop - consumer 側の実行ループ
//!
//! # フロー
//! 1. TaskConsumer::lease() で配送を受け取る
//! 2. payload を RemovalTask に decode（失敗 = InvalidTask）
//! 3. RemovalWorker::handle() → Outcome
//! 4. 失敗なら Decider → Retry / DeadLetter
//! 5. lease を ack / retry / dead_letter で終わらせる
//!
//! 1 worker = 1 タスクずつ最後まで。複数 worker は同じキューを奪い合う
//! (competing consumers)。shutdown は新しい lease を止めるだけで、
//! 実行中の削除は中断しない。

use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::removal::RemovalWorker;
use crate::domain::{Decider, Decision, EventLevel, Outcome, RemovalError, resolve_task};
use crate::ports::{TaskConsumer, TaskLease};

/// Worker group handle.
/// - `request_shutdown()` で新しい lease の取得を止める
/// - `join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: Arc<watch::Sender<bool>>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers over the same consumer.
    pub fn spawn(
        n: usize,
        consumer: Arc<dyn TaskConsumer>,
        worker: Arc<RemovalWorker>,
        decider: Arc<dyn Decider>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let consumer = Arc::clone(&consumer);
            let worker = Arc::clone(&worker);
            let decider = Arc::clone(&decider);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, consumer, worker, decider, &mut rx).await;
            });
            joins.push(join);
        }

        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            joins,
        }
    }

    /// Stop taking new leases. In-flight tasks run to completion.
    pub fn request_shutdown(&self) {
        self.shutdown_handle().request();
    }

    /// Detached trigger, usable while `join()` owns the group.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown_tx))
    }

    /// Wait for every worker to exit (consumer drained or shutdown requested).
    pub async fn join(self) {
        for j in self.joins {
            if let Err(err) = j.await {
                tracing::error!(error = %err, "worker task panicked");
            }
        }
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        self.join().await;
    }
}

#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn request(&self) {
        // receivers may already be dropped
        let _ = self.0.send(true);
    }
}

async fn worker_loop(
    worker_id: usize,
    consumer: Arc<dyn TaskConsumer>,
    worker: Arc<RemovalWorker>,
    decider: Arc<dyn Decider>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    tracing::info!(worker_id, queue = consumer.queue_name(), "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // lease は待つ可能性があるので shutdown と競合させる
        let lease = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            lease = consumer.lease() => lease,
        };

        let Some(lease) = lease else {
            // consumer closed and drained
            break;
        };

        // ここから先は shutdown を見ない（削除を途中で放棄しない）
        process_lease(lease, &worker, decider.as_ref()).await;
    }
    tracing::info!(worker_id, "worker stopped");
}

/// Run one delivery to completion and settle its lease.
///
/// Returns the final outcome: `Failed` means a redelivery was scheduled.
pub async fn process_lease(
    lease: Box<dyn TaskLease>,
    worker: &RemovalWorker,
    decider: &dyn Decider,
) -> Outcome {
    let envelope = lease.envelope().clone();
    let attempt = lease.attempt();

    let (outcome, task) = match envelope.decode() {
        Ok(task) => (worker.handle(&task).await, Some(task)),
        Err(err) => (Outcome::DeadLettered(err), None),
    };

    let project_name = task
        .as_ref()
        .map(|t| t.project_name.clone())
        .or_else(|| envelope.project_hint().map(str::to_string))
        .unwrap_or_default();
    let cluster_project_name = task
        .as_ref()
        .and_then(|t| resolve_task(t).ok())
        .map(|identity| identity.cluster_project_name);

    let settled = match outcome {
        Outcome::Succeeded | Outcome::SucceededNoop => {
            if let Err(err) = lease.ack().await {
                tracing::error!(task_id = %envelope.task_id(), error = %err, "ack failed");
            }
            outcome
        }
        Outcome::Failed(err) => match decider.decide(&err, attempt) {
            Decision::Retry { attempt, delay } => {
                let message = format!(
                    "{project_name}: removal attempt {attempt} failed, retrying in {}s: {err}",
                    delay.as_secs()
                );
                let metadata = json!({
                    "error": err.to_string(),
                    "error_kind": err.tag(),
                    "attempt": attempt,
                    "max_attempts": decider.max_attempts(),
                    "next_delay_seconds": delay.as_secs(),
                    "cluster_project_name": cluster_project_name,
                });
                worker
                    .emit(EventLevel::Warning, &project_name, metadata, message)
                    .await;
                if let Err(qerr) = lease.retry(delay, err.to_string()).await {
                    tracing::error!(
                        task_id = %envelope.task_id(),
                        error = %qerr,
                        "retry scheduling failed"
                    );
                }
                Outcome::Failed(err)
            }
            Decision::DeadLetter { attempts, reason } => {
                dead_letter(
                    lease,
                    worker,
                    &project_name,
                    cluster_project_name,
                    attempts,
                    &err,
                    reason,
                )
                .await;
                Outcome::DeadLettered(err)
            }
        },
        Outcome::DeadLettered(err) => {
            let reason = format!("non-retriable: {err}");
            dead_letter(
                lease,
                worker,
                &project_name,
                cluster_project_name,
                attempt,
                &err,
                reason,
            )
            .await;
            Outcome::DeadLettered(err)
        }
    };

    tracing::debug!(
        task_id = %envelope.task_id(),
        attempt,
        outcome = ?settled.kind(),
        "delivery settled"
    );
    settled
}

async fn dead_letter(
    lease: Box<dyn TaskLease>,
    worker: &RemovalWorker,
    project_name: &str,
    cluster_project_name: Option<String>,
    attempts: u32,
    err: &RemovalError,
    reason: String,
) {
    let task_id = lease.envelope().task_id();
    tracing::error!(
        %task_id,
        attempts,
        error_kind = err.tag(),
        error = %err,
        "removal dead-lettered, manual intervention required"
    );
    let message = format!(
        "{project_name}: removal of {} dead-lettered after {attempts} attempt(s): {err}",
        cluster_project_name.as_deref().unwrap_or("<unresolved>")
    );
    let metadata = json!({
        "error": err.to_string(),
        "error_kind": err.tag(),
        "attempts": attempts,
        "cluster_project_name": cluster_project_name,
    });
    worker
        .emit(EventLevel::Error, project_name, metadata, message)
        .await;
    if let Err(qerr) = lease.dead_letter(reason).await {
        tracing::error!(%task_id, error = %qerr, "dead-letter failed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::{
        DefaultDecider, EnvironmentKind, RemovalTask, RetryPolicy, TaskEnvelope, TaskId,
        TaskType,
    };
    use crate::impls::InMemoryTaskQueue;
    use crate::testing::{FakeCluster, FakeRegistry, RecordingSink};

    struct Harness {
        queue: Arc<InMemoryTaskQueue>,
        cluster: Arc<FakeCluster>,
        registry: Arc<FakeRegistry>,
        sink: Arc<RecordingSink>,
        worker: RemovalWorker,
        decider: DefaultDecider,
    }

    fn harness(cluster: FakeCluster, max_attempts: u32) -> Harness {
        let cluster = Arc::new(cluster);
        let registry = Arc::new(FakeRegistry::default());
        let sink = Arc::new(RecordingSink::default());
        let worker = RemovalWorker::new(cluster.clone(), registry.clone(), sink.clone());
        Harness {
            queue: Arc::new(InMemoryTaskQueue::new("remove-openshift")),
            cluster,
            registry,
            sink,
            worker,
            decider: DefaultDecider::new(RetryPolicy::new(
                max_attempts,
                Duration::from_secs(2),
                2.0,
            )),
        }
    }

    impl Harness {
        async fn step(&self) -> Outcome {
            let lease = self.queue.lease().await.unwrap();
            process_lease(lease, &self.worker, &self.decider).await
        }

        fn levels(&self) -> Vec<EventLevel> {
            self.sink.events().iter().map(|e| e.level).collect()
        }
    }

    #[tokio::test]
    async fn success_acks_with_single_success_event() {
        let h = harness(FakeCluster::with_projects(["acme-pr-42"]), 3);
        h.queue
            .enqueue(RemovalTask::pull_request("acme", 42).into_envelope(TaskId::generate()))
            .await
            .unwrap();

        assert_eq!(h.step().await, Outcome::Succeeded);
        assert_eq!(h.levels(), vec![EventLevel::Success]);

        let counts = h.queue.counts_by_state().await;
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.retry_scheduled, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_then_dead_letter() {
        let cluster = FakeCluster::with_projects(["acme-main"]);
        cluster.fail_exists(10);
        let h = harness(cluster, 3);
        h.queue
            .enqueue(RemovalTask::branch("acme", "main").into_envelope(TaskId::generate()))
            .await
            .unwrap();

        assert!(matches!(h.step().await, Outcome::Failed(_)));
        assert!(matches!(h.step().await, Outcome::Failed(_)));
        assert!(matches!(h.step().await, Outcome::DeadLettered(_)));

        assert_eq!(
            h.levels(),
            vec![EventLevel::Warning, EventLevel::Warning, EventLevel::Error]
        );
        let dead_event = h.sink.events().pop().unwrap();
        assert_eq!(dead_event.metadata["attempts"], 3);
        assert_eq!(dead_event.metadata["cluster_project_name"], "acme-main");
        assert_eq!(dead_event.metadata["error_kind"], "transient_cluster");

        let dead = h.queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 3);

        // nothing left to deliver
        let next = tokio::time::timeout(Duration::from_secs(60), h.queue.lease()).await;
        assert!(next.is_err());
        assert!(h.cluster.contains("acme-main"));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_warning_carries_attempt_and_delay() {
        let cluster = FakeCluster::with_projects(["acme-main"]);
        cluster.fail_exists(1);
        let h = harness(cluster, 5);
        h.queue
            .enqueue(RemovalTask::branch("acme", "main").into_envelope(TaskId::generate()))
            .await
            .unwrap();

        assert!(matches!(h.step().await, Outcome::Failed(_)));
        let warning = h.sink.events().pop().unwrap();
        assert_eq!(warning.level, EventLevel::Warning);
        assert_eq!(warning.metadata["attempt"], 1);
        assert_eq!(warning.metadata["max_attempts"], 5);
        assert_eq!(warning.metadata["next_delay_seconds"], 2);

        assert_eq!(h.step().await, Outcome::Succeeded);
        assert_eq!(h.registry.calls().len(), 1);
    }

    #[tokio::test]
    async fn invalid_task_dead_letters_on_first_attempt() {
        let h = harness(FakeCluster::default(), 5);
        let mut task = RemovalTask::branch("acme", "main");
        task.kind = EnvironmentKind::Unrecognized;
        h.queue
            .enqueue(task.into_envelope(TaskId::generate()))
            .await
            .unwrap();

        assert!(matches!(
            h.step().await,
            Outcome::DeadLettered(RemovalError::InvalidTask(_))
        ));
        assert_eq!(h.levels(), vec![EventLevel::Error]);
        assert_eq!(h.queue.dead_letters().await[0].attempts, 1);
        assert!(h.cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn undecodable_payload_dead_letters() {
        let h = harness(FakeCluster::default(), 5);
        h.queue
            .enqueue(TaskEnvelope::new(
                TaskId::generate(),
                TaskType::remove(),
                serde_json::json!({"projectName": 12}),
            ))
            .await
            .unwrap();

        assert!(matches!(h.step().await, Outcome::DeadLettered(_)));
        let event = h.sink.events().pop().unwrap();
        assert_eq!(event.level, EventLevel::Error);
        assert!(event.metadata["cluster_project_name"].is_null());
    }

    #[tokio::test(start_paused = true)]
    async fn registry_inconsistency_is_retried() {
        let h = harness(FakeCluster::with_projects(["acme-main"]), 5);
        h.registry.fail_next(crate::ports::RegistryError::Transport("refused".into()));
        h.queue
            .enqueue(RemovalTask::branch("acme", "main").into_envelope(TaskId::generate()))
            .await
            .unwrap();

        assert!(matches!(
            h.step().await,
            Outcome::Failed(RemovalError::RegistryInconsistency { .. })
        ));
        let warning = h.sink.events().pop().unwrap();
        assert_eq!(warning.metadata["error_kind"], "registry_inconsistency");

        assert_eq!(h.step().await, Outcome::SucceededNoop);
        assert_eq!(h.levels(), vec![EventLevel::Warning, EventLevel::Success]);
    }

    #[tokio::test]
    async fn group_drains_closed_queue() {
        let h = harness(FakeCluster::with_projects(["acme-pr-1", "acme-pr-2"]), 3);
        for n in 1..=3 {
            h.queue
                .enqueue(RemovalTask::pull_request("acme", n).into_envelope(TaskId::generate()))
                .await
                .unwrap();
        }
        h.queue.close().await;

        let Harness {
            queue,
            worker,
            decider,
            sink,
            ..
        } = h;
        let group = WorkerGroup::spawn(2, queue.clone(), Arc::new(worker), Arc::new(decider));
        group.join().await;

        assert_eq!(queue.counts_by_state().await.succeeded, 3);
        assert_eq!(sink.events().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn duplicate_delivery_deletes_once() {
        let h = harness(FakeCluster::with_projects(["acme-pr-9"]), 3);
        let task = RemovalTask::pull_request("acme", 9);
        for _ in 0..2 {
            h.queue
                .enqueue(task.clone().into_envelope(TaskId::generate()))
                .await
                .unwrap();
        }
        h.queue.close().await;

        let Harness {
            queue,
            cluster,
            registry,
            sink,
            worker,
            decider,
        } = h;
        let group = WorkerGroup::spawn(2, queue.clone(), Arc::new(worker), Arc::new(decider));
        group.join().await;

        let counts = queue.counts_by_state().await;
        assert_eq!(counts.succeeded, 2);
        assert_eq!(counts.dead_lettered, 0);
        assert_eq!(counts.retry_scheduled, 0);
        assert!(!cluster.contains("acme-pr-9"));
        assert_eq!(registry.calls().len(), 2);

        let events = sink.events();
        assert!(events.iter().all(|e| e.level == EventLevel::Success));
        let mut outcomes: Vec<String> = events
            .iter()
            .map(|e| e.metadata["outcome"].as_str().unwrap_or_default().to_string())
            .collect();
        outcomes.sort();
        assert_eq!(outcomes, vec!["SUCCEEDED", "SUCCEEDED_NOOP"]);
    }

    #[tokio::test]
    async fn shutdown_stops_idle_workers() {
        let h = harness(FakeCluster::default(), 3);
        let group =
            WorkerGroup::spawn(2, h.queue.clone(), Arc::new(h.worker), Arc::new(h.decider));

        tokio::time::timeout(Duration::from_secs(1), group.shutdown_and_join())
            .await
            .unwrap();
        assert!(h.queue.is_idle().await);
    }
}
