//! RemovalWorker - 環境削除プロトコル本体
//!
//! # フロー（各ステップは前のステップの成功後にだけ始まる）
//! 1. NameResolver で ResourceIdentity を導出（失敗 = InvalidTask → dead-letter）
//! 2. ClusterProjectApi::exists（存在しなければ削除済み扱い → SucceededNoop）
//! 3. ClusterProjectApi::delete（404 の競合も削除済み扱い）
//! 4. EnvironmentRegistry::mark_deleted（失敗 = RegistryInconsistency）
//! 5. EventSink に success を送出
//!
//! 失敗時のリトライ判断はここではしない（worker_loop + Decider の役目）。

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::Instrument;

use crate::domain::{
    EventLevel, Outcome, RemovalError, RemovalEvent, RemovalTask, ResourceIdentity, TaskType,
    resolve_task,
};
use crate::ports::{
    ClusterError, ClusterProjectApi, Clock, EnvironmentRegistry, EventSink, SystemClock,
};

/// Bounded post-delete confirmation for eventually consistent clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteConfirmation {
    pub attempts: u32,
    pub interval: Duration,
}

/// Orchestrates one removal per call. Holds no per-task state.
pub struct RemovalWorker {
    cluster: Arc<dyn ClusterProjectApi>,
    registry: Arc<dyn EnvironmentRegistry>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    confirmation: DeleteConfirmation,
}

impl RemovalWorker {
    pub fn new(
        cluster: Arc<dyn ClusterProjectApi>,
        registry: Arc<dyn EnvironmentRegistry>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            cluster,
            registry,
            events,
            clock: Arc::new(SystemClock),
            confirmation: DeleteConfirmation::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_delete_confirmation(mut self, confirmation: DeleteConfirmation) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Handle one delivery of a removal task.
    ///
    /// Never returns `Failed(InvalidTask)`: invalid tasks are `DeadLettered` here.
    pub async fn handle(&self, task: &RemovalTask) -> Outcome {
        let identity = match resolve_task(task) {
            Ok(identity) => identity,
            Err(err) => {
                tracing::warn!(project = %task.project_name, error = %err, "invalid removal task");
                return Outcome::DeadLettered(err);
            }
        };

        let span = tracing::info_span!(
            "remove_environment",
            project = %task.project_name,
            cluster_project = %identity.cluster_project_name,
            environment = %identity.registry_environment_name,
        );

        async {
            match self.remove(task, &identity).await {
                Ok(outcome) => {
                    self.report_success(task, &identity, &outcome).await;
                    outcome
                }
                Err(err) => Outcome::Failed(err),
            }
        }
        .instrument(span)
        .await
    }

    async fn remove(
        &self,
        task: &RemovalTask,
        identity: &ResourceIdentity,
    ) -> Result<Outcome, RemovalError> {
        let name = identity.cluster_project_name.as_str();

        let exists = match self.cluster.exists(name).await {
            Ok(exists) => exists,
            Err(ClusterError::NotFound(_)) => false,
            Err(err) => return Err(self.cluster_failure(name, err)),
        };

        let outcome = if !exists {
            tracing::info!("cluster project already removed");
            Outcome::SucceededNoop
        } else {
            match self.cluster.delete(name).await {
                Ok(()) => {
                    self.confirm_removed(name).await?;
                    tracing::info!("cluster project deleted");
                    Outcome::Succeeded
                }
                Err(ClusterError::NotFound(_)) => {
                    tracing::info!("cluster project disappeared before delete");
                    Outcome::SucceededNoop
                }
                Err(err) => return Err(self.cluster_failure(name, err)),
            }
        };

        self.registry
            .mark_deleted(&identity.registry_environment_name, &task.project_name)
            .await
            .map_err(|err| {
                tracing::error!(
                    split_state = true,
                    error = %err,
                    "cluster project is gone but the registry update failed"
                );
                RemovalError::RegistryInconsistency {
                    environment: identity.registry_environment_name.clone(),
                    project: task.project_name.clone(),
                    message: err.to_string(),
                }
            })?;

        Ok(outcome)
    }

    /// Poll `exists` until the project is gone or the confirmation budget runs out.
    async fn confirm_removed(&self, name: &str) -> Result<(), RemovalError> {
        if self.confirmation.attempts == 0 {
            return Ok(());
        }
        for poll in 1..=self.confirmation.attempts {
            tokio::time::sleep(self.confirmation.interval).await;
            match self.cluster.exists(name).await {
                Ok(false) | Err(ClusterError::NotFound(_)) => return Ok(()),
                Ok(true) => tracing::debug!(poll, "cluster project still present after delete"),
                Err(err) => return Err(self.cluster_failure(name, err)),
            }
        }
        Err(RemovalError::TransientCluster {
            project: name.to_string(),
            message: format!(
                "still present after {} confirmation polls",
                self.confirmation.attempts
            ),
        })
    }

    fn cluster_failure(&self, name: &str, err: ClusterError) -> RemovalError {
        tracing::warn!(retriable = true, error = %err, "cluster call failed");
        RemovalError::TransientCluster {
            project: name.to_string(),
            message: err.to_string(),
        }
    }

    async fn report_success(
        &self,
        task: &RemovalTask,
        identity: &ResourceIdentity,
        outcome: &Outcome,
    ) {
        let message = match outcome {
            Outcome::SucceededNoop => format!(
                "{}: cluster project `{}` was already removed, environment `{}` marked deleted",
                task.project_name, identity.cluster_project_name, identity.registry_environment_name
            ),
            _ => format!(
                "{}: removed cluster project `{}`, environment `{}` marked deleted",
                task.project_name, identity.cluster_project_name, identity.registry_environment_name
            ),
        };
        let metadata = json!({
            "outcome": outcome.kind(),
            "kind": task.kind.to_string(),
            "cluster_project_name": identity.cluster_project_name,
            "environment_name": identity.registry_environment_name,
        });
        self.emit(EventLevel::Success, &task.project_name, metadata, message)
            .await;
    }

    /// Send one event. Sink failures are logged and never change the outcome.
    pub(crate) async fn emit(
        &self,
        level: EventLevel,
        project_name: &str,
        metadata: serde_json::Value,
        message: String,
    ) {
        let event = RemovalEvent::new(
            level,
            project_name,
            TaskType::remove(),
            metadata,
            message,
            self.clock.now(),
        );
        if let Err(err) = self.events.emit(event).await {
            tracing::warn!(error = %err, project = project_name, "failed to emit event");
        }
    }
}
