use serde::{Deserialize, Serialize};
use std::fmt;

use super::TaskId;
use super::errors::RemovalError;

/// Queue / task type name consumed by this worker.
pub const REMOVE_TASK_TYPE: &str = "remove-openshift";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn remove() -> Self {
        Self::new(REMOVE_TASK_TYPE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// TaskType + Payload (+ TaskId) の“運搬用”データ。
///
/// payload は decode 前の JSON のまま保持する（壊れたメッセージも dead-letter まで運べるように）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    task_id: TaskId,
    task_type: TaskType,
    payload: serde_json::Value,
}

impl TaskEnvelope {
    pub fn new(task_id: TaskId, task_type: TaskType, payload: serde_json::Value) -> Self {
        Self {
            task_id,
            task_type,
            payload,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Decode the payload into a [`RemovalTask`].
    ///
    /// A payload that does not have the task shape is an `InvalidTask` error:
    /// redelivering it would fail the same way.
    pub fn decode(&self) -> Result<RemovalTask, RemovalError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| RemovalError::invalid_task(format!("json decode: {e}")))
    }

    /// Best-effort project name for events about payloads that failed to decode.
    pub fn project_hint(&self) -> Option<&str> {
        self.payload
            .get("projectName")
            .and_then(serde_json::Value::as_str)
    }
}

/// Which kind of environment a removal targets.
///
/// Unknown or missing `type` values decode to `Unrecognized` so that the
/// resolver, not the decoder, reports the malformed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EnvironmentKind {
    #[serde(rename = "branch")]
    Branch,

    #[serde(rename = "pullrequest", alias = "pullRequest", alias = "pull_request")]
    PullRequest,

    #[default]
    #[serde(other, rename = "unrecognized")]
    Unrecognized,
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnvironmentKind::Branch => "branch",
            EnvironmentKind::PullRequest => "pullrequest",
            EnvironmentKind::Unrecognized => "unrecognized",
        };
        f.write_str(s)
    }
}

/// "remove environment" message payload.
///
/// Exactly one of `branch` / `pull_request_number` is meaningful, selected by `kind`.
/// The task is never mutated after decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalTask {
    pub project_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(
        default,
        rename = "pullrequestNumber",
        alias = "pullRequestNumber",
        skip_serializing_if = "Option::is_none"
    )]
    pub pull_request_number: Option<u64>,

    #[serde(default, rename = "type", alias = "kind")]
    pub kind: EnvironmentKind,
}

impl RemovalTask {
    pub fn branch(project_name: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            branch: Some(branch.into()),
            pull_request_number: None,
            kind: EnvironmentKind::Branch,
        }
    }

    pub fn pull_request(project_name: impl Into<String>, number: u64) -> Self {
        Self {
            project_name: project_name.into(),
            branch: None,
            pull_request_number: Some(number),
            kind: EnvironmentKind::PullRequest,
        }
    }

    /// Wrap this task into an envelope for the removal queue.
    pub fn into_envelope(self, task_id: TaskId) -> TaskEnvelope {
        TaskEnvelope::new(task_id, TaskType::remove(), self.to_payload())
    }

    /// Wire form of the task. Built field by field, so it cannot fail.
    pub fn to_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::Map::new();
        payload.insert("projectName".into(), self.project_name.clone().into());
        if let Some(branch) = &self.branch {
            payload.insert("branch".into(), branch.clone().into());
        }
        if let Some(number) = self.pull_request_number {
            payload.insert("pullrequestNumber".into(), number.into());
        }
        payload.insert("type".into(), self.kind.to_string().into());
        serde_json::Value::Object(payload)
    }
}
