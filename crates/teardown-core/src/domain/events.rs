//! Events - オペレーター向けイベント
//!
//! EventSink に渡す唯一の形。成功（no-op 含む）・リトライ・dead-letter の
//! すべてがここを通るので、監査証跡はイベントストリームだけで完結する。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Success,
    Warning,
    Error,
}

/// One operator-visible event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalEvent {
    pub level: EventLevel,
    pub project_name: String,
    pub task_type: TaskType,
    pub metadata: serde_json::Value,
    pub message: String,
    pub emitted_at: DateTime<Utc>,
}

impl RemovalEvent {
    pub fn new(
        level: EventLevel,
        project_name: impl Into<String>,
        task_type: TaskType,
        metadata: serde_json::Value,
        message: impl Into<String>,
        emitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            level,
            project_name: project_name.into(),
            task_type,
            metadata,
            message: message.into(),
            emitted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_serializes_level_in_lowercase() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let event = RemovalEvent::new(
            EventLevel::Warning,
            "acme",
            TaskType::remove(),
            serde_json::json!({"attempt": 2}),
            "retrying",
            at,
        );
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["level"], "warning");
        assert_eq!(v["task_type"], "remove-openshift");
        assert_eq!(v["metadata"]["attempt"], 2);
    }
}
