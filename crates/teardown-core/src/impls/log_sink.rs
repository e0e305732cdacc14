//! TracingEventSink - イベントを構造化ログとして出力
//!
//! JSON formatter と組み合わせれば、そのままログ収集基盤に流せる。

use async_trait::async_trait;

use crate::domain::{EventLevel, RemovalEvent};
use crate::ports::{EventSink, EventSinkError};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: RemovalEvent) -> Result<(), EventSinkError> {
        let metadata = event.metadata.to_string();
        match event.level {
            EventLevel::Success => tracing::info!(
                target: "teardown::events",
                project = %event.project_name,
                task_type = %event.task_type,
                emitted_at = %event.emitted_at,
                %metadata,
                "{}",
                event.message
            ),
            EventLevel::Warning => tracing::warn!(
                target: "teardown::events",
                project = %event.project_name,
                task_type = %event.task_type,
                emitted_at = %event.emitted_at,
                %metadata,
                "{}",
                event.message
            ),
            EventLevel::Error => tracing::error!(
                target: "teardown::events",
                project = %event.project_name,
                task_type = %event.task_type,
                emitted_at = %event.emitted_at,
                %metadata,
                "{}",
                event.message
            ),
        }
        Ok(())
    }
}
