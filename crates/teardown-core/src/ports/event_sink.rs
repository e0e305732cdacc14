//! EventSink port - オペレーター向けイベントの送出
//!
//! # 実装
//! - **TracingEventSink**: tracing の構造化ログとして出力（impls::log_sink）

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::RemovalEvent;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event sink error: {0}")]
pub struct EventSinkError(pub String);

/// EventSink は success / warning / error イベントを記録
///
/// 送出失敗はタスクの結果を変えない（呼び出し側でログに落とす）。
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: RemovalEvent) -> Result<(), EventSinkError>;
}
