//! ClusterProjectApi port - クラスタ上の project（namespace 相当）の存在確認と削除
//!
//! # 実装
//! - **HttpClusterApi**: project API を REST で叩く（impls::http_cluster）

use async_trait::async_trait;
use thiserror::Error;

/// Cluster call failure.
///
/// `NotFound` は 404 相当。worker はこれを「削除済み」として扱うので、
/// 他のエラーと必ず区別できること。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("project {0} not found")]
    NotFound(String),

    #[error("cluster transport error: {0}")]
    Transport(String),

    #[error("unexpected cluster response: status={status} body={body}")]
    Unexpected { status: u16, body: String },
}

/// Existence check and deletion of a named cluster project.
///
/// A project either exists or it does not; no intermediate states.
#[async_trait]
pub trait ClusterProjectApi: Send + Sync {
    /// `Ok(false)` when the project does not exist.
    async fn exists(&self, name: &str) -> Result<bool, ClusterError>;

    /// `Err(ClusterError::NotFound)` when the project is already gone.
    async fn delete(&self, name: &str) -> Result<(), ClusterError>;
}
