//! Errors - エラー型と分類
//!
//! retry / dead-letter の判断は文字列ではなく `ErrorKind` で行う。

use thiserror::Error;

/// ErrorKind は実行エラーの運用分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味、即 dead-letter）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transient,
    Permanent,
}

/// Failure of one removal attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemovalError {
    /// Malformed or unrecognized task shape. Never retried.
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// Network, auth, rate-limit, timeout or unexpected non-404 cluster response.
    #[error("cluster error on project {project}: {message}")]
    TransientCluster { project: String, message: String },

    /// The cluster project is gone but the registry could not be updated.
    #[error("registry inconsistency for environment {environment} of {project}: {message}")]
    RegistryInconsistency {
        environment: String,
        project: String,
        message: String,
    },
}

impl RemovalError {
    pub fn invalid_task(message: impl Into<String>) -> Self {
        Self::InvalidTask(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RemovalError::InvalidTask(_) => ErrorKind::Permanent,
            RemovalError::TransientCluster { .. } | RemovalError::RegistryInconsistency { .. } => {
                ErrorKind::Transient
            }
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Stable tag used in event metadata and log fields.
    pub fn tag(&self) -> &'static str {
        match self {
            RemovalError::InvalidTask(_) => "invalid_task",
            RemovalError::TransientCluster { .. } => "transient_cluster",
            RemovalError::RegistryInconsistency { .. } => "registry_inconsistency",
        }
    }
}
