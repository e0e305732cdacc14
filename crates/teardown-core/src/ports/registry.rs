//! EnvironmentRegistry port - 環境を管理する system-of-record

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("registry transport error: {0}")]
    Transport(String),

    #[error("registry rejected the update: {0}")]
    Rejected(String),
}

/// Marks environments deleted in the system-of-record.
///
/// Marking an already-deleted environment deleted again must be harmless:
/// the worker relies on this when it retries after a split-state failure.
#[async_trait]
pub trait EnvironmentRegistry: Send + Sync {
    async fn mark_deleted(
        &self,
        environment_name: &str,
        project_name: &str,
    ) -> Result<(), RegistryError>;
}
