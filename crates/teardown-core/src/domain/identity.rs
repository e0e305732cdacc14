//! Name resolution: RemovalTask -> ResourceIdentity.
//!
//! Pure and deterministic. The same task always resolves to the same
//! identity, which is what makes redelivered tasks safe to re-run.

use serde::{Deserialize, Serialize};

use super::errors::RemovalError;
use super::task::{EnvironmentKind, RemovalTask};

/// Names derived from a task: one for the cluster, one for the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    /// Cluster-legal name (`[0-9a-z-]` only).
    pub cluster_project_name: String,

    /// Human readable environment name as stored by the registry.
    pub registry_environment_name: String,
}

/// Lowercase, then replace every character outside `[0-9a-z-]` with `-`.
///
/// Works per `char`, so multi-byte characters become a single `-`.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            '0'..='9' | 'a'..='z' | '-' => c,
            _ => '-',
        })
        .collect()
}

/// Resolve the identity of the environment a task removes.
///
/// `project_slug` is expected to be `sanitize(task.project_name)`; see
/// [`resolve_task`] for the common case.
pub fn resolve(task: &RemovalTask, project_slug: &str) -> Result<ResourceIdentity, RemovalError> {
    match task.kind {
        EnvironmentKind::PullRequest => {
            let number = task.pull_request_number.ok_or_else(|| {
                RemovalError::invalid_task(format!(
                    "pull request removal for {} has no pull request number",
                    task.project_name
                ))
            })?;
            Ok(ResourceIdentity {
                cluster_project_name: format!("{project_slug}-pr-{number}"),
                registry_environment_name: format!("pr-{number}"),
            })
        }
        EnvironmentKind::Branch => {
            let branch = task
                .branch
                .as_deref()
                .filter(|b| !b.is_empty())
                .ok_or_else(|| {
                    RemovalError::invalid_task(format!(
                        "branch removal for {} has no branch name",
                        task.project_name
                    ))
                })?;
            Ok(ResourceIdentity {
                cluster_project_name: format!("{project_slug}-{}", sanitize(branch)),
                registry_environment_name: branch.to_string(),
            })
        }
        EnvironmentKind::Unrecognized => Err(RemovalError::invalid_task(format!(
            "unrecognized environment type for {}",
            task.project_name
        ))),
    }
}

/// `resolve(task, &sanitize(&task.project_name))`.
pub fn resolve_task(task: &RemovalTask) -> Result<ResourceIdentity, RemovalError> {
    resolve(task, &sanitize(&task.project_name))
}
