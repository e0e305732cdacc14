//! Test doubles for the external collaborators.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::RemovalEvent;
use crate::ports::{
    ClusterError, ClusterProjectApi, EnvironmentRegistry, EventSink, EventSinkError,
    RegistryError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    Exists(String),
    Delete(String),
}

#[derive(Default)]
struct ClusterState {
    projects: HashSet<String>,
    calls: Vec<ClusterCall>,
    fail_exists: u32,
    fail_delete_after_removing: u32,
    vanish_before_delete: bool,
    linger_after_delete: u32,
    lingering: Option<(String, u32)>,
}

/// In-memory cluster with scripted failures.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn with_projects<const N: usize>(names: [&str; N]) -> Self {
        let cluster = Self::default();
        cluster
            .state
            .lock()
            .unwrap()
            .projects
            .extend(names.iter().map(|n| n.to_string()));
        cluster
    }

    /// Next `n` exists calls fail with a transport error.
    pub fn fail_exists(&self, n: u32) {
        self.state.lock().unwrap().fail_exists = n;
    }

    /// Next `n` deletes remove the project and still report a transport error.
    pub fn fail_delete_after_removing(&self, n: u32) {
        self.state.lock().unwrap().fail_delete_after_removing = n;
    }

    /// Someone else removes the project between exists and delete.
    pub fn vanish_before_delete(&self) {
        self.state.lock().unwrap().vanish_before_delete = true;
    }

    /// A deleted project keeps showing up for `n` exists calls.
    pub fn linger_after_delete(&self, n: u32) {
        self.state.lock().unwrap().linger_after_delete = n;
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.lock().unwrap().projects.contains(name)
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl ClusterProjectApi for FakeCluster {
    async fn exists(&self, name: &str) -> Result<bool, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ClusterCall::Exists(name.to_string()));
        if state.fail_exists > 0 {
            state.fail_exists -= 1;
            return Err(ClusterError::Transport("connection reset".into()));
        }
        if let Some((lingering, remaining)) = state.lingering.as_mut()
            && lingering.as_str() == name
            && *remaining > 0
        {
            *remaining -= 1;
            return Ok(true);
        }
        Ok(state.projects.contains(name))
    }

    async fn delete(&self, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ClusterCall::Delete(name.to_string()));
        if state.vanish_before_delete {
            state.projects.remove(name);
            return Err(ClusterError::NotFound(name.to_string()));
        }
        if state.fail_delete_after_removing > 0 {
            state.fail_delete_after_removing -= 1;
            state.projects.remove(name);
            return Err(ClusterError::Transport("gateway timeout".into()));
        }
        if state.projects.remove(name) {
            let linger = state.linger_after_delete;
            state.lingering = Some((name.to_string(), linger));
            Ok(())
        } else {
            Err(ClusterError::NotFound(name.to_string()))
        }
    }
}

/// Registry that records `mark_deleted` calls.
#[derive(Default)]
pub struct FakeRegistry {
    calls: Mutex<Vec<(String, String)>>,
    fail_next: Mutex<Vec<RegistryError>>,
}

impl FakeRegistry {
    pub fn fail_next(&self, err: RegistryError) {
        self.fail_next.lock().unwrap().push(err);
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EnvironmentRegistry for FakeRegistry {
    async fn mark_deleted(
        &self,
        environment_name: &str,
        project_name: &str,
    ) -> Result<(), RegistryError> {
        self.calls
            .lock()
            .unwrap()
            .push((environment_name.to_string(), project_name.to_string()));
        match self.fail_next.lock().unwrap().pop() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Sink that keeps every event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RemovalEvent>>,
    failing: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn events(&self) -> Vec<RemovalEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: RemovalEvent) -> Result<(), EventSinkError> {
        if self.failing {
            return Err(EventSinkError("sink unavailable".into()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
