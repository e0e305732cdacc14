//! Cluster project API client for the HTTP(S) protocol.
//!
//! Projects live at `{console_url}/apis/project.openshift.io/v1/projects/{name}`.

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};

use crate::config::ClusterConfig;
use crate::ports::{ClusterError, ClusterProjectApi};

/// String to set as the user agent in HTTP requests.
static CLIENT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const PROJECTS_PATH: &str = "apis/project.openshift.io/v1/projects";

pub struct HttpClusterApi {
    /// Base URL, always ending in `/`.
    base: String,
    token: String,
    client: ReqwestClient,
}

impl HttpClusterApi {
    pub fn with(config: &ClusterConfig) -> Result<Self, ClusterError> {
        let client = ReqwestClient::builder()
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .user_agent(CLIENT_USER_AGENT)
            .build()
            .map_err(|e| ClusterError::Transport(e.to_string()))?;
        let mut base = config.console_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            base,
            token: config.token.clone(),
            client,
        })
    }

    fn project_url(&self, name: &str) -> String {
        format!("{}{PROJECTS_PATH}/{name}", self.base)
    }
}

/// Map a non-success response onto the cluster error taxonomy.
fn classify(name: &str, status: StatusCode, body: String) -> ClusterError {
    if status == StatusCode::NOT_FOUND {
        return ClusterError::NotFound(name.to_string());
    }
    ClusterError::Unexpected {
        status: status.as_u16(),
        body,
    }
}

fn transport(err: reqwest::Error) -> ClusterError {
    // timeouts included: the retry path handles them
    ClusterError::Transport(err.to_string())
}

#[async_trait]
impl ClusterProjectApi for HttpClusterApi {
    async fn exists(&self, name: &str) -> Result<bool, ClusterError> {
        let response = self
            .client
            .get(self.project_url(name))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        let body = response.text().await.unwrap_or_default();
        match classify(name, status, body) {
            ClusterError::NotFound(_) => Ok(false),
            err => Err(err),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), ClusterError> {
        let response = self
            .client
            .delete(self.project_url(name))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(name, status, body))
    }
}
